use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::validation;

/// Identifier wrapper for extracted form records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormId(pub String);

impl FormId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for applicants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

impl ApplicantId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the scanned document page a form was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

/// Reviewer identity supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optimistic concurrency token. Every accepted mutation bumps it by one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document classification assigned at extraction and corrected by reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    #[serde(rename = "8850")]
    Form8850,
    #[serde(rename = "8qf")]
    Form8qf,
    #[serde(rename = "nyyf_1")]
    NyyfPageOne,
    #[serde(rename = "nyyf_2")]
    NyyfPageTwo,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FormType {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Form8850,
            Self::Form8qf,
            Self::NyyfPageOne,
            Self::NyyfPageTwo,
            Self::Unknown,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Form8850 => "8850",
            Self::Form8qf => "8qf",
            Self::NyyfPageOne => "nyyf_1",
            Self::NyyfPageTwo => "nyyf_2",
            Self::Unknown => "unknown",
        }
    }

    /// Case- and whitespace-insensitive lookup against the fixed enumeration.
    pub fn parse(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|candidate| candidate.label() == needle)
    }

    pub const fn is_classified(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Review state of a form; see `lifecycle` for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    New,
    Processing,
    Verified,
}

impl ProcessingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Social Security Number held in normalized (nine digit) form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ssn(String);

impl Ssn {
    /// Accepts `NNN-NN-NNNN` or nine contiguous digits.
    pub fn parse(raw: &str) -> Result<Self, InvalidSsn> {
        if !validation::is_well_formed_ssn(raw) {
            return Err(InvalidSsn);
        }
        Ok(Self(validation::normalize_ssn(raw)))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    pub fn last_four(&self) -> &str {
        &self.0[5..]
    }

    pub fn masked(&self) -> String {
        format!("***-**-{}", self.last_four())
    }
}

// Keeps full SSNs out of debug output and logs.
impl fmt::Debug for Ssn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssn({})", self.masked())
    }
}

impl TryFrom<String> for Ssn {
    type Error = InvalidSsn;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ssn> for String {
    fn from(value: Ssn) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ssn must be NNN-NN-NNNN or nine digits")]
pub struct InvalidSsn;

/// Extraction confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct ConfidenceScore(f32);

impl ConfidenceScore {
    pub fn new(value: f32) -> Result<Self, InvalidConfidence> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidConfidence(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for ConfidenceScore {
    type Error = InvalidConfidence;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidenceScore> for f32 {
    fn from(value: ConfidenceScore) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("confidence score {0} is outside [0, 1]")]
pub struct InvalidConfidence(pub f32);

/// Opaque locators for the rendered page and its thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAssets {
    pub document_url: String,
    pub thumbnail_url: String,
}

/// Every field on a form record, used to scope validation, completeness, and import errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    FirstName,
    LastName,
    Ssn,
    Dob,
    Street1,
    Street2,
    City,
    State,
    Zip,
    Email,
    Phone,
    SignatureDate,
    HasSignature,
    FormType,
    ConfidenceScore,
    ExtractionDate,
}

impl FormField {
    pub const fn name(self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Ssn => "ssn",
            Self::Dob => "dob",
            Self::Street1 => "street1",
            Self::Street2 => "street2",
            Self::City => "city",
            Self::State => "state",
            Self::Zip => "zip",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::SignatureDate => "signature_date",
            Self::HasSignature => "has_signature",
            Self::FormType => "form_type",
            Self::ConfidenceScore => "confidence_score",
            Self::ExtractionDate => "extraction_date",
        }
    }

    /// Fields that must be present and well-formed before verification.
    pub const fn required_for_verification() -> [Self; 7] {
        [
            Self::FirstName,
            Self::LastName,
            Self::Ssn,
            Self::Dob,
            Self::Street1,
            Self::City,
            Self::State,
        ]
    }

    pub const fn is_identity(self) -> bool {
        matches!(self, Self::FirstName | Self::LastName | Self::Ssn)
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field-scoped problem reported back to the reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: FormField,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(field: FormField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

pub(crate) fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Proposed partial update as submitted by a reviewer.
///
/// Each field is tri-state: absent leaves the stored value alone, `null` (or a blank string)
/// clears it, and a value replaces it once validation accepts it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub ssn: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub dob: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub street1: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub street2: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub city: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub state: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub zip: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub signature_date: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub has_signature: Option<Option<bool>>,
}

impl FieldSet {
    /// Set a text or date field. `has_signature` and `form_type` are not text and are ignored.
    pub fn with(mut self, field: FormField, value: impl Into<String>) -> Self {
        if let Some(slot) = self.text_slot_mut(field) {
            *slot = Some(Some(value.into()));
        }
        self
    }

    pub fn cleared(mut self, field: FormField) -> Self {
        if field == FormField::HasSignature {
            self.has_signature = Some(None);
        } else if let Some(slot) = self.text_slot_mut(field) {
            *slot = Some(None);
        }
        self
    }

    pub fn with_signature(mut self, has_signature: bool) -> Self {
        self.has_signature = Some(Some(has_signature));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text_slots().iter().all(|(_, slot)| slot.is_none()) && self.has_signature.is_none()
    }

    pub(crate) fn text_slots(&self) -> [(FormField, &Option<Option<String>>); 12] {
        [
            (FormField::FirstName, &self.first_name),
            (FormField::LastName, &self.last_name),
            (FormField::Ssn, &self.ssn),
            (FormField::Dob, &self.dob),
            (FormField::Street1, &self.street1),
            (FormField::Street2, &self.street2),
            (FormField::City, &self.city),
            (FormField::State, &self.state),
            (FormField::Zip, &self.zip),
            (FormField::Email, &self.email),
            (FormField::Phone, &self.phone),
            (FormField::SignatureDate, &self.signature_date),
        ]
    }

    fn text_slot_mut(&mut self, field: FormField) -> Option<&mut Option<Option<String>>> {
        match field {
            FormField::FirstName => Some(&mut self.first_name),
            FormField::LastName => Some(&mut self.last_name),
            FormField::Ssn => Some(&mut self.ssn),
            FormField::Dob => Some(&mut self.dob),
            FormField::Street1 => Some(&mut self.street1),
            FormField::Street2 => Some(&mut self.street2),
            FormField::City => Some(&mut self.city),
            FormField::State => Some(&mut self.state),
            FormField::Zip => Some(&mut self.zip),
            FormField::Email => Some(&mut self.email),
            FormField::Phone => Some(&mut self.phone),
            FormField::SignatureDate => Some(&mut self.signature_date),
            FormField::HasSignature
            | FormField::FormType
            | FormField::ConfidenceScore
            | FormField::ExtractionDate => None,
        }
    }
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Validated, normalized counterpart of [`FieldSet`]; only accepted fields are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcceptedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn: Option<Option<Ssn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street1: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street2: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_signature: Option<Option<bool>>,
}

impl AcceptedFields {
    /// Fields carried by this change set, in declaration order.
    pub fn fields(&self) -> Vec<FormField> {
        [
            (FormField::FirstName, self.first_name.is_some()),
            (FormField::LastName, self.last_name.is_some()),
            (FormField::Ssn, self.ssn.is_some()),
            (FormField::Dob, self.dob.is_some()),
            (FormField::Street1, self.street1.is_some()),
            (FormField::Street2, self.street2.is_some()),
            (FormField::City, self.city.is_some()),
            (FormField::State, self.state.is_some()),
            (FormField::Zip, self.zip.is_some()),
            (FormField::Email, self.email.is_some()),
            (FormField::Phone, self.phone.is_some()),
            (FormField::SignatureDate, self.signature_date.is_some()),
            (FormField::HasSignature, self.has_signature.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn touches_identity(&self) -> bool {
        self.fields().into_iter().any(FormField::is_identity)
    }
}

/// Extracted and reviewer-corrected values stored on a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub ssn: Option<Ssn>,
    pub dob: Option<NaiveDate>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub signature_date: Option<NaiveDate>,
    pub has_signature: Option<bool>,
}

impl FormFields {
    pub fn apply(&mut self, changes: &AcceptedFields) {
        assign(&mut self.first_name, &changes.first_name);
        assign(&mut self.last_name, &changes.last_name);
        assign(&mut self.ssn, &changes.ssn);
        assign(&mut self.dob, &changes.dob);
        assign(&mut self.street1, &changes.street1);
        assign(&mut self.street2, &changes.street2);
        assign(&mut self.city, &changes.city);
        assign(&mut self.state, &changes.state);
        assign(&mut self.zip, &changes.zip);
        assign(&mut self.email, &changes.email);
        assign(&mut self.phone, &changes.phone);
        assign(&mut self.signature_date, &changes.signature_date);
        assign(&mut self.has_signature, &changes.has_signature);
    }

    pub(crate) fn text(&self, field: FormField) -> Option<&str> {
        match field {
            FormField::FirstName => self.first_name.as_deref(),
            FormField::LastName => self.last_name.as_deref(),
            FormField::Street1 => self.street1.as_deref(),
            FormField::Street2 => self.street2.as_deref(),
            FormField::City => self.city.as_deref(),
            FormField::State => self.state.as_deref(),
            FormField::Zip => self.zip.as_deref(),
            FormField::Email => self.email.as_deref(),
            FormField::Phone => self.phone.as_deref(),
            FormField::Ssn
            | FormField::Dob
            | FormField::SignatureDate
            | FormField::HasSignature
            | FormField::FormType
            | FormField::ConfidenceScore
            | FormField::ExtractionDate => None,
        }
    }
}

fn assign<T: Clone>(slot: &mut Option<T>, change: &Option<Option<T>>) {
    if let Some(value) = change {
        *slot = value.clone();
    }
}

pub(crate) fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (first, last) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(name), None) | (None, Some(name)) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// One document page's extracted and verified field record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub page_id: PageId,
    pub form_type: FormType,
    #[serde(flatten)]
    pub fields: FormFields,
    pub extraction_date: Option<DateTime<Utc>>,
    pub confidence_score: Option<ConfidenceScore>,
    pub processing_status: ProcessingStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<ActorId>,
    pub applicant_id: Option<ApplicantId>,
    #[serde(flatten)]
    pub assets: DocumentAssets,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl Form {
    /// Fresh record for an ingested page; always starts in `new`.
    pub fn ingested(
        id: FormId,
        extracted: ExtractedForm,
        assets: DocumentAssets,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            page_id: extracted.page_id,
            form_type: extracted.form_type,
            fields: extracted.fields,
            extraction_date: extracted.extraction_date,
            confidence_score: extracted.confidence_score,
            processing_status: ProcessingStatus::New,
            verified_at: None,
            verified_by: None,
            applicant_id: None,
            assets,
            created_at: now,
            updated_at: now,
            version: Version::INITIAL,
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version = self.version.next();
    }

    /// `verified_at`/`verified_by` are set exactly when the status is `verified`.
    pub fn provenance_consistent(&self) -> bool {
        let stamped = self.verified_at.is_some() && self.verified_by.is_some();
        let unstamped = self.verified_at.is_none() && self.verified_by.is_none();
        match self.processing_status {
            ProcessingStatus::Verified => stamped,
            ProcessingStatus::New | ProcessingStatus::Processing => unstamped,
        }
    }
}

/// Machine-extracted page content prior to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedForm {
    pub page_id: PageId,
    pub form_type: FormType,
    pub fields: FormFields,
    pub confidence_score: Option<ConfidenceScore>,
    pub extraction_date: Option<DateTime<Utc>>,
}

/// A person keyed by normalized SSN that one or more forms reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ApplicantId,
    pub ssn: Ssn,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Applicant {
    pub fn from_form_identity(ssn: Ssn, fields: &FormFields, now: DateTime<Utc>) -> Self {
        Self {
            id: ApplicantId::generate(),
            ssn,
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_name(&self) -> Option<String> {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

/// Manual create-or-update request for an applicant record.
///
/// Names follow the [`FieldSet`] convention: absent keeps, `null` clears.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicantUpsert {
    #[serde(default)]
    pub id: Option<ApplicantId>,
    #[serde(default)]
    pub ssn: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
}
