use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use super::domain::{
    ConfidenceScore, ExtractedForm, FieldIssue, FieldSet, FormField, FormFields, FormType, PageId,
};
use super::validation::validate_fields;

/// Parsed extraction export: pages ready to ingest plus every value that was discarded.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub forms: Vec<ExtractedForm>,
    pub dropped: Vec<DroppedValue>,
}

/// An extracted value that failed format rules and was left blank for the reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedValue {
    pub page_id: PageId,
    pub issue: FieldIssue,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read extraction export: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse extraction export: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row} has no page id")]
    MissingPageId { row: usize },
}

/// Reads the OCR pipeline's CSV export into unsaved form records.
pub struct ExtractionImporter;

impl ExtractionImporter {
    pub fn from_path(path: impl AsRef<Path>) -> Result<ExtractionBatch, IngestError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<ExtractionBatch, IngestError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut batch = ExtractionBatch::default();

        for (index, record) in csv_reader.deserialize::<ExtractionRow>().enumerate() {
            let row = record?;
            // Header is line 1.
            let line = index + 2;
            let page_id = row
                .page_id
                .clone()
                .map(PageId)
                .ok_or(IngestError::MissingPageId { row: line })?;

            let (form, dropped) = row.into_extracted(page_id.clone());
            for issue in dropped {
                warn!(page_id = %page_id.0, field = %issue.field, "dropping malformed extracted value");
                batch.dropped.push(DroppedValue {
                    page_id: page_id.clone(),
                    issue,
                });
            }
            batch.forms.push(form);
        }

        Ok(batch)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractionRow {
    #[serde(rename = "Page ID", default, deserialize_with = "empty_string_as_none")]
    page_id: Option<String>,
    #[serde(rename = "Form Type", default, deserialize_with = "empty_string_as_none")]
    form_type: Option<String>,
    #[serde(rename = "First Name", default, deserialize_with = "empty_string_as_none")]
    first_name: Option<String>,
    #[serde(rename = "Last Name", default, deserialize_with = "empty_string_as_none")]
    last_name: Option<String>,
    #[serde(rename = "SSN", default, deserialize_with = "empty_string_as_none")]
    ssn: Option<String>,
    #[serde(rename = "DOB", default, deserialize_with = "empty_string_as_none")]
    dob: Option<String>,
    #[serde(rename = "Street 1", default, deserialize_with = "empty_string_as_none")]
    street1: Option<String>,
    #[serde(rename = "Street 2", default, deserialize_with = "empty_string_as_none")]
    street2: Option<String>,
    #[serde(rename = "City", default, deserialize_with = "empty_string_as_none")]
    city: Option<String>,
    #[serde(rename = "State", default, deserialize_with = "empty_string_as_none")]
    state: Option<String>,
    #[serde(rename = "ZIP", default, deserialize_with = "empty_string_as_none")]
    zip: Option<String>,
    #[serde(rename = "Email", default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(rename = "Phone", default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    #[serde(
        rename = "Signature Date",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    signature_date: Option<String>,
    #[serde(
        rename = "Has Signature",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    has_signature: Option<String>,
    #[serde(rename = "Confidence", default, deserialize_with = "empty_string_as_none")]
    confidence: Option<String>,
    #[serde(
        rename = "Extracted At",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    extracted_at: Option<String>,
}

impl ExtractionRow {
    fn into_extracted(self, page_id: PageId) -> (ExtractedForm, Vec<FieldIssue>) {
        let mut dropped = Vec::new();

        let has_signature = match self.has_signature.as_deref().map(parse_flag) {
            Some(Some(flag)) => Some(Some(flag)),
            Some(None) => {
                dropped.push(FieldIssue::new(
                    FormField::HasSignature,
                    "expected yes/no or true/false",
                ));
                None
            }
            None => None,
        };

        let proposed = FieldSet {
            first_name: self.first_name.map(Some),
            last_name: self.last_name.map(Some),
            ssn: self.ssn.map(Some),
            dob: self.dob.map(Some),
            street1: self.street1.map(Some),
            street2: self.street2.map(Some),
            city: self.city.map(Some),
            state: self.state.map(Some),
            zip: self.zip.map(Some),
            email: self.email.map(Some),
            phone: self.phone.map(Some),
            signature_date: self.signature_date.map(Some),
            has_signature,
        };

        let report = validate_fields(&proposed);
        dropped.extend(report.rejected);

        let mut fields = FormFields::default();
        fields.apply(&report.accepted);

        let form_type = self
            .form_type
            .as_deref()
            .and_then(FormType::parse)
            .unwrap_or(FormType::Unknown);

        let confidence_score = match self.confidence.as_deref().map(parse_confidence) {
            Some(Ok(score)) => Some(score),
            Some(Err(reason)) => {
                dropped.push(FieldIssue::new(FormField::ConfidenceScore, reason));
                None
            }
            None => None,
        };

        let extraction_date = match self.extracted_at.as_deref().map(parse_timestamp) {
            Some(Some(timestamp)) => Some(timestamp),
            Some(None) => {
                dropped.push(FieldIssue::new(
                    FormField::ExtractionDate,
                    "expected an RFC 3339 timestamp or YYYY-MM-DD",
                ));
                None
            }
            None => None,
        };

        let extracted = ExtractedForm {
            page_id,
            form_type,
            fields,
            confidence_score,
            extraction_date,
        };
        (extracted, dropped)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_confidence(raw: &str) -> Result<ConfidenceScore, &'static str> {
    let value = raw
        .trim()
        .parse::<f32>()
        .map_err(|_| "expected a number between 0 and 1")?;
    ConfidenceScore::new(value).map_err(|_| "must be between 0 and 1")
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
