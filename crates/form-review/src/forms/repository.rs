use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Applicant, ApplicantId, DocumentAssets, Form, FormId, FormType, ProcessingStatus, Ssn,
    Version,
};

/// Durable storage for forms, keyed by id with version-conditioned writes.
pub trait FormRepository: Send + Sync {
    fn insert(&self, form: Form) -> Result<Form, RepositoryError>;
    fn fetch(&self, id: &FormId) -> Result<Option<Form>, RepositoryError>;
    /// Store `form` only if the persisted record is still at `expected`.
    fn replace(&self, form: Form, expected: Version) -> Result<Form, RepositoryError>;
    fn list(&self, status: Option<ProcessingStatus>) -> Result<Vec<Form>, RepositoryError>;
    fn for_applicant(&self, id: &ApplicantId) -> Result<Vec<Form>, RepositoryError>;
}

/// Applicant storage. Implementations must enforce uniqueness of the normalized SSN.
pub trait ApplicantRepository: Send + Sync {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError>;
    fn update(&self, applicant: Applicant) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError>;
    fn find_by_ssn(&self, ssn: &Ssn) -> Result<Vec<Applicant>, RepositoryError>;
    fn list(&self) -> Result<Vec<Applicant>, RepositoryError>;
}

/// Resolves where the rendered page and thumbnail for a form live.
pub trait DocumentLocator: Send + Sync {
    fn assets_for(&self, id: &FormId) -> DocumentAssets;
}

/// Derives asset URLs from a base URL, e.g. `{base}/forms/{id}/page.pdf`.
#[derive(Debug, Clone)]
pub struct StaticAssetLocator {
    base_url: String,
}

impl StaticAssetLocator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl DocumentLocator for StaticAssetLocator {
    fn assets_for(&self, id: &FormId) -> DocumentAssets {
        DocumentAssets {
            document_url: format!("{}/forms/{}/page.pdf", self.base_url, id),
            thumbnail_url: format!("{}/forms/{}/thumbnail.png", self.base_url, id),
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record was modified concurrently (now at version {actual})")]
    VersionMismatch { actual: Version },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Compact row for status queues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormListItem {
    pub id: FormId,
    pub form_type: FormType,
    pub processing_status: ProcessingStatus,
    pub thumbnail_url: String,
    pub applicant_name: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl FormListItem {
    pub fn from_form(form: &Form, applicant_name: Option<String>) -> Self {
        Self {
            id: form.id.clone(),
            form_type: form.form_type,
            processing_status: form.processing_status,
            thumbnail_url: form.assets.thumbnail_url.clone(),
            applicant_name,
            verified_at: form.verified_at,
        }
    }
}

/// Applicant directory entry; the SSN is masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantSummary {
    pub id: ApplicantId,
    pub ssn: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub form_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl ApplicantSummary {
    pub fn new(applicant: &Applicant, form_count: usize) -> Self {
        Self {
            id: applicant.id.clone(),
            ssn: applicant.ssn.masked(),
            first_name: applicant.first_name.clone(),
            last_name: applicant.last_name.clone(),
            form_count,
            updated_at: applicant.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertedApplicant {
    #[serde(flatten)]
    pub summary: ApplicantSummary,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicantDetail {
    #[serde(flatten)]
    pub summary: ApplicantSummary,
    pub created_at: DateTime<Utc>,
    pub forms: Vec<FormListItem>,
}

/// Totals per processing status for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub new: usize,
    pub processing: usize,
    pub verified: usize,
}

impl StatusCounts {
    pub fn tally<'a>(forms: impl IntoIterator<Item = &'a Form>) -> Self {
        forms
            .into_iter()
            .fold(Self::default(), |mut counts, form| {
                match form.processing_status {
                    ProcessingStatus::New => counts.new += 1,
                    ProcessingStatus::Processing => counts.processing += 1,
                    ProcessingStatus::Verified => counts.verified += 1,
                }
                counts
            })
    }

    pub fn total(&self) -> usize {
        self.new + self.processing + self.verified
    }
}
