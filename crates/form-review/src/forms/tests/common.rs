use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::forms::domain::{
    ActorId, Applicant, ApplicantId, ConfidenceScore, DocumentAssets, ExtractedForm, Form,
    FormFields, FormId, FormType, PageId, ProcessingStatus, Ssn, Version,
};
use crate::forms::memory::{InMemoryApplicantRepository, InMemoryFormRepository};
use crate::forms::repository::{
    ApplicantRepository, FormRepository, RepositoryError, StaticAssetLocator,
};
use crate::forms::{form_router, FormReviewService};

pub(super) const ASSET_BASE: &str = "https://assets.example.test";

pub(super) fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn ssn(raw: &str) -> Ssn {
    Ssn::parse(raw).expect("valid ssn")
}

/// Every required field populated, as a clean extraction would produce.
pub(super) fn complete_fields() -> FormFields {
    FormFields {
        first_name: Some("Maria".to_string()),
        last_name: Some("Alvarez".to_string()),
        ssn: Some(ssn("123-45-6789")),
        dob: NaiveDate::from_ymd_opt(1990, 4, 12),
        street1: Some("14 Orchard Lane".to_string()),
        street2: None,
        city: Some("Albany".to_string()),
        state: Some("NY".to_string()),
        zip: Some("12207".to_string()),
        email: Some("maria@example.com".to_string()),
        phone: Some("518-555-0142".to_string()),
        signature_date: NaiveDate::from_ymd_opt(2025, 3, 1),
        has_signature: Some(true),
    }
}

pub(super) fn extracted(page: &str, fields: FormFields) -> ExtractedForm {
    ExtractedForm {
        page_id: PageId(page.to_string()),
        form_type: FormType::Form8850,
        fields,
        confidence_score: ConfidenceScore::new(0.91).ok(),
        extraction_date: Some(timestamp()),
    }
}

pub(super) fn complete_extraction() -> ExtractedForm {
    extracted("page-001", complete_fields())
}

/// Extraction with no name or SSN; it ingests unassigned.
pub(super) fn sparse_extraction() -> ExtractedForm {
    extracted(
        "page-002",
        FormFields {
            city: Some("Albany".to_string()),
            ..FormFields::default()
        },
    )
}

/// Stored-form fixture built directly, bypassing the service.
pub(super) fn form_with(status: ProcessingStatus, fields: FormFields) -> Form {
    let id = FormId("form-fixture".to_string());
    let assets = DocumentAssets {
        document_url: format!("{ASSET_BASE}/forms/{id}/page.pdf"),
        thumbnail_url: format!("{ASSET_BASE}/forms/{id}/thumbnail.png"),
    };
    let mut form = Form::ingested(id, extracted("page-fixture", fields), assets, timestamp());
    form.processing_status = status;
    if status == ProcessingStatus::Verified {
        form.verified_at = Some(timestamp());
        form.verified_by = Some(ActorId("reviewer-1".to_string()));
    }
    form
}

pub(super) fn applicant(id: &str, raw_ssn: &str, first: &str, last: &str) -> Applicant {
    Applicant {
        id: ApplicantId(id.to_string()),
        ssn: ssn(raw_ssn),
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

pub(super) type MemoryService =
    FormReviewService<InMemoryFormRepository, InMemoryApplicantRepository>;

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryFormRepository>,
    Arc<InMemoryApplicantRepository>,
) {
    let forms = Arc::new(InMemoryFormRepository::default());
    let applicants = Arc::new(InMemoryApplicantRepository::default());
    let service = FormReviewService::new(
        forms.clone(),
        applicants.clone(),
        Arc::new(StaticAssetLocator::new(ASSET_BASE)),
    );
    (service, forms, applicants)
}

pub(super) fn form_router_with_service(service: MemoryService) -> axum::Router {
    form_router(Arc::new(service))
}

/// Applicant table without a uniqueness index, as found in records migrated before the
/// SSN constraint existed. Used to seed duplicate SSNs.
#[derive(Default, Clone)]
pub(super) struct LegacyApplicantRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicantId, Applicant>>>,
}

impl LegacyApplicantRepository {
    pub(super) fn seeded(applicants: Vec<Applicant>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.records.lock().expect("repository mutex poisoned");
            for applicant in applicants {
                guard.insert(applicant.id.clone(), applicant);
            }
        }
        repository
    }
}

impl ApplicantRepository for LegacyApplicantRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(applicant.id.clone(), applicant.clone());
        Ok(applicant)
    }

    fn update(&self, applicant: Applicant) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(applicant.id.clone(), applicant);
        Ok(())
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_ssn(&self, ssn: &Ssn) -> Result<Vec<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut matches: Vec<Applicant> = guard
            .values()
            .filter(|applicant| &applicant.ssn == ssn)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Form store where another writer always commits first, so every conditional write loses.
#[derive(Default, Clone)]
pub(super) struct RacingFormRepository {
    pub(super) inner: InMemoryFormRepository,
}

impl FormRepository for RacingFormRepository {
    fn insert(&self, form: Form) -> Result<Form, RepositoryError> {
        self.inner.insert(form)
    }

    fn fetch(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn replace(&self, form: Form, expected: Version) -> Result<Form, RepositoryError> {
        if let Some(mut competing) = self.inner.fetch(&form.id)? {
            let seen = competing.version;
            competing.touch(timestamp());
            self.inner.replace(competing, seen)?;
        }
        self.inner.replace(form, expected)
    }

    fn list(&self, status: Option<ProcessingStatus>) -> Result<Vec<Form>, RepositoryError> {
        self.inner.list(status)
    }

    fn for_applicant(&self, id: &ApplicantId) -> Result<Vec<Form>, RepositoryError> {
        self.inner.for_applicant(id)
    }
}

/// Applicant table where another writer claims an SSN right after the first lookup misses.
pub(super) struct ContestedApplicantRepository {
    pub(super) inner: InMemoryApplicantRepository,
    pending_winner: Mutex<Option<Applicant>>,
}

impl ContestedApplicantRepository {
    pub(super) fn claimed_by(winner: Applicant) -> Self {
        Self {
            inner: InMemoryApplicantRepository::default(),
            pending_winner: Mutex::new(Some(winner)),
        }
    }
}

impl ApplicantRepository for ContestedApplicantRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        self.inner.insert(applicant)
    }

    fn update(&self, applicant: Applicant) -> Result<(), RepositoryError> {
        self.inner.update(applicant)
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn find_by_ssn(&self, ssn: &Ssn) -> Result<Vec<Applicant>, RepositoryError> {
        let winner = self
            .pending_winner
            .lock()
            .expect("repository mutex poisoned")
            .take();
        match winner {
            Some(winner) => {
                self.inner.insert(winner)?;
                Ok(Vec::new())
            }
            None => self.inner.find_by_ssn(ssn),
        }
    }

    fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) struct UnavailableRepository;

impl FormRepository for UnavailableRepository {
    fn insert(&self, _form: Form) -> Result<Form, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn replace(&self, _form: Form, _expected: Version) -> Result<Form, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _status: Option<ProcessingStatus>) -> Result<Vec<Form>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_applicant(&self, _id: &ApplicantId) -> Result<Vec<Form>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
