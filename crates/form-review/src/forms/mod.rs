//! Form review lifecycle: field validation, the processing-status state machine, and
//! applicant reconciliation, with the storage and HTTP seams around them.

pub mod domain;
pub mod ingest;
pub mod lifecycle;
pub mod memory;
pub mod reconciliation;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    AcceptedFields, ActorId, Applicant, ApplicantId, ApplicantUpsert, ConfidenceScore,
    DocumentAssets, ExtractedForm, FieldIssue, FieldSet, Form, FormField, FormFields, FormId,
    FormType, PageId, ProcessingStatus, Ssn, Version,
};
pub use ingest::{DroppedValue, ExtractionBatch, ExtractionImporter, IngestError};
pub use lifecycle::{InvalidTransition, LifecycleEvent};
pub use memory::{InMemoryApplicantRepository, InMemoryFormRepository};
pub use reconciliation::{ApplicantReconciler, ReconcileError, ReconcilePlan, Reconciliation};
pub use repository::{
    ApplicantDetail, ApplicantRepository, ApplicantSummary, DocumentLocator, FormListItem,
    FormRepository, RepositoryError, StaticAssetLocator, StatusCounts, UpsertedApplicant,
};
pub use router::{form_router, ACTOR_HEADER};
pub use service::{FormReviewError, FormReviewService};
pub use validation::{normalize_ssn, validate_fields, ValidationReport};
