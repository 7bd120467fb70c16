use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::domain::{
    describe_issues, ActorId, Applicant, ApplicantId, ApplicantUpsert, ExtractedForm, FieldIssue,
    FieldSet, Form, FormField, FormId, FormType, ProcessingStatus, Ssn, Version,
};
use super::lifecycle::{self, InvalidTransition, LifecycleError, LifecycleEvent, Transition};
use super::reconciliation::{ApplicantReconciler, ReconcileError, ReconcilePlan, Reconciliation};
use super::repository::{
    ApplicantDetail, ApplicantRepository, ApplicantSummary, DocumentLocator, FormListItem,
    FormRepository, RepositoryError, StatusCounts, UpsertedApplicant,
};
use super::validation::{self, ValidationReport};

/// Service composing validation, the lifecycle rules, reconciliation, and storage.
///
/// Every mutation returns the authoritative record it stored so callers can refresh their own
/// view without a shared cache.
pub struct FormReviewService<F, A> {
    forms: Arc<F>,
    applicants: Arc<A>,
    reconciler: ApplicantReconciler<A>,
    locator: Arc<dyn DocumentLocator>,
}

impl<F, A> FormReviewService<F, A>
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    pub fn new(forms: Arc<F>, applicants: Arc<A>, locator: Arc<dyn DocumentLocator>) -> Self {
        let reconciler = ApplicantReconciler::new(applicants.clone());
        Self {
            forms,
            applicants,
            reconciler,
            locator,
        }
    }

    /// Store a freshly extracted page as a `new` form, linking it when the SSN is usable.
    pub fn ingest(&self, extracted: ExtractedForm) -> Result<Form, FormReviewError> {
        let now = Utc::now();
        let id = FormId::generate();
        let assets = self.locator.assets_for(&id);
        let mut form = Form::ingested(id, extracted, assets, now);

        let plan = match self.reconciler.plan(&form, now) {
            Ok(plan) => plan,
            Err(ReconcileError::Ambiguous { candidates, .. }) => {
                warn!(
                    form_id = %form.id,
                    candidates = candidates.len(),
                    "ingested form left unassigned pending manual applicant resolution"
                );
                ReconcilePlan::Unlinked
            }
            Err(ReconcileError::Repository(err)) => return Err(err.into()),
        };
        form.applicant_id = plan.applicant_id().cloned();

        let stored = self.forms.insert(form)?;
        let (stored, _) = self.settle(stored, plan)?;
        info!(form_id = %stored.id, form_type = %stored.form_type, "form ingested");
        Ok(stored)
    }

    pub fn get(&self, id: &FormId) -> Result<Form, FormReviewError> {
        self.forms
            .fetch(id)?
            .ok_or_else(|| FormReviewError::NotFound(id.clone()))
    }

    pub fn list(
        &self,
        status: Option<ProcessingStatus>,
    ) -> Result<Vec<FormListItem>, FormReviewError> {
        let forms = self.forms.list(status)?;
        forms
            .iter()
            .map(|form| -> Result<FormListItem, FormReviewError> {
                let name = match &form.applicant_id {
                    Some(id) => self
                        .applicants
                        .fetch(id)?
                        .and_then(|applicant| applicant.display_name()),
                    None => None,
                };
                Ok(FormListItem::from_form(form, name))
            })
            .collect()
    }

    pub fn status_counts(&self) -> Result<StatusCounts, FormReviewError> {
        let forms = self.forms.list(None)?;
        Ok(StatusCounts::tally(&forms))
    }

    pub fn applicants(&self) -> Result<Vec<ApplicantSummary>, FormReviewError> {
        self.applicants
            .list()?
            .iter()
            .map(|applicant| -> Result<ApplicantSummary, FormReviewError> {
                let form_count = self.forms.for_applicant(&applicant.id)?.len();
                Ok(ApplicantSummary::new(applicant, form_count))
            })
            .collect()
    }

    pub fn applicant(&self, id: &ApplicantId) -> Result<ApplicantDetail, FormReviewError> {
        let applicant = self
            .applicants
            .fetch(id)?
            .ok_or_else(|| FormReviewError::ApplicantNotFound(id.clone()))?;
        let forms = self.forms.for_applicant(id)?;
        let name = applicant.display_name();

        Ok(ApplicantDetail {
            summary: ApplicantSummary::new(&applicant, forms.len()),
            created_at: applicant.created_at,
            forms: forms
                .iter()
                .map(|form| FormListItem::from_form(form, name.clone()))
                .collect(),
        })
    }

    /// Check a proposed batch without storing anything.
    pub fn validate_fields(
        &self,
        id: &FormId,
        proposed: &FieldSet,
    ) -> Result<ValidationReport, FormReviewError> {
        self.get(id)?;
        Ok(validation::validate_fields(proposed))
    }

    /// Apply a reviewer edit. Batches are atomic: one rejected field rejects the whole batch.
    pub fn apply_field_update(
        &self,
        id: &FormId,
        proposed: FieldSet,
        expected: Version,
    ) -> Result<Form, FormReviewError> {
        let current = self.get(id)?;
        current.processing_status.on(LifecycleEvent::FieldsEdited)?;

        let report = validation::validate_fields(&proposed);
        if !report.is_clean() {
            debug!(form_id = %id, rejected = report.rejected.len(), "field update rejected");
            return Err(FormReviewError::Validation(report.rejected));
        }

        let transition = lifecycle::apply_changes(&current, &report.accepted, Utc::now())?;
        ensure_version(&current, expected)?;

        let mut next = match transition {
            Transition::Unchanged => return Ok(current),
            Transition::Updated(next) => next,
        };

        let plan = if report.accepted.touches_identity() {
            Some(self.link(&mut next)?)
        } else {
            None
        };

        let mut stored = self.persist(next, expected)?;
        if let Some(plan) = plan {
            stored = self.settle(stored, plan)?.0;
        }
        info!(
            form_id = %stored.id,
            version = %stored.version,
            status = %stored.processing_status,
            fields = ?report.accepted.fields(),
            "form fields updated"
        );
        Ok(stored)
    }

    /// Mark a complete form verified by `actor`. Verifying a verified form returns it unchanged.
    pub fn verify(
        &self,
        id: &FormId,
        actor: &ActorId,
        expected: Version,
    ) -> Result<Form, FormReviewError> {
        let current = self.get(id)?;
        let mut next = match lifecycle::verify(&current, actor, Utc::now())? {
            Transition::Unchanged => {
                debug!(form_id = %id, "form already verified");
                return Ok(current);
            }
            Transition::Updated(next) => next,
        };
        ensure_version(&current, expected)?;

        let plan = self.link(&mut next)?;
        debug_assert!(next.provenance_consistent());
        let stored = self.persist(next, expected)?;
        let (stored, _) = self.settle(stored, plan)?;
        info!(form_id = %stored.id, verified_by = %actor, "form verified");
        Ok(stored)
    }

    pub fn reclassify(
        &self,
        id: &FormId,
        form_type: FormType,
        expected: Version,
    ) -> Result<Form, FormReviewError> {
        let current = self.get(id)?;
        let transition = lifecycle::reclassify(&current, form_type, Utc::now())?;
        ensure_version(&current, expected)?;

        match transition {
            Transition::Unchanged => Ok(current),
            Transition::Updated(next) => {
                let stored = self.persist(next, expected)?;
                info!(
                    form_id = %stored.id,
                    from = %current.form_type,
                    to = %stored.form_type,
                    "form reclassified"
                );
                Ok(stored)
            }
        }
    }

    /// Resolve and persist the applicant link for a stored form.
    pub fn reconcile_applicant(&self, id: &FormId) -> Result<Reconciliation, FormReviewError> {
        let current = self.get(id)?;
        let now = Utc::now();
        let plan = self.reconciler.plan(&current, now)?;

        let stored = if plan.applicant_id() != current.applicant_id.as_ref() {
            let expected = current.version;
            let mut next = current;
            next.applicant_id = plan.applicant_id().cloned();
            next.touch(now);
            self.persist(next, expected)?
        } else {
            current
        };

        let (_, outcome) = self.settle(stored, plan)?;
        Ok(outcome)
    }

    /// Create an applicant, or update the one addressed by id or, failing that, by SSN.
    ///
    /// Absent names are left alone and `null` clears them. The SSN stays unique across records.
    pub fn upsert_applicant(
        &self,
        upsert: ApplicantUpsert,
    ) -> Result<UpsertedApplicant, FormReviewError> {
        let proposed = FieldSet {
            first_name: upsert.first_name,
            last_name: upsert.last_name,
            ssn: upsert.ssn.map(Some),
            ..FieldSet::default()
        };
        let report = validation::validate_fields(&proposed);
        if !report.is_clean() {
            return Err(FormReviewError::Validation(report.rejected));
        }
        let accepted = report.accepted;
        let ssn = match accepted.ssn {
            Some(None) => return Err(ssn_required()),
            Some(Some(ssn)) => Some(ssn),
            None => None,
        };

        let existing = match &upsert.id {
            Some(id) => Some(
                self.applicants
                    .fetch(id)?
                    .ok_or_else(|| FormReviewError::ApplicantNotFound(id.clone()))?,
            ),
            None => {
                let ssn = ssn.as_ref().ok_or_else(ssn_required)?;
                self.single_applicant_for(ssn)?
            }
        };

        let now = Utc::now();
        let Some(mut applicant) = existing else {
            let ssn = ssn.ok_or_else(ssn_required)?;
            let applicant = Applicant {
                id: ApplicantId::generate(),
                ssn,
                first_name: accepted.first_name.flatten(),
                last_name: accepted.last_name.flatten(),
                created_at: now,
                updated_at: now,
            };
            let ssn = applicant.ssn.clone();
            let created = self
                .applicants
                .insert(applicant)
                .map_err(|err| duplicate_ssn(err, &ssn))?;
            info!(applicant_id = %created.id, "applicant created manually");
            return Ok(UpsertedApplicant {
                summary: ApplicantSummary::new(&created, 0),
                created: true,
            });
        };

        if let Some(ssn) = ssn {
            if ssn != applicant.ssn {
                let holders = self.applicants.find_by_ssn(&ssn)?;
                if holders.iter().any(|holder| holder.id != applicant.id) {
                    return Err(FormReviewError::DuplicateSsn {
                        ssn_last_four: ssn.last_four().to_string(),
                    });
                }
                applicant.ssn = ssn;
            }
        }
        if let Some(first_name) = accepted.first_name {
            applicant.first_name = first_name;
        }
        if let Some(last_name) = accepted.last_name {
            applicant.last_name = last_name;
        }
        applicant.updated_at = now;

        self.applicants
            .update(applicant.clone())
            .map_err(|err| duplicate_ssn(err, &applicant.ssn))?;
        let form_count = self.forms.for_applicant(&applicant.id)?.len();
        info!(applicant_id = %applicant.id, "applicant updated manually");
        Ok(UpsertedApplicant {
            summary: ApplicantSummary::new(&applicant, form_count),
            created: false,
        })
    }

    fn single_applicant_for(&self, ssn: &Ssn) -> Result<Option<Applicant>, FormReviewError> {
        let mut matches = self.applicants.find_by_ssn(ssn)?;
        if matches.len() > 1 {
            return Err(FormReviewError::AmbiguousApplicant {
                ssn_last_four: ssn.last_four().to_string(),
                candidates: matches.into_iter().map(|applicant| applicant.id).collect(),
            });
        }
        Ok(matches.pop())
    }

    /// Resolve the form's applicant link without writing; the plan is committed by `settle`.
    fn link(&self, form: &mut Form) -> Result<ReconcilePlan, FormReviewError> {
        let plan = self.reconciler.plan(form, form.updated_at)?;
        form.applicant_id = plan.applicant_id().cloned();
        Ok(plan)
    }

    /// Commit the applicant side of `plan` after `stored` has been written.
    ///
    /// A create that loses the race for its SSN joins the winning applicant, which takes one
    /// more conditional form write. A failed create unlinks the form again.
    fn settle(
        &self,
        stored: Form,
        plan: ReconcilePlan,
    ) -> Result<(Form, Reconciliation), FormReviewError> {
        let pending_create = matches!(plan, ReconcilePlan::Create(_));
        let outcome = match self.reconciler.commit(plan, &stored, stored.updated_at) {
            Ok(outcome) => outcome,
            Err(err) => {
                if pending_create {
                    self.relink(stored, None)?;
                }
                return Err(err.into());
            }
        };

        if outcome.applicant_id() == stored.applicant_id.as_ref() {
            return Ok((stored, outcome));
        }
        let relinked = self.relink(stored, outcome.applicant_id().cloned())?;
        Ok((relinked, outcome))
    }

    fn relink(
        &self,
        stored: Form,
        applicant_id: Option<ApplicantId>,
    ) -> Result<Form, FormReviewError> {
        let id = stored.id.clone();
        let expected = stored.version;
        let mut next = stored;
        next.applicant_id = applicant_id;
        next.touch(Utc::now());
        match self.persist(next, expected) {
            Ok(form) => Ok(form),
            Err(FormReviewError::Conflict { actual, .. }) => {
                warn!(
                    form_id = %id,
                    version = %actual,
                    "applicant link superseded by a newer write"
                );
                self.get(&id)
            }
            Err(err) => Err(err),
        }
    }

    fn persist(&self, form: Form, expected: Version) -> Result<Form, FormReviewError> {
        let id = form.id.clone();
        self.forms
            .replace(form, expected)
            .map_err(|err| match err {
                RepositoryError::VersionMismatch { actual } => {
                    FormReviewError::Conflict { expected, actual }
                }
                RepositoryError::NotFound => FormReviewError::NotFound(id),
                other => FormReviewError::Repository(other),
            })
    }
}

fn ssn_required() -> FormReviewError {
    FormReviewError::Validation(vec![FieldIssue::new(FormField::Ssn, "required")])
}

fn duplicate_ssn(err: RepositoryError, ssn: &Ssn) -> FormReviewError {
    match err {
        RepositoryError::Conflict => FormReviewError::DuplicateSsn {
            ssn_last_four: ssn.last_four().to_string(),
        },
        other => other.into(),
    }
}

fn ensure_version(current: &Form, expected: Version) -> Result<(), FormReviewError> {
    if current.version == expected {
        Ok(())
    } else {
        Err(FormReviewError::Conflict {
            expected,
            actual: current.version,
        })
    }
}

/// Error raised by the review service. Each variant names the failing field(s) or condition.
#[derive(Debug, thiserror::Error)]
pub enum FormReviewError {
    #[error("form {0} not found")]
    NotFound(FormId),
    #[error("applicant {0} not found")]
    ApplicantNotFound(ApplicantId),
    #[error("field validation failed: {}", describe_issues(.0))]
    Validation(Vec<FieldIssue>),
    #[error("form cannot be verified: {}", describe_issues(.0))]
    PreconditionFailed(Vec<FieldIssue>),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("stale write: expected version {expected}, record is at version {actual}")]
    Conflict { expected: Version, actual: Version },
    #[error(
        "ssn ending {ssn_last_four} matches {} applicants; manual resolution required",
        .candidates.len()
    )]
    AmbiguousApplicant {
        ssn_last_four: String,
        candidates: Vec<ApplicantId>,
    },
    #[error("ssn ending {ssn_last_four} already belongs to another applicant")]
    DuplicateSsn { ssn_last_four: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<LifecycleError> for FormReviewError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::InvalidTransition(err) => Self::InvalidTransition(err),
            LifecycleError::PreconditionFailed(issues) => Self::PreconditionFailed(issues),
        }
    }
}

impl From<ReconcileError> for FormReviewError {
    fn from(value: ReconcileError) -> Self {
        match value {
            ReconcileError::Ambiguous {
                ssn_last_four,
                candidates,
            } => Self::AmbiguousApplicant {
                ssn_last_four,
                candidates,
            },
            ReconcileError::Repository(err) => Self::Repository(err),
        }
    }
}
