use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{Applicant, ApplicantId, Form};
use super::repository::{ApplicantRepository, RepositoryError};

/// How a form's identity fields resolved against the applicant table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "applicant_id", rename_all = "snake_case")]
pub enum Reconciliation {
    /// No usable SSN; the form stays unassigned.
    Unlinked,
    Linked(ApplicantId),
    /// Linked, and the applicant's names were replaced by the form's.
    Renamed(ApplicantId),
    Created(ApplicantId),
}

impl Reconciliation {
    pub fn applicant_id(&self) -> Option<&ApplicantId> {
        match self {
            Self::Unlinked => None,
            Self::Linked(id) | Self::Renamed(id) | Self::Created(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("ssn ending {ssn_last_four} matches {} applicants", .candidates.len())]
    Ambiguous {
        ssn_last_four: String,
        candidates: Vec<ApplicantId>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Applicant-table change a reconciliation needs, worked out without writing anything.
///
/// The form write that carries the resulting link lands first; the plan is committed only
/// once that write has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilePlan {
    Unlinked,
    Link(ApplicantId),
    /// Link and replace the stored names with the form's.
    Rename(Applicant),
    /// Insert a new applicant; its id is assigned up front so the form can reference it.
    Create(Applicant),
}

impl ReconcilePlan {
    pub fn applicant_id(&self) -> Option<&ApplicantId> {
        match self {
            Self::Unlinked => None,
            Self::Link(id) => Some(id),
            Self::Rename(applicant) | Self::Create(applicant) => Some(&applicant.id),
        }
    }
}

/// Links forms to applicants keyed by normalized SSN.
pub struct ApplicantReconciler<A> {
    applicants: Arc<A>,
}

impl<A> ApplicantReconciler<A>
where
    A: ApplicantRepository + 'static,
{
    pub fn new(applicants: Arc<A>) -> Self {
        Self { applicants }
    }

    /// Plan and commit in one step, for forms with no competing writers yet.
    pub fn reconcile(
        &self,
        form: &Form,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, ReconcileError> {
        let plan = self.plan(form, now)?;
        self.commit(plan, form, now)
    }

    /// Resolve a form's SSN against the applicant table. Reads only.
    pub fn plan(&self, form: &Form, now: DateTime<Utc>) -> Result<ReconcilePlan, ReconcileError> {
        let Some(ssn) = form.fields.ssn.as_ref() else {
            debug!(form_id = %form.id, "no reliable ssn; leaving form unassigned");
            return Ok(ReconcilePlan::Unlinked);
        };

        let mut matches = self.applicants.find_by_ssn(ssn)?;
        if matches.len() > 1 {
            let candidates = matches.into_iter().map(|applicant| applicant.id).collect();
            warn!(
                form_id = %form.id,
                ssn_last_four = ssn.last_four(),
                "multiple applicants share one normalized ssn"
            );
            return Err(ReconcileError::Ambiguous {
                ssn_last_four: ssn.last_four().to_string(),
                candidates,
            });
        }

        let Some(mut applicant) = matches.pop() else {
            return Ok(ReconcilePlan::Create(Applicant::from_form_identity(
                ssn.clone(),
                &form.fields,
                now,
            )));
        };

        // Form values are the latest known-good identity; absent names never erase stored ones.
        let first_name = form
            .fields
            .first_name
            .clone()
            .or_else(|| applicant.first_name.clone());
        let last_name = form
            .fields
            .last_name
            .clone()
            .or_else(|| applicant.last_name.clone());

        if first_name == applicant.first_name && last_name == applicant.last_name {
            return Ok(ReconcilePlan::Link(applicant.id));
        }

        applicant.first_name = first_name;
        applicant.last_name = last_name;
        applicant.updated_at = now;
        Ok(ReconcilePlan::Rename(applicant))
    }

    /// Write the applicant side of `plan` for the stored `form`.
    pub fn commit(
        &self,
        plan: ReconcilePlan,
        form: &Form,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, ReconcileError> {
        match plan {
            ReconcilePlan::Unlinked => Ok(Reconciliation::Unlinked),
            ReconcilePlan::Link(id) => Ok(Reconciliation::Linked(id)),
            ReconcilePlan::Rename(applicant) => {
                let id = applicant.id.clone();
                self.applicants.update(applicant)?;
                info!(
                    form_id = %form.id,
                    applicant_id = %id,
                    "applicant identity updated from form"
                );
                Ok(Reconciliation::Renamed(id))
            }
            ReconcilePlan::Create(applicant) => match self.applicants.insert(applicant) {
                Ok(created) => {
                    info!(form_id = %form.id, applicant_id = %created.id, "applicant created");
                    Ok(Reconciliation::Created(created.id))
                }
                // Another writer claimed this SSN between lookup and insert; join it.
                Err(RepositoryError::Conflict) => match self.plan(form, now)? {
                    ReconcilePlan::Create(_) => {
                        Err(ReconcileError::Repository(RepositoryError::Conflict))
                    }
                    replanned => self.commit(replanned, form, now),
                },
                Err(other) => Err(other.into()),
            },
        }
    }
}
