use std::fmt;

use chrono::{DateTime, Utc};

use super::domain::{AcceptedFields, ActorId, FieldIssue, Form, FormType, ProcessingStatus};
use super::validation::completeness_issues;

/// Triggers that can move a form between processing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    FieldsEdited,
    Verified,
    Reclassified,
}

impl LifecycleEvent {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FieldsEdited => "field edit",
            Self::Verified => "verification",
            Self::Reclassified => "reclassification",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{event} is not allowed once a form is {from}")]
pub struct InvalidTransition {
    pub from: ProcessingStatus,
    pub event: LifecycleEvent,
}

impl ProcessingStatus {
    /// Transition table for the review lifecycle. `verified` is terminal.
    pub fn on(self, event: LifecycleEvent) -> Result<Self, InvalidTransition> {
        match (self, event) {
            (Self::New | Self::Processing, LifecycleEvent::FieldsEdited) => Ok(Self::Processing),
            (_, LifecycleEvent::Verified) => Ok(Self::Verified),
            (status @ (Self::New | Self::Processing), LifecycleEvent::Reclassified) => Ok(status),
            (from @ Self::Verified, LifecycleEvent::FieldsEdited | LifecycleEvent::Reclassified) => {
                Err(InvalidTransition { from, event })
            }
        }
    }
}

/// Result of a lifecycle step: either a new record to persist or nothing to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Unchanged,
    Updated(Form),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("form is incomplete ({} issue(s))", .0.len())]
    PreconditionFailed(Vec<FieldIssue>),
}

/// Apply an already validated batch. An empty batch changes nothing.
pub fn apply_changes(
    form: &Form,
    changes: &AcceptedFields,
    now: DateTime<Utc>,
) -> Result<Transition, InvalidTransition> {
    let status = form.processing_status.on(LifecycleEvent::FieldsEdited)?;
    if changes.is_empty() {
        return Ok(Transition::Unchanged);
    }

    let mut next = form.clone();
    next.fields.apply(changes);
    next.processing_status = status;
    next.touch(now);
    Ok(Transition::Updated(next))
}

/// Lock the record and stamp provenance. Re-verifying is a no-op that keeps the first stamp.
pub fn verify(
    form: &Form,
    actor: &ActorId,
    now: DateTime<Utc>,
) -> Result<Transition, LifecycleError> {
    if form.processing_status == ProcessingStatus::Verified {
        return Ok(Transition::Unchanged);
    }

    let issues = completeness_issues(form);
    if !issues.is_empty() {
        return Err(LifecycleError::PreconditionFailed(issues));
    }

    let mut next = form.clone();
    next.processing_status = form.processing_status.on(LifecycleEvent::Verified)?;
    next.verified_at = Some(now);
    next.verified_by = Some(actor.clone());
    next.touch(now);
    Ok(Transition::Updated(next))
}

/// Change the classification without affecting the processing status.
pub fn reclassify(
    form: &Form,
    form_type: FormType,
    now: DateTime<Utc>,
) -> Result<Transition, InvalidTransition> {
    let status = form.processing_status.on(LifecycleEvent::Reclassified)?;
    if form.form_type == form_type {
        return Ok(Transition::Unchanged);
    }

    let mut next = form.clone();
    next.form_type = form_type;
    next.processing_status = status;
    next.touch(now);
    Ok(Transition::Updated(next))
}
