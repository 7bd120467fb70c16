use super::common::*;
use chrono::Duration;

use crate::forms::domain::{
    AcceptedFields, ActorId, FormField, FormFields, FormType, ProcessingStatus, Version,
};
use crate::forms::lifecycle::{
    apply_changes, reclassify, verify, InvalidTransition, LifecycleError, LifecycleEvent,
    Transition,
};

fn renamed() -> AcceptedFields {
    AcceptedFields {
        first_name: Some(Some("Mariana".to_string())),
        ..AcceptedFields::default()
    }
}

#[test]
fn transition_table_matches_review_flow() {
    use LifecycleEvent::{FieldsEdited, Reclassified, Verified};

    assert_eq!(ProcessingStatus::New.on(FieldsEdited), Ok(ProcessingStatus::Processing));
    assert_eq!(
        ProcessingStatus::Processing.on(FieldsEdited),
        Ok(ProcessingStatus::Processing)
    );
    assert_eq!(ProcessingStatus::New.on(Verified), Ok(ProcessingStatus::Verified));
    assert_eq!(
        ProcessingStatus::Processing.on(Verified),
        Ok(ProcessingStatus::Verified)
    );
    assert_eq!(
        ProcessingStatus::Verified.on(Verified),
        Ok(ProcessingStatus::Verified)
    );
    assert_eq!(ProcessingStatus::New.on(Reclassified), Ok(ProcessingStatus::New));
    assert_eq!(
        ProcessingStatus::Processing.on(Reclassified),
        Ok(ProcessingStatus::Processing)
    );

    for event in [FieldsEdited, Reclassified] {
        assert_eq!(
            ProcessingStatus::Verified.on(event),
            Err(InvalidTransition {
                from: ProcessingStatus::Verified,
                event,
            })
        );
    }
}

#[test]
fn first_edit_moves_new_forms_to_processing() {
    let form = form_with(ProcessingStatus::New, complete_fields());
    let later = timestamp() + Duration::minutes(5);

    let Transition::Updated(next) = apply_changes(&form, &renamed(), later).expect("edit allowed")
    else {
        panic!("expected an updated record");
    };

    assert_eq!(next.processing_status, ProcessingStatus::Processing);
    assert_eq!(next.fields.first_name.as_deref(), Some("Mariana"));
    assert_eq!(next.version, form.version.next());
    assert_eq!(next.updated_at, later);
    assert_eq!(next.created_at, form.created_at);
}

#[test]
fn empty_change_set_is_a_no_op() {
    let form = form_with(ProcessingStatus::New, complete_fields());

    let transition =
        apply_changes(&form, &AcceptedFields::default(), timestamp()).expect("edit allowed");

    assert_eq!(transition, Transition::Unchanged);
}

#[test]
fn verified_forms_reject_edits() {
    let form = form_with(ProcessingStatus::Verified, complete_fields());

    let err = apply_changes(&form, &renamed(), timestamp()).expect_err("verified is terminal");

    assert_eq!(err.from, ProcessingStatus::Verified);
    assert_eq!(err.event, LifecycleEvent::FieldsEdited);
}

#[test]
fn verify_stamps_provenance_once() {
    let form = form_with(ProcessingStatus::Processing, complete_fields());
    let actor = ActorId("reviewer-7".to_string());
    let first_at = timestamp() + Duration::hours(1);

    let Transition::Updated(verified) = verify(&form, &actor, first_at).expect("verifiable")
    else {
        panic!("expected an updated record");
    };

    assert_eq!(verified.processing_status, ProcessingStatus::Verified);
    assert_eq!(verified.verified_at, Some(first_at));
    assert_eq!(verified.verified_by, Some(actor.clone()));
    assert_eq!(verified.version, Version(2));
    assert!(verified.provenance_consistent());

    let someone_else = ActorId("reviewer-8".to_string());
    let again = verify(&verified, &someone_else, first_at + Duration::hours(1))
        .expect("re-verify is idempotent");
    assert_eq!(again, Transition::Unchanged);
}

#[test]
fn verify_reports_every_missing_field() {
    let mut fields = complete_fields();
    fields.first_name = None;
    fields.ssn = None;
    fields.city = Some("   ".to_string());
    let form = form_with(ProcessingStatus::Processing, fields);

    let err = verify(&form, &ActorId("reviewer-1".to_string()), timestamp())
        .expect_err("incomplete form");

    let LifecycleError::PreconditionFailed(issues) = err else {
        panic!("expected precondition failure, got {err:?}");
    };
    let fields: Vec<FormField> = issues.iter().map(|issue| issue.field).collect();
    assert_eq!(fields, vec![FormField::FirstName, FormField::Ssn, FormField::City]);
}

#[test]
fn verify_new_form_directly_when_extraction_is_complete() {
    let form = form_with(ProcessingStatus::New, complete_fields());

    let transition =
        verify(&form, &ActorId("reviewer-1".to_string()), timestamp()).expect("verifiable");

    assert!(matches!(
        transition,
        Transition::Updated(ref next) if next.processing_status == ProcessingStatus::Verified
    ));
}

#[test]
fn reclassify_keeps_status_and_skips_same_type() {
    let form = form_with(ProcessingStatus::New, FormFields::default());

    let Transition::Updated(next) =
        reclassify(&form, FormType::NyyfPageOne, timestamp()).expect("reclassify allowed")
    else {
        panic!("expected an updated record");
    };
    assert_eq!(next.form_type, FormType::NyyfPageOne);
    assert_eq!(next.processing_status, ProcessingStatus::New);

    let same = reclassify(&next, FormType::NyyfPageOne, timestamp()).expect("no-op allowed");
    assert_eq!(same, Transition::Unchanged);
}

#[test]
fn reclassify_after_verification_fails_for_every_type() {
    let form = form_with(ProcessingStatus::Verified, complete_fields());

    for form_type in FormType::ordered() {
        let err = reclassify(&form, form_type, timestamp()).expect_err("verified is terminal");
        assert_eq!(err.event, LifecycleEvent::Reclassified);
    }
}
