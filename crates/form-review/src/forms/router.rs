use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ActorId, ApplicantId, ApplicantUpsert, FieldIssue, FieldSet, FormField, FormId, FormType,
    ProcessingStatus, Version,
};
use super::repository::{ApplicantRepository, FormRepository};
use super::service::{FormReviewError, FormReviewService};

/// Header carrying the reviewer identity resolved by the session layer.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Router builder exposing the review operations over HTTP.
pub fn form_router<F, A>(service: Arc<FormReviewService<F, A>>) -> Router
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    Router::new()
        .route("/api/v1/forms", get(list_handler::<F, A>))
        .route("/api/v1/dashboard", get(summary_handler::<F, A>))
        .route(
            "/api/v1/forms/:form_id",
            get(form_handler::<F, A>).patch(update_handler::<F, A>),
        )
        .route(
            "/api/v1/forms/:form_id/validate",
            post(validate_handler::<F, A>),
        )
        .route(
            "/api/v1/forms/:form_id/type",
            patch(reclassify_handler::<F, A>),
        )
        .route("/api/v1/forms/:form_id/verify", post(verify_handler::<F, A>))
        .route(
            "/api/v1/forms/:form_id/applicant",
            post(reconcile_handler::<F, A>),
        )
        .route(
            "/api/v1/applicants",
            get(applicants_handler::<F, A>).post(upsert_applicant_handler::<F, A>),
        )
        .route(
            "/api/v1/applicants/:applicant_id",
            get(applicant_handler::<F, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<ProcessingStatus>,
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdateRequest {
    pub expected_version: Version,
    #[serde(default)]
    pub fields: FieldSet,
}

#[derive(Debug, Deserialize)]
pub struct ReclassifyRequest {
    pub expected_version: Version,
    pub form_type: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub expected_version: Version,
}

type SharedService<F, A> = State<Arc<FormReviewService<F, A>>>;

pub(crate) async fn list_handler<F, A>(
    State(service): SharedService<F, A>,
    Query(query): Query<ListQuery>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.list(query.status) {
        Ok(items) => (StatusCode::OK, axum::Json(items)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn summary_handler<F, A>(State(service): SharedService<F, A>) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.status_counts() {
        Ok(counts) => (StatusCode::OK, axum::Json(counts)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn form_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.get(&FormId(form_id)) {
        Ok(form) => (StatusCode::OK, axum::Json(form)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
    axum::Json(request): axum::Json<FieldUpdateRequest>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    let FieldUpdateRequest {
        expected_version,
        fields,
    } = request;

    match service.apply_field_update(&FormId(form_id), fields, expected_version) {
        Ok(form) => (StatusCode::OK, axum::Json(form)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn validate_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
    axum::Json(fields): axum::Json<FieldSet>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.validate_fields(&FormId(form_id), &fields) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reclassify_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
    axum::Json(request): axum::Json<ReclassifyRequest>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    let Some(form_type) = FormType::parse(&request.form_type) else {
        let issue = FieldIssue::new(
            FormField::FormType,
            format!(
                "'{}' is not one of 8850, 8qf, nyyf_1, nyyf_2, unknown",
                request.form_type
            ),
        );
        return error_response(FormReviewError::Validation(vec![issue]));
    };

    match service.reclassify(&FormId(form_id), form_type, request.expected_version) {
        Ok(form) => (StatusCode::OK, axum::Json(form)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verify_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<VerifyRequest>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let Some(actor) = actor else {
        let payload = json!({
            "error": "missing_actor",
            "message": format!("verification requires the {ACTOR_HEADER} header"),
        });
        return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
    };

    let actor = ActorId(actor.to_string());
    match service.verify(&FormId(form_id), &actor, request.expected_version) {
        Ok(form) => (StatusCode::OK, axum::Json(form)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reconcile_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(form_id): Path<String>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.reconcile_applicant(&FormId(form_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn applicants_handler<F, A>(State(service): SharedService<F, A>) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.applicants() {
        Ok(applicants) => (StatusCode::OK, axum::Json(applicants)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn upsert_applicant_handler<F, A>(
    State(service): SharedService<F, A>,
    axum::Json(request): axum::Json<ApplicantUpsert>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.upsert_applicant(request) {
        Ok(upserted) if upserted.created => {
            (StatusCode::CREATED, axum::Json(upserted)).into_response()
        }
        Ok(upserted) => (StatusCode::OK, axum::Json(upserted)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn applicant_handler<F, A>(
    State(service): SharedService<F, A>,
    Path(applicant_id): Path<String>,
) -> Response
where
    F: FormRepository + 'static,
    A: ApplicantRepository + 'static,
{
    match service.applicant(&ApplicantId(applicant_id)) {
        Ok(detail) => (StatusCode::OK, axum::Json(detail)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Map a service error to a status code and a body naming the failing fields or condition.
pub fn error_response(err: FormReviewError) -> Response {
    let message = err.to_string();
    let (status, payload) = match err {
        FormReviewError::Validation(fields) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "validation_failed", "message": message, "fields": fields }),
        ),
        FormReviewError::PreconditionFailed(fields) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "precondition_failed", "message": message, "fields": fields }),
        ),
        FormReviewError::InvalidTransition(transition) => (
            StatusCode::CONFLICT,
            json!({
                "error": "invalid_transition",
                "message": message,
                "status": transition.from,
            }),
        ),
        FormReviewError::Conflict { expected, actual } => (
            StatusCode::PRECONDITION_FAILED,
            json!({
                "error": "conflict",
                "message": message,
                "expected_version": expected,
                "actual_version": actual,
            }),
        ),
        FormReviewError::AmbiguousApplicant { candidates, .. } => (
            StatusCode::CONFLICT,
            json!({
                "error": "ambiguous_applicant",
                "message": message,
                "candidates": candidates,
            }),
        ),
        FormReviewError::DuplicateSsn { .. } => (
            StatusCode::CONFLICT,
            json!({ "error": "duplicate_ssn", "message": message }),
        ),
        FormReviewError::NotFound(_) | FormReviewError::ApplicantNotFound(_) => (
            StatusCode::NOT_FOUND,
            json!({ "error": "not_found", "message": message }),
        ),
        FormReviewError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "repository_error", "message": message }),
        ),
    };

    (status, axum::Json(payload)).into_response()
}
