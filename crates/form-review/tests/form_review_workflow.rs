//! End-to-end review scenarios driven through the public service facade and HTTP router.

mod common {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use serde_json::Value;

    use form_review::forms::{
        ExtractionImporter, FormReviewService, InMemoryApplicantRepository,
        InMemoryFormRepository, StaticAssetLocator,
    };

    pub(super) type Service =
        FormReviewService<InMemoryFormRepository, InMemoryApplicantRepository>;

    pub(super) fn seeded_service() -> Arc<Service> {
        let service = FormReviewService::new(
            Arc::new(InMemoryFormRepository::default()),
            Arc::new(InMemoryApplicantRepository::default()),
            Arc::new(StaticAssetLocator::new("https://assets.example.test/")),
        );

        let data = include_bytes!("../data/sample_extractions.csv");
        let batch = ExtractionImporter::from_reader(&data[..]).expect("sample export parses");
        for extracted in batch.forms {
            service.ingest(extracted).expect("ingest succeeds");
        }

        Arc::new(service)
    }

    pub(super) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    pub(super) async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }
}

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::*;
use form_review::forms::{
    form_router, ExtractionImporter, FormField, FormType, ProcessingStatus, ACTOR_HEADER,
};

#[test]
fn sample_export_reports_dropped_values() {
    let data = include_bytes!("../data/sample_extractions.csv");
    let batch = ExtractionImporter::from_reader(&data[..]).expect("sample export parses");

    assert_eq!(batch.forms.len(), 5);
    let dropped: Vec<(&str, FormField)> = batch
        .dropped
        .iter()
        .map(|value| (value.page_id.0.as_str(), value.issue.field))
        .collect();
    assert_eq!(
        dropped,
        vec![
            ("batch-07/page-003", FormField::Zip),
            ("batch-07/page-003", FormField::Email),
        ]
    );
    assert_eq!(batch.forms[4].form_type, FormType::Unknown);
}

#[test]
fn sample_pages_for_one_person_share_an_applicant() {
    let service = seeded_service();

    let applicants = service.applicants().expect("applicants");
    assert_eq!(applicants.len(), 3);

    let alvarez = applicants
        .iter()
        .find(|summary| summary.last_name.as_deref() == Some("Alvarez"))
        .expect("alvarez applicant");
    assert_eq!(alvarez.form_count, 2);
    assert_eq!(alvarez.ssn, "***-**-6789");

    let counts = service.status_counts().expect("counts");
    assert_eq!(counts.new, 5);
    assert_eq!(counts.total(), 5);
}

#[tokio::test]
async fn reviewer_completes_a_partial_page_over_http() {
    let service = seeded_service();
    let target = service
        .list(Some(ProcessingStatus::New))
        .expect("queue")
        .into_iter()
        .find(|item| item.form_type == FormType::NyyfPageOne)
        .expect("nyyf page present");
    let router = form_router(service.clone());
    let form_uri = format!("/api/v1/forms/{}", target.id);

    let response = router
        .clone()
        .oneshot(
            Request::get(form_uri.as_str())
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let form = read_json_body(response).await;
    assert_eq!(form["zip"], serde_json::Value::Null);
    assert_eq!(form["dob"], serde_json::Value::Null);
    let version = form["version"].as_u64().expect("version");

    let mut verify = json_request(
        "POST",
        &format!("{form_uri}/verify"),
        json!({ "expected_version": version }),
    );
    verify
        .headers_mut()
        .insert(ACTOR_HEADER, "reviewer-3".parse().expect("header value"));
    let response = router.clone().oneshot(verify).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["fields"], json!([{ "field": "dob", "reason": "required" }]));

    let response = router
        .clone()
        .oneshot(json_request(
            "PATCH",
            &form_uri,
            json!({
                "expected_version": version,
                "fields": { "dob": "1988-07-19", "zip": "12180" },
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let edited = read_json_body(response).await;
    assert_eq!(edited["processing_status"], "processing");
    let version = edited["version"].as_u64().expect("version");

    let mut verify = json_request(
        "POST",
        &format!("{form_uri}/verify"),
        json!({ "expected_version": version }),
    );
    verify
        .headers_mut()
        .insert(ACTOR_HEADER, "reviewer-3".parse().expect("header value"));
    let response = router.clone().oneshot(verify).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let verified = read_json_body(response).await;
    assert_eq!(verified["processing_status"], "verified");
    assert_eq!(verified["verified_by"], "reviewer-3");

    let response = router
        .oneshot(json_request(
            "PATCH",
            &form_uri,
            json!({
                "expected_version": verified["version"],
                "fields": { "city": "Cohoes" },
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "invalid_transition");

    let counts = service.status_counts().expect("counts");
    assert_eq!((counts.new, counts.processing, counts.verified), (4, 0, 1));
}
