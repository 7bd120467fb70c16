use crate::infra::{ingest_batch, AppState, ReviewService};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use form_review::error::AppError;
use form_review::forms::{form_router, ExtractionImporter, FieldIssue, PageId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct ImportRequest {
    /// Extraction export in the pipeline's CSV layout.
    pub(crate) csv: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportResponse {
    pub(crate) ingested: usize,
    pub(crate) linked: usize,
    pub(crate) dropped: Vec<DroppedValueView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DroppedValueView {
    pub(crate) page_id: PageId,
    #[serde(flatten)]
    pub(crate) issue: FieldIssue,
}

pub(crate) fn with_form_routes(service: Arc<ReviewService>) -> axum::Router {
    form_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/imports", axum::routing::post(import_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn import_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportResponse>), AppError> {
    let batch = ExtractionImporter::from_reader(Cursor::new(payload.csv.into_bytes()))?;
    let dropped = batch
        .dropped
        .iter()
        .map(|value| DroppedValueView {
            page_id: value.page_id.clone(),
            issue: value.issue.clone(),
        })
        .collect();

    let summary = ingest_batch(&state.service, batch)?;

    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            ingested: summary.ingested,
            linked: summary.linked,
            dropped,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::in_memory_service;
    use axum::body::Body;
    use axum::http::Request;
    use form_review::forms::{FormField, ProcessingStatus};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    const EXPORT: &str = "Page ID,Form Type,First Name,Last Name,SSN,DOB,Street 1,Street 2,City,State,ZIP,Email,Phone,Signature Date,Has Signature,Confidence,Extracted At\n\
scan-1,8850,Maria,Alvarez,123-45-6789,1990-04-12,14 Orchard Lane,,Albany,NY,12207,,,2025-03-01,yes,0.9,\n\
scan-2,8qf,,,,,,,,,99,,,,,0.4,\n";

    fn app_state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
            service: in_memory_service("http://localhost:3001/assets"),
        }
    }

    fn app(state: AppState) -> axum::Router {
        with_form_routes(state.service.clone()).layer(Extension(state))
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_tracks_flag() {
        let response = readiness_endpoint(Extension(app_state(false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(app_state(true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn import_endpoint_ingests_rows_and_reports_dropped_values() {
        let state = app_state(true);
        let service = state.service.clone();

        let (status, Json(body)) = import_endpoint(
            Extension(state),
            Json(ImportRequest {
                csv: EXPORT.to_string(),
            }),
        )
        .await
        .expect("import succeeds");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.ingested, 2);
        assert_eq!(body.linked, 1);
        assert_eq!(body.dropped.len(), 1);
        assert_eq!(body.dropped[0].issue.field, FormField::Zip);

        let queue = service.list(Some(ProcessingStatus::New)).expect("queue");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn import_route_rejects_rows_without_page_id() {
        let router = app(app_state(true));
        let csv = "Page ID,Form Type\n,8850\n";

        let response = router
            .oneshot(
                Request::post("/api/v1/imports")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "csv": csv }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = read_json(response).await;
        assert!(payload["error"]
            .as_str()
            .is_some_and(|message| message.contains("page id")));
    }

    #[tokio::test]
    async fn form_routes_are_mounted_alongside_operations_endpoints() {
        let router = app(app_state(true));

        let response = router
            .clone()
            .oneshot(
                Request::get("/api/v1/dashboard")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["new"], 0);

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
