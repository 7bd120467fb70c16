use form_review::error::AppError;
use form_review::forms::{
    ExtractionBatch, ExtractionImporter, FormReviewService, InMemoryApplicantRepository,
    InMemoryFormRepository, StaticAssetLocator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ReviewService =
    FormReviewService<InMemoryFormRepository, InMemoryApplicantRepository>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) service: Arc<ReviewService>,
}

pub(crate) fn in_memory_service(asset_base_url: &str) -> Arc<ReviewService> {
    Arc::new(FormReviewService::new(
        Arc::new(InMemoryFormRepository::default()),
        Arc::new(InMemoryApplicantRepository::default()),
        Arc::new(StaticAssetLocator::new(asset_base_url)),
    ))
}

/// Outcome of loading one extraction export into the service.
#[derive(Debug, Clone, Default)]
pub(crate) struct SeedSummary {
    pub(crate) ingested: usize,
    pub(crate) linked: usize,
    pub(crate) dropped_values: usize,
}

pub(crate) fn ingest_batch(
    service: &ReviewService,
    batch: ExtractionBatch,
) -> Result<SeedSummary, AppError> {
    let mut summary = SeedSummary {
        dropped_values: batch.dropped.len(),
        ..SeedSummary::default()
    };

    for extracted in batch.forms {
        let form = service.ingest(extracted)?;
        summary.ingested += 1;
        if form.applicant_id.is_some() {
            summary.linked += 1;
        }
    }

    Ok(summary)
}

pub(crate) fn seed_from_csv(
    service: &ReviewService,
    path: impl AsRef<Path>,
) -> Result<SeedSummary, AppError> {
    let path = path.as_ref();
    let batch = ExtractionImporter::from_path(path)?;
    let summary = ingest_batch(service, batch)?;
    info!(
        path = %path.display(),
        ingested = summary.ingested,
        linked = summary.linked,
        dropped_values = summary.dropped_values,
        "extraction export loaded"
    );
    Ok(summary)
}
