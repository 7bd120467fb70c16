use crate::infra::{in_memory_service, ingest_batch, ReviewService};
use chrono::SecondsFormat;
use clap::Args;
use form_review::config::AppConfig;
use form_review::error::AppError;
use form_review::forms::validation::completeness_issues;
use form_review::forms::{
    ActorId, ExtractionBatch, ExtractionImporter, FieldIssue, FieldSet, Form, FormField,
    FormReviewError, FormType, ProcessingStatus,
};
use std::path::PathBuf;

const SAMPLE_EXPORT: &str = include_str!("../../../crates/form-review/data/sample_extractions.csv");

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Extraction export (CSV) produced by the OCR pipeline
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Print every ingested form, not just the totals
    #[arg(long)]
    pub(crate) list: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Extraction export to walk through. Defaults to the bundled sample.
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
    /// Reviewer identity stamped on verification
    #[arg(long, default_value = "demo-reviewer")]
    pub(crate) actor: String,
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let ImportArgs { csv, list } = args;

    let config = AppConfig::load()?;
    let service = in_memory_service(&config.documents.asset_base_url);
    let batch = ExtractionImporter::from_path(&csv)?;

    println!("Extraction import: {}", csv.display());
    render_dropped(&batch);
    let summary = ingest_batch(&service, batch)?;
    println!(
        "- {} forms ingested | {} linked to an applicant | {} values dropped",
        summary.ingested, summary.linked, summary.dropped_values
    );

    render_dashboard(&service)?;

    if list {
        println!("\nForms awaiting review:");
        for item in service.list(None)? {
            println!(
                "  - {} [{}] {} -> {}",
                item.id,
                item.form_type,
                item.processing_status,
                item.applicant_name.as_deref().unwrap_or("unassigned")
            );
        }

        println!("\nApplicants:");
        for applicant in service.applicants()? {
            println!(
                "  - {} {} ({} forms, ssn {})",
                applicant.first_name.as_deref().unwrap_or("?"),
                applicant.last_name.as_deref().unwrap_or("?"),
                applicant.form_count,
                applicant.ssn
            );
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { csv, actor } = args;
    let actor = ActorId(actor);

    let config = AppConfig::load()?;
    let service = in_memory_service(&config.documents.asset_base_url);
    let batch = match csv {
        Some(path) => ExtractionImporter::from_path(path)?,
        None => ExtractionImporter::from_reader(SAMPLE_EXPORT.as_bytes())?,
    };

    println!("Form review demo (SSNs masked)");
    render_dropped(&batch);
    let summary = ingest_batch(&service, batch)?;
    println!(
        "- Ingested {} forms; {} linked to applicants on arrival",
        summary.ingested, summary.linked
    );
    render_dashboard(&service)?;

    let mut queue = Vec::new();
    for item in service.list(Some(ProcessingStatus::New))? {
        queue.push(service.get(&item.id)?);
    }
    // Prefer a page that still needs correction.
    let pick = queue
        .iter()
        .position(|form| !completeness_issues(form).is_empty())
        .unwrap_or(0);
    if queue.is_empty() {
        println!("\nNo forms waiting for review.");
        return Ok(());
    }
    let mut form = queue.swap_remove(pick);
    println!(
        "\nReviewing form {} (page {}, type {})",
        form.id, form.page_id.0, form.form_type
    );

    let mut attempts = 0;
    loop {
        attempts += 1;
        match service.verify(&form.id, &actor, form.version) {
            Ok(verified) => {
                form = verified;
                break;
            }
            Err(FormReviewError::PreconditionFailed(issues)) if attempts <= 2 => {
                println!("  Verification blocked:");
                for issue in &issues {
                    println!("    - {issue}");
                }
                form = complete_form(&service, form, &issues)?;
            }
            Err(err) => {
                println!("  Verification failed: {err}");
                return Ok(());
            }
        }
    }

    println!(
        "  Verified by {} at {} (version {})",
        form.verified_by
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        form.verified_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        form.version
    );

    let late_edit = FieldSet::default().with(FormField::City, "Schenectady");
    match service.apply_field_update(&form.id, late_edit, form.version) {
        Err(err) => println!("  Edit after verification refused: {err}"),
        Ok(_) => println!("  Unexpected: verified form accepted an edit"),
    }

    render_dashboard(&service)?;

    println!("\nApplicants:");
    for applicant in service.applicants()? {
        println!(
            "  - {} {} | ssn {} | {} forms",
            applicant.first_name.as_deref().unwrap_or("?"),
            applicant.last_name.as_deref().unwrap_or("?"),
            applicant.ssn,
            applicant.form_count
        );
    }

    Ok(())
}

/// Fill whatever verification reported missing, showing the stale-write guard on the way.
fn complete_form(
    service: &ReviewService,
    form: Form,
    issues: &[FieldIssue],
) -> Result<Form, AppError> {
    let mut current = form;

    if issues.iter().any(|issue| issue.field == FormField::FormType) {
        current = service.reclassify(&current.id, FormType::Form8850, current.version)?;
        println!(
            "  Reclassified as {} (version {})",
            current.form_type, current.version
        );
    }

    let correction = issues
        .iter()
        .filter_map(|issue| demo_value(issue.field).map(|value| (issue.field, value)))
        .fold(FieldSet::default(), |fields, (field, value)| {
            fields.with(field, value)
        });

    if correction.is_empty() {
        return Ok(current);
    }

    let stale = current.version;
    let updated = service.apply_field_update(&current.id, correction.clone(), current.version)?;
    println!(
        "  Corrected {} field(s); status {} (version {})",
        issues.len(),
        updated.processing_status,
        updated.version
    );

    match service.apply_field_update(&updated.id, correction, stale) {
        Err(FormReviewError::Conflict { expected, actual }) => println!(
            "  A second reviewer holding version {expected} was rejected (record at {actual})"
        ),
        Err(err) => println!("  Second reviewer failed unexpectedly: {err}"),
        Ok(_) => println!("  Unexpected: stale write accepted"),
    }

    Ok(updated)
}

fn demo_value(field: FormField) -> Option<&'static str> {
    match field {
        FormField::FirstName => Some("Jordan"),
        FormField::LastName => Some("Reyes"),
        FormField::Ssn => Some("000-00-0000"),
        FormField::Dob => Some("1988-07-19"),
        FormField::Street1 => Some("1 Empire State Plaza"),
        FormField::City => Some("Albany"),
        FormField::State => Some("NY"),
        _ => None,
    }
}

fn render_dropped(batch: &ExtractionBatch) {
    if batch.dropped.is_empty() {
        return;
    }
    println!("Values dropped during extraction import:");
    for value in &batch.dropped {
        println!("  - page {}: {}", value.page_id.0, value.issue);
    }
}

fn render_dashboard(service: &ReviewService) -> Result<(), AppError> {
    let counts = service.status_counts()?;
    println!(
        "Dashboard: {} new | {} processing | {} verified ({} total)",
        counts.new,
        counts.processing,
        counts.verified,
        counts.total()
    );
    Ok(())
}
