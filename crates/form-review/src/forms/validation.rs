//! Per-field format rules applied before values reach the authoritative record.
//!
//! Every rule is pure and independent of the others, so a batch can be checked in any order and
//! every offending field is reported in one pass.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;

use super::domain::{AcceptedFields, FieldIssue, FieldSet, Form, FormField, Ssn};

static SSN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{9}|[0-9]{3}-[0-9]{2}-[0-9]{4})$").expect("valid ssn pattern")
});

static ZIP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}(?:-[0-9]{4})?$").expect("valid zip pattern"));

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{3}-?[0-9]{3}-?[0-9]{4}$").expect("valid phone pattern")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("valid email pattern")
});

/// Outcome of checking a proposed batch: what would be stored and what was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub accepted: AcceptedFields,
    pub rejected: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Strip every non-digit character. Idempotent.
pub fn normalize_ssn(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub fn is_well_formed_ssn(raw: &str) -> bool {
    SSN_PATTERN.is_match(raw.trim())
}

pub fn is_valid_zip(raw: &str) -> bool {
    ZIP_PATTERN.is_match(raw)
}

pub fn is_valid_phone(raw: &str) -> bool {
    PHONE_PATTERN.is_match(raw)
}

pub fn is_valid_email(raw: &str) -> bool {
    EMAIL_PATTERN.is_match(raw)
}

/// Calendar date from `YYYY-MM-DD` or an RFC 3339 timestamp (time of day discarded).
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|timestamp| timestamp.date_naive())
}

/// Check every field present in `proposed`, splitting it into accepted and rejected parts.
pub fn validate_fields(proposed: &FieldSet) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (field, slot) in proposed.text_slots() {
        let Some(value) = slot else {
            continue;
        };

        let trimmed = value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Err(reason) = accept_text(&mut report.accepted, field, trimmed) {
            report.rejected.push(FieldIssue::new(field, reason));
        }
    }

    if let Some(has_signature) = proposed.has_signature {
        report.accepted.has_signature = Some(has_signature);
    }

    report
}

fn accept_text(
    accepted: &mut AcceptedFields,
    field: FormField,
    value: Option<&str>,
) -> Result<(), &'static str> {
    match field {
        FormField::Ssn => {
            let ssn = value
                .map(|raw| Ssn::parse(raw).map_err(|_| "must be NNN-NN-NNNN or nine digits"))
                .transpose()?;
            accepted.ssn = Some(ssn);
        }
        FormField::Dob => {
            accepted.dob = Some(value.map(parse_date_field).transpose()?);
        }
        FormField::SignatureDate => {
            accepted.signature_date = Some(value.map(parse_date_field).transpose()?);
        }
        FormField::Zip => {
            accepted.zip = Some(checked(value, is_valid_zip, "must be NNNNN or NNNNN-NNNN")?);
        }
        FormField::Phone => {
            accepted.phone = Some(checked(
                value,
                is_valid_phone,
                "must be NNN-NNN-NNNN, dashes optional",
            )?);
        }
        FormField::Email => {
            accepted.email = Some(checked(
                value,
                is_valid_email,
                "must look like local@domain.tld",
            )?);
        }
        FormField::FirstName => accepted.first_name = Some(value.map(str::to_string)),
        FormField::LastName => accepted.last_name = Some(value.map(str::to_string)),
        FormField::Street1 => accepted.street1 = Some(value.map(str::to_string)),
        FormField::Street2 => accepted.street2 = Some(value.map(str::to_string)),
        FormField::City => accepted.city = Some(value.map(str::to_string)),
        FormField::State => accepted.state = Some(value.map(str::to_string)),
        FormField::HasSignature
        | FormField::FormType
        | FormField::ConfidenceScore
        | FormField::ExtractionDate => {}
    }

    Ok(())
}

fn parse_date_field(raw: &str) -> Result<NaiveDate, &'static str> {
    parse_calendar_date(raw).ok_or("must be a valid calendar date (YYYY-MM-DD)")
}

fn checked(
    value: Option<&str>,
    rule: fn(&str) -> bool,
    reason: &'static str,
) -> Result<Option<String>, &'static str> {
    match value {
        Some(raw) if !rule(raw) => Err(reason),
        other => Ok(other.map(str::to_string)),
    }
}

/// Every reason `form` cannot be verified yet. Empty means the record is complete.
pub fn completeness_issues(form: &Form) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    for field in FormField::required_for_verification() {
        let present = match field {
            FormField::Ssn => form.fields.ssn.is_some(),
            FormField::Dob => form.fields.dob.is_some(),
            other => form
                .fields
                .text(other)
                .is_some_and(|value| !value.trim().is_empty()),
        };

        if !present {
            issues.push(FieldIssue::new(field, "required"));
        }
    }

    if !form.form_type.is_classified() {
        issues.push(FieldIssue::new(
            FormField::FormType,
            "form must be classified before verification",
        ));
    }

    issues
}
