//! Mutex-backed repositories for the service binary, demos, and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{Applicant, ApplicantId, Form, FormId, ProcessingStatus, Ssn, Version};
use super::repository::{ApplicantRepository, FormRepository, RepositoryError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

#[derive(Default, Clone)]
pub struct InMemoryFormRepository {
    records: Arc<Mutex<HashMap<FormId, Form>>>,
}

impl FormRepository for InMemoryFormRepository {
    fn insert(&self, form: Form) -> Result<Form, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&form.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(form.id.clone(), form.clone());
        Ok(form)
    }

    fn fetch(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard.get(id).cloned())
    }

    fn replace(&self, form: Form, expected: Version) -> Result<Form, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let stored = guard.get(&form.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != expected {
            return Err(RepositoryError::VersionMismatch {
                actual: stored.version,
            });
        }
        guard.insert(form.id.clone(), form.clone());
        Ok(form)
    }

    fn list(&self, status: Option<ProcessingStatus>) -> Result<Vec<Form>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut forms: Vec<Form> = guard
            .values()
            .filter(|form| status.map_or(true, |status| form.processing_status == status))
            .cloned()
            .collect();
        forms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(forms)
    }

    fn for_applicant(&self, id: &ApplicantId) -> Result<Vec<Form>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut forms: Vec<Form> = guard
            .values()
            .filter(|form| form.applicant_id.as_ref() == Some(id))
            .cloned()
            .collect();
        forms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(forms)
    }
}

/// Applicant table with a unique index on the normalized SSN.
#[derive(Default, Clone)]
pub struct InMemoryApplicantRepository {
    records: Arc<Mutex<ApplicantTable>>,
}

#[derive(Default)]
struct ApplicantTable {
    by_id: HashMap<ApplicantId, Applicant>,
    by_ssn: HashMap<Ssn, ApplicantId>,
}

impl ApplicantRepository for InMemoryApplicantRepository {
    fn insert(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        let mut table = lock(&self.records)?;
        if table.by_id.contains_key(&applicant.id) || table.by_ssn.contains_key(&applicant.ssn) {
            return Err(RepositoryError::Conflict);
        }
        table
            .by_ssn
            .insert(applicant.ssn.clone(), applicant.id.clone());
        table.by_id.insert(applicant.id.clone(), applicant.clone());
        Ok(applicant)
    }

    fn update(&self, applicant: Applicant) -> Result<(), RepositoryError> {
        let mut table = lock(&self.records)?;
        let previous_ssn = table
            .by_id
            .get(&applicant.id)
            .map(|stored| stored.ssn.clone())
            .ok_or(RepositoryError::NotFound)?;

        if previous_ssn != applicant.ssn {
            if table.by_ssn.contains_key(&applicant.ssn) {
                return Err(RepositoryError::Conflict);
            }
            table.by_ssn.remove(&previous_ssn);
            table
                .by_ssn
                .insert(applicant.ssn.clone(), applicant.id.clone());
        }
        table.by_id.insert(applicant.id.clone(), applicant);
        Ok(())
    }

    fn fetch(&self, id: &ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        let table = lock(&self.records)?;
        Ok(table.by_id.get(id).cloned())
    }

    fn find_by_ssn(&self, ssn: &Ssn) -> Result<Vec<Applicant>, RepositoryError> {
        let table = lock(&self.records)?;
        Ok(table
            .by_ssn
            .get(ssn)
            .and_then(|id| table.by_id.get(id))
            .cloned()
            .into_iter()
            .collect())
    }

    fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        let table = lock(&self.records)?;
        let mut applicants: Vec<Applicant> = table.by_id.values().cloned().collect();
        applicants.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(applicants)
    }
}
