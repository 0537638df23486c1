//! In-memory store and blob doubles for service and HTTP tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    blob::{check_key, BlobStore, BlobStoreError},
    error::SuratError,
    lifecycle,
    ports::{LetterTypeStore, ResidentStore, Result, SignatureStore, SubmissionStore},
    types::*,
};

// ── Letter types ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryLetterTypeStore {
    types: RwLock<HashMap<Uuid, (LetterType, bool)>>,
    definitions: RwLock<Vec<(AttributeDefinition, bool)>>,
}

impl MemoryLetterTypeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LetterTypeStore for MemoryLetterTypeStore {
    async fn list(&self) -> Result<Vec<LetterType>> {
        let types = self.types.read().await;
        let mut out: Vec<_> = types
            .values()
            .filter(|(_, deleted)| !deleted)
            .map(|(t, _)| t.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn get(&self, id: Uuid) -> Result<Option<LetterType>> {
        let types = self.types.read().await;
        Ok(types
            .get(&id)
            .filter(|(_, deleted)| !deleted)
            .map(|(t, _)| t.clone()))
    }

    async fn get_with_deleted(&self, id: Uuid) -> Result<Option<LetterType>> {
        Ok(self.types.read().await.get(&id).map(|(t, _)| t.clone()))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<LetterType>> {
        let types = self.types.read().await;
        Ok(types
            .values()
            .find(|(t, deleted)| !deleted && t.code.eq_ignore_ascii_case(code))
            .map(|(t, _)| t.clone()))
    }

    async fn create(
        &self,
        letter_type: &LetterType,
        definitions: &[AttributeDefinition],
    ) -> Result<()> {
        let mut types = self.types.write().await;
        if types.contains_key(&letter_type.id) {
            return Err(SuratError::Conflict(format!(
                "letter type {} exists",
                letter_type.id
            )));
        }
        types.insert(letter_type.id, (letter_type.clone(), false));
        let mut defs = self.definitions.write().await;
        defs.extend(definitions.iter().cloned().map(|d| (d, false)));
        Ok(())
    }

    async fn update(&self, letter_type: &LetterType) -> Result<()> {
        let mut types = self.types.write().await;
        match types.get_mut(&letter_type.id) {
            Some((existing, false)) => {
                *existing = letter_type.clone();
                Ok(())
            }
            _ => Err(SuratError::NotFound(format!(
                "letter type {}",
                letter_type.id
            ))),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let mut types = self.types.write().await;
        match types.get_mut(&id) {
            Some((_, deleted)) if !*deleted => {
                *deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn definitions(&self, letter_type_id: Uuid) -> Result<Vec<AttributeDefinition>> {
        let defs = self.definitions.read().await;
        Ok(defs
            .iter()
            .filter(|(d, deleted)| !deleted && d.letter_type_id == letter_type_id)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn definitions_with_deleted(
        &self,
        letter_type_id: Uuid,
    ) -> Result<Vec<AttributeDefinition>> {
        let defs = self.definitions.read().await;
        Ok(defs
            .iter()
            .filter(|(d, _)| d.letter_type_id == letter_type_id)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn replace_definitions(
        &self,
        letter_type_id: Uuid,
        definitions: &[AttributeDefinition],
    ) -> Result<()> {
        let mut defs = self.definitions.write().await;
        for (existing, deleted) in defs
            .iter_mut()
            .filter(|(d, _)| d.letter_type_id == letter_type_id)
        {
            match definitions.iter().find(|d| d.id == existing.id) {
                Some(updated) if !*deleted => *existing = updated.clone(),
                Some(_) => {}
                None => *deleted = true,
            }
        }
        for def in definitions {
            if !defs.iter().any(|(d, _)| d.id == def.id) {
                defs.push((def.clone(), false));
            }
        }
        Ok(())
    }
}

// ── Submissions ───────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySubmissionStore {
    submissions: RwLock<HashMap<Uuid, Submission>>,
    values: RwLock<Vec<SubmissionAttributeValue>>,
    fail_writes: AtomicBool,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create / revise fail, as a broken transaction would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SuratError::Internal(anyhow!("simulated write failure")));
        }
        Ok(())
    }

    /// Seed a submission directly, bypassing the service.
    pub async fn insert(&self, submission: Submission, values: Vec<SubmissionAttributeValue>) {
        self.submissions
            .write()
            .await
            .insert(submission.id, submission);
        self.values.write().await.extend(values);
    }
}

fn value_row(submission_id: Uuid, v: &NewAttributeValue) -> SubmissionAttributeValue {
    SubmissionAttributeValue {
        id: Uuid::new_v4(),
        submission_id,
        attribute_definition_id: v.attribute_definition_id,
        value: v.value.clone(),
        file_paths: v.file_paths.clone(),
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, new: &NewSubmission) -> Result<Submission> {
        self.check_writable()?;
        let now = Utc::now();
        let submission = Submission {
            id: new.id,
            letter_type_id: new.letter_type_id,
            resident_id: new.resident_id,
            submission_date: now,
            status: SubmissionStatus::Pending,
            letter_number: None,
            approval_date: None,
            rejection_reason: None,
            approver_user_id: None,
            signature_path: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        let mut submissions = self.submissions.write().await;
        if submissions.contains_key(&new.id) {
            return Err(SuratError::Conflict(format!("submission {} exists", new.id)));
        }
        submissions.insert(new.id, submission.clone());
        let mut values = self.values.write().await;
        values.extend(new.values.iter().map(|v| value_row(new.id, v)));
        Ok(submission)
    }

    async fn revise(&self, revision: &SubmissionRevision) -> Result<Submission> {
        self.check_writable()?;
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .get_mut(&revision.submission_id)
            .ok_or_else(|| SuratError::NotFound(format!("submission {}", revision.submission_id)))?;
        lifecycle::status_after_owner_edit(submission.status)?;
        submission.status = revision.status;
        submission.rejection_reason = None;
        submission.updated_at = Utc::now();

        let mut values = self.values.write().await;
        for v in &revision.values {
            match values.iter_mut().find(|row| {
                row.submission_id == revision.submission_id
                    && row.attribute_definition_id == v.attribute_definition_id
            }) {
                Some(row) => {
                    row.value = v.value.clone();
                    row.file_paths = v.file_paths.clone();
                }
                None => values.push(value_row(revision.submission_id, v)),
            }
        }
        Ok(submission.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        Ok(self.submissions.read().await.get(&id).cloned())
    }

    async fn values(&self, submission_id: Uuid) -> Result<Vec<SubmissionAttributeValue>> {
        let values = self.values.read().await;
        Ok(values
            .iter()
            .filter(|v| v.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
        let submissions = self.submissions.read().await;
        let mut out: Vec<_> = submissions
            .values()
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| filter.letter_type_id.map_or(true, |id| s.letter_type_id == id))
            .filter(|s| filter.resident_id.map_or(true, |id| s.resident_id == id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.submission_date.cmp(&a.submission_date));
        Ok(out)
    }

    async fn verify(&self, v: &SubmissionVerification) -> Result<Submission> {
        let mut submissions = self.submissions.write().await;
        let submission = submissions
            .get_mut(&v.submission_id)
            .ok_or_else(|| SuratError::NotFound(format!("submission {}", v.submission_id)))?;
        lifecycle::check_verification(submission.status, v.status)?;
        submission.status = v.status;
        submission.letter_number = v.letter_number.clone();
        submission.approval_date = v.approval_date;
        submission.rejection_reason = v.rejection_reason.clone();
        submission.approver_user_id = Some(v.approver_user_id);
        submission.signature_path = v.signature_path.clone();
        submission.updated_at = Utc::now();
        Ok(submission.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut submissions = self.submissions.write().await;
        let Some(submission) = submissions.get(&id) else {
            return Ok(false);
        };
        lifecycle::can_delete(submission.status)?;
        submissions.remove(&id);
        self.values.write().await.retain(|v| v.submission_id != id);
        Ok(true)
    }

    async fn count_approved_in_year(
        &self,
        letter_type_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u32> {
        let submissions = self.submissions.read().await;
        let count = submissions
            .values()
            .filter(|s| s.letter_type_id == letter_type_id)
            .filter(|s| s.status == SubmissionStatus::Approved)
            .filter(|s| s.approval_date.is_some_and(|d| d.year() == at.year()))
            .count();
        Ok(count as u32)
    }
}

// ── Residents & signatures ────────────────────────────────────

#[derive(Default)]
pub struct MemoryResidentStore {
    residents: RwLock<HashMap<Uuid, Resident>>,
}

impl MemoryResidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, resident: Resident) {
        self.residents.write().await.insert(resident.id, resident);
    }
}

#[async_trait]
impl ResidentStore for MemoryResidentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Resident>> {
        Ok(self.residents.read().await.get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Resident>> {
        let residents = self.residents.read().await;
        Ok(residents
            .values()
            .find(|r| r.user_id == Some(user_id))
            .cloned())
    }
}

#[derive(Default)]
pub struct MemorySignatureStore {
    signatures: RwLock<HashMap<Uuid, String>>,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignatureStore for MemorySignatureStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.signatures.read().await.get(&user_id).cloned())
    }

    async fn set(&self, user_id: Uuid, signature_path: &str) -> Result<()> {
        self.signatures
            .write()
            .await
            .insert(user_id, signature_path.to_string());
        Ok(())
    }
}

// ── Blobs ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        key: &str,
        content: &[u8],
        _content_type: &str,
    ) -> std::result::Result<(), BlobStoreError> {
        check_key(key)?;
        self.blobs
            .write()
            .await
            .insert(key.to_string(), content.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), BlobStoreError> {
        check_key(key)?;
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> std::result::Result<bool, BlobStoreError> {
        Ok(self.blobs.read().await.contains_key(key))
    }
}
