//! Storage port traits. `surat_postgres` implements these against Postgres;
//! [`crate::memory`] provides in-memory doubles for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{error::SuratError, types::*};

pub type Result<T> = std::result::Result<T, SuratError>;

/// Letter types and their attribute schemas. Soft-deleted rows are invisible
/// to every read here.
#[async_trait]
pub trait LetterTypeStore: Send + Sync {
    async fn list(&self) -> Result<Vec<LetterType>>;

    async fn get(&self, id: Uuid) -> Result<Option<LetterType>>;

    /// Like [`Self::get`] but also returns soft-deleted types. Used to render
    /// submissions filed against a type that was later removed.
    async fn get_with_deleted(&self, id: Uuid) -> Result<Option<LetterType>>;

    /// Active type carrying `code`, compared case-insensitively.
    async fn find_by_code(&self, code: &str) -> Result<Option<LetterType>>;

    /// Insert a type together with its initial definitions in one transaction.
    async fn create(
        &self,
        letter_type: &LetterType,
        definitions: &[AttributeDefinition],
    ) -> Result<()>;

    async fn update(&self, letter_type: &LetterType) -> Result<()>;

    /// Soft delete. Returns `false` when no active row matched.
    async fn soft_delete(&self, id: Uuid) -> Result<bool>;

    /// Active definitions, unordered. Callers order via [`crate::schema`].
    async fn definitions(&self, letter_type_id: Uuid) -> Result<Vec<AttributeDefinition>>;

    /// Active and soft-deleted definitions, for joining stored values.
    async fn definitions_with_deleted(
        &self,
        letter_type_id: Uuid,
    ) -> Result<Vec<AttributeDefinition>>;

    /// Upsert `definitions` and soft-delete active ones whose id is not listed.
    async fn replace_definitions(
        &self,
        letter_type_id: Uuid,
        definitions: &[AttributeDefinition],
    ) -> Result<()>;
}

/// Submissions and their attribute value rows.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert the submission and all value rows atomically.
    async fn create(&self, submission: &NewSubmission) -> Result<Submission>;

    /// Set the status (clearing the rejection reason) and upsert each listed
    /// value row, atomically. Fails with `InvalidTransition` if the stored row
    /// is already approved.
    async fn revise(&self, revision: &SubmissionRevision) -> Result<Submission>;

    async fn get(&self, id: Uuid) -> Result<Option<Submission>>;

    async fn values(&self, submission_id: Uuid) -> Result<Vec<SubmissionAttributeValue>>;

    /// Newest first.
    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>>;

    /// Record an admin decision. Only a pending row accepts one; anything else
    /// fails with `InvalidTransition`.
    async fn verify(&self, verification: &SubmissionVerification) -> Result<Submission>;

    /// Delete the submission and its value rows. Returns `false` when absent
    /// and `InvalidTransition` when the row is approved.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Number of approved submissions of `letter_type_id` whose approval falls
    /// in the same calendar year as `at`.
    async fn count_approved_in_year(&self, letter_type_id: Uuid, at: DateTime<Utc>)
        -> Result<u32>;
}

/// Read-only access to the citizen registry.
#[async_trait]
pub trait ResidentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Resident>>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Resident>>;
}

/// An approver's reusable signature image, by blob key.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn set(&self, user_id: Uuid, signature_path: &str) -> Result<()>;
}
