//! Postgres implementations of all surat_core port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid compile-time DB requirement.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use surat_core::error::SuratError;
use surat_core::ports::{LetterTypeStore, ResidentStore, Result, SignatureStore, SubmissionStore};
use surat_core::types::*;

use crate::rows::*;

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn convert<R, T>(row: R) -> Result<T>
where
    T: TryFrom<R, Error = String>,
{
    row.try_into()
        .map_err(|e: String| SuratError::Internal(anyhow!(e)))
}

// ── PgLetterTypeStore ─────────────────────────────────────────

pub struct PgLetterTypeStore {
    pool: PgPool,
}

impl PgLetterTypeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_definition(
        tx: &mut Transaction<'_, Postgres>,
        def: &AttributeDefinition,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attribute_definitions
                (id, letter_type_id, name, data_type, options, is_required,
                 attachment_label, min_attachment_count, is_attachment_required, display_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                data_type = EXCLUDED.data_type,
                options = EXCLUDED.options,
                is_required = EXCLUDED.is_required,
                attachment_label = EXCLUDED.attachment_label,
                min_attachment_count = EXCLUDED.min_attachment_count,
                is_attachment_required = EXCLUDED.is_attachment_required,
                display_order = EXCLUDED.display_order,
                updated_at = now()
            WHERE attribute_definitions.letter_type_id = EXCLUDED.letter_type_id
              AND attribute_definitions.deleted_at IS NULL
            "#,
        )
        .bind(def.id)
        .bind(def.letter_type_id)
        .bind(&def.name)
        .bind(def.data_type.as_ref())
        .bind(&def.options)
        .bind(def.is_required)
        .bind(&def.attachment_label)
        .bind(i32::try_from(def.min_attachment_count).map_err(|_| {
            SuratError::field(
                "min_attachment_count",
                format!("attribute {} has an out-of-range attachment count", def.id),
            )
        })?)
        .bind(def.is_attachment_required)
        .bind(def.display_order)
        .execute(&mut **tx)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn fetch_definitions(
        &self,
        letter_type_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<AttributeDefinition>> {
        let query = format!(
            "SELECT {DEFINITION_COLUMNS} FROM attribute_definitions \
             WHERE letter_type_id = $1 AND ($2 OR deleted_at IS NULL)"
        );
        let rows = sqlx::query_as::<_, PgAttributeDefinitionRow>(&query)
            .bind(letter_type_id)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        rows.into_iter().map(convert).collect()
    }

    async fn fetch_type(&self, id: Uuid, include_deleted: bool) -> Result<Option<LetterType>> {
        let query = format!(
            "SELECT {LETTER_TYPE_COLUMNS} FROM letter_types \
             WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        );
        let row = sqlx::query_as::<_, PgLetterTypeRow>(&query)
            .bind(id)
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(row.map(LetterType::from))
    }
}

#[async_trait]
impl LetterTypeStore for PgLetterTypeStore {
    async fn list(&self) -> Result<Vec<LetterType>> {
        let query = format!(
            "SELECT {LETTER_TYPE_COLUMNS} FROM letter_types \
             WHERE deleted_at IS NULL ORDER BY name"
        );
        let rows = sqlx::query_as::<_, PgLetterTypeRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(LetterType::from).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LetterType>> {
        self.fetch_type(id, false).await
    }

    async fn get_with_deleted(&self, id: Uuid) -> Result<Option<LetterType>> {
        self.fetch_type(id, true).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<LetterType>> {
        let query = format!(
            "SELECT {LETTER_TYPE_COLUMNS} FROM letter_types \
             WHERE upper(code) = upper($1) AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, PgLetterTypeRow>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(row.map(LetterType::from))
    }

    async fn create(
        &self,
        letter_type: &LetterType,
        definitions: &[AttributeDefinition],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        sqlx::query(
            r#"
            INSERT INTO letter_types (id, name, code, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(letter_type.id)
        .bind(&letter_type.name)
        .bind(&letter_type.code)
        .bind(&letter_type.description)
        .bind(letter_type.created_at)
        .bind(letter_type.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SuratError::Conflict(format!(
                    "letter type code {} is already in use",
                    letter_type.code
                ))
            } else {
                SuratError::Internal(anyhow!(e))
            }
        })?;

        for def in definitions {
            Self::upsert_definition(&mut tx, def).await?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn update(&self, letter_type: &LetterType) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE letter_types
            SET name = $2, code = $3, description = $4, updated_at = $5
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(letter_type.id)
        .bind(&letter_type.name)
        .bind(&letter_type.code)
        .bind(&letter_type.description)
        .bind(letter_type.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SuratError::Conflict(format!(
                    "letter type code {} is already in use",
                    letter_type.code
                ))
            } else {
                SuratError::Internal(anyhow!(e))
            }
        })?;
        if result.rows_affected() == 0 {
            return Err(SuratError::NotFound(format!(
                "letter type {}",
                letter_type.id
            )));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE letter_types SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn definitions(&self, letter_type_id: Uuid) -> Result<Vec<AttributeDefinition>> {
        self.fetch_definitions(letter_type_id, false).await
    }

    async fn definitions_with_deleted(
        &self,
        letter_type_id: Uuid,
    ) -> Result<Vec<AttributeDefinition>> {
        self.fetch_definitions(letter_type_id, true).await
    }

    async fn replace_definitions(
        &self,
        letter_type_id: Uuid,
        definitions: &[AttributeDefinition],
    ) -> Result<()> {
        let keep: Vec<Uuid> = definitions.iter().map(|d| d.id).collect();
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        let removed = sqlx::query(
            r#"
            UPDATE attribute_definitions
            SET deleted_at = now()
            WHERE letter_type_id = $1
              AND deleted_at IS NULL
              AND NOT (id = ANY($2))
            "#,
        )
        .bind(letter_type_id)
        .bind(&keep)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        for def in definitions {
            Self::upsert_definition(&mut tx, def).await?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        tracing::debug!(
            letter_type_id = %letter_type_id,
            kept = definitions.len(),
            removed = removed.rows_affected(),
            "attribute definitions replaced"
        );
        Ok(())
    }
}

// ── PgSubmissionStore ─────────────────────────────────────────

pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Error for a guarded write that matched no row: the row is gone, or its
    /// status moved on since the caller read it.
    async fn unmatched_write(&self, id: Uuid, action: &str) -> SuratError {
        let status =
            sqlx::query_scalar::<_, String>("SELECT status FROM submissions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
        match status {
            Ok(Some(status)) => {
                SuratError::InvalidTransition(format!("cannot {action} a {status} submission"))
            }
            Ok(None) => SuratError::NotFound(format!("submission {id}")),
            Err(e) => SuratError::Internal(anyhow!(e)),
        }
    }

    async fn upsert_value(
        tx: &mut Transaction<'_, Postgres>,
        submission_id: Uuid,
        value: &NewAttributeValue,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO submission_attribute_values
                (id, submission_id, attribute_definition_id, value, file_paths)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (submission_id, attribute_definition_id) DO UPDATE SET
                value = EXCLUDED.value,
                file_paths = EXCLUDED.file_paths,
                updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(submission_id)
        .bind(value.attribute_definition_id)
        .bind(&value.value)
        .bind(&value.file_paths)
        .execute(&mut **tx)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn create(&self, new: &NewSubmission) -> Result<Submission> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        let query = format!(
            "INSERT INTO submissions (id, letter_type_id, resident_id, status, created_by) \
             VALUES ($1, $2, $3, 'pending', $4) RETURNING {SUBMISSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PgSubmissionRow>(&query)
            .bind(new.id)
            .bind(new.letter_type_id)
            .bind(new.resident_id)
            .bind(new.created_by)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;

        for value in &new.values {
            Self::upsert_value(&mut tx, new.id, value).await?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        convert(row)
    }

    async fn revise(&self, revision: &SubmissionRevision) -> Result<Submission> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        let query = format!(
            "UPDATE submissions SET status = $2, rejection_reason = NULL, updated_at = now() \
             WHERE id = $1 AND status IN ('pending', 'rejected', 'needs_revision') \
             RETURNING {SUBMISSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PgSubmissionRow>(&query)
            .bind(revision.submission_id)
            .bind(revision.status.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        let Some(row) = row else {
            drop(tx);
            return Err(self.unmatched_write(revision.submission_id, "edit").await);
        };

        for value in &revision.values {
            Self::upsert_value(&mut tx, revision.submission_id, value).await?;
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        convert(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>> {
        let query = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1");
        let row = sqlx::query_as::<_, PgSubmissionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn values(&self, submission_id: Uuid) -> Result<Vec<SubmissionAttributeValue>> {
        let query = format!(
            "SELECT {VALUE_COLUMNS} FROM submission_attribute_values WHERE submission_id = $1"
        );
        let rows = sqlx::query_as::<_, PgValueRow>(&query)
            .bind(submission_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(SubmissionAttributeValue::from).collect())
    }

    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
        let query = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR letter_type_id = $2) \
               AND ($3::uuid IS NULL OR resident_id = $3) \
             ORDER BY submission_date DESC"
        );
        let rows = sqlx::query_as::<_, PgSubmissionRow>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.letter_type_id)
            .bind(filter.resident_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        rows.into_iter().map(convert).collect()
    }

    async fn verify(&self, v: &SubmissionVerification) -> Result<Submission> {
        let query = format!(
            "UPDATE submissions SET status = $2, letter_number = $3, approval_date = $4, \
                 rejection_reason = $5, approver_user_id = $6, signature_path = $7, \
                 updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {SUBMISSION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PgSubmissionRow>(&query)
            .bind(v.submission_id)
            .bind(v.status.as_str())
            .bind(&v.letter_number)
            .bind(v.approval_date)
            .bind(&v.rejection_reason)
            .bind(v.approver_user_id)
            .bind(&v.signature_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    SuratError::Conflict(format!(
                        "letter number {} was issued concurrently",
                        v.letter_number.as_deref().unwrap_or("-")
                    ))
                } else {
                    SuratError::Internal(anyhow!(e))
                }
            })?;
        match row {
            Some(row) => convert(row),
            None => Err(self.unmatched_write(v.submission_id, "verify").await),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM submissions WHERE id = $1 AND status <> 'approved'")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.unmatched_write(id, "delete").await {
            SuratError::NotFound(_) => Ok(false),
            other => Err(other),
        }
    }

    async fn count_approved_in_year(
        &self,
        letter_type_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM submissions
            WHERE letter_type_id = $1
              AND status = 'approved'
              AND EXTRACT(YEAR FROM approval_date AT TIME ZONE 'UTC')::int = $2
            "#,
        )
        .bind(letter_type_id)
        .bind(at.year())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        u32::try_from(count).map_err(|e| SuratError::Internal(anyhow!(e)))
    }
}

// ── PgResidentStore ───────────────────────────────────────────

pub struct PgResidentStore {
    pool: PgPool,
}

impl PgResidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResidentStore for PgResidentStore {
    async fn get(&self, id: Uuid) -> Result<Option<Resident>> {
        let row = sqlx::query_as::<_, PgResidentRow>(
            "SELECT id, user_id, nik, name, address FROM residents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Resident::from))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Resident>> {
        let row = sqlx::query_as::<_, PgResidentRow>(
            "SELECT id, user_id, nik, name, address FROM residents WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Resident::from))
    }
}

// ── PgSignatureStore ──────────────────────────────────────────

pub struct PgSignatureStore {
    pool: PgPool,
}

impl PgSignatureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignatureStore for PgSignatureStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<String>> {
        let path = sqlx::query_scalar::<_, String>(
            "SELECT signature_path FROM user_signatures WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(path)
    }

    async fn set(&self, user_id: Uuid, signature_path: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_signatures (user_id, signature_path)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                signature_path = EXCLUDED.signature_path,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(signature_path)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
