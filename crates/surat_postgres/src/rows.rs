//! sqlx row types and their conversion into core domain types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use surat_core::types::*;

pub(crate) const LETTER_TYPE_COLUMNS: &str =
    "id, name, code, description, created_at, updated_at";

pub(crate) const DEFINITION_COLUMNS: &str = "id, letter_type_id, name, data_type, options, \
     is_required, attachment_label, min_attachment_count, is_attachment_required, display_order";

pub(crate) const SUBMISSION_COLUMNS: &str = "id, letter_type_id, resident_id, submission_date, \
     status, letter_number, approval_date, rejection_reason, approver_user_id, signature_path, \
     created_by, created_at, updated_at";

pub(crate) const VALUE_COLUMNS: &str =
    "id, submission_id, attribute_definition_id, value, file_paths";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgLetterTypeRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PgLetterTypeRow> for LetterType {
    fn from(r: PgLetterTypeRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            code: r.code,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgAttributeDefinitionRow {
    pub id: Uuid,
    pub letter_type_id: Uuid,
    pub name: String,
    pub data_type: String,
    pub options: Vec<String>,
    pub is_required: bool,
    pub attachment_label: Option<String>,
    pub min_attachment_count: i32,
    pub is_attachment_required: bool,
    pub display_order: i32,
}

impl TryFrom<PgAttributeDefinitionRow> for AttributeDefinition {
    type Error = String;

    fn try_from(r: PgAttributeDefinitionRow) -> Result<Self, Self::Error> {
        let data_type = AttributeDataType::from_str(&r.data_type)
            .map_err(|_| format!("unknown data_type '{}' on attribute {}", r.data_type, r.id))?;
        let min_attachment_count = u32::try_from(r.min_attachment_count)
            .map_err(|_| format!("negative min_attachment_count on attribute {}", r.id))?;
        Ok(Self {
            id: r.id,
            letter_type_id: r.letter_type_id,
            name: r.name,
            data_type,
            options: r.options,
            is_required: r.is_required,
            attachment_label: r.attachment_label,
            min_attachment_count,
            is_attachment_required: r.is_attachment_required,
            display_order: r.display_order,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgSubmissionRow {
    pub id: Uuid,
    pub letter_type_id: Uuid,
    pub resident_id: Uuid,
    pub submission_date: DateTime<Utc>,
    pub status: String,
    pub letter_number: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approver_user_id: Option<Uuid>,
    pub signature_path: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgSubmissionRow> for Submission {
    type Error = String;

    fn try_from(r: PgSubmissionRow) -> Result<Self, Self::Error> {
        let status = SubmissionStatus::parse(&r.status)
            .ok_or_else(|| format!("unknown status '{}' on submission {}", r.status, r.id))?;
        Ok(Self {
            id: r.id,
            letter_type_id: r.letter_type_id,
            resident_id: r.resident_id,
            submission_date: r.submission_date,
            status,
            letter_number: r.letter_number,
            approval_date: r.approval_date,
            rejection_reason: r.rejection_reason,
            approver_user_id: r.approver_user_id,
            signature_path: r.signature_path,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgValueRow {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub attribute_definition_id: Uuid,
    pub value: Option<String>,
    pub file_paths: Vec<String>,
}

impl From<PgValueRow> for SubmissionAttributeValue {
    fn from(r: PgValueRow) -> Self {
        Self {
            id: r.id,
            submission_id: r.submission_id,
            attribute_definition_id: r.attribute_definition_id,
            value: r.value,
            file_paths: r.file_paths,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PgResidentRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub nik: String,
    pub name: String,
    pub address: Option<String>,
}

impl From<PgResidentRow> for Resident {
    fn from(r: PgResidentRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            nik: r.nik,
            name: r.name,
            address: r.address,
        }
    }
}
