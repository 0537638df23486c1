//! Letter types, attribute schemas, submissions. Pure value types, no DB dependency.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Letter types & attribute schema ───────────────────────────

/// A class of issuable letter (jenis surat), e.g. a domicile certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterType {
    pub id: Uuid,
    pub name: String,
    /// Canonical short code, unique among non-deleted types. Used in letter numbers.
    pub code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LetterTypeWithAttributes {
    #[serde(flatten)]
    pub letter_type: LetterType,
    pub attributes: Vec<AttributeDefinition>,
}

/// Value kinds an attribute can declare.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::AsRefStr,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeDataType {
    Text,
    Number,
    Date,
    Select,
    Boolean,
}

/// One field of a letter type's form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: Uuid,
    pub letter_type_id: Uuid,
    pub name: String,
    pub data_type: AttributeDataType,
    /// Allowed values; only meaningful for `select`.
    #[serde(default)]
    pub options: Vec<String>,
    pub is_required: bool,
    /// Label of the attachment slot. `None` means the attribute takes no files.
    pub attachment_label: Option<String>,
    pub min_attachment_count: u32,
    pub is_attachment_required: bool,
    pub display_order: i32,
}

impl AttributeDefinition {
    pub fn accepts_attachments(&self) -> bool {
        self.attachment_label.is_some()
    }
}

/// Admin input for a letter type (create / update).
#[derive(Debug, Clone, Deserialize)]
pub struct LetterTypeInput {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Optional initial schema; only honoured on create.
    #[serde(default)]
    pub attributes: Option<Vec<AttributeDefinitionInput>>,
}

/// Admin input for one attribute definition. `id` is set when updating an
/// existing definition in a schema replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeDefinitionInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub data_type: AttributeDataType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub attachment_label: Option<String>,
    #[serde(default)]
    pub min_attachment_count: u32,
    #[serde(default)]
    pub is_attachment_required: bool,
    #[serde(default)]
    pub display_order: Option<i32>,
}

// ── Residents ─────────────────────────────────────────────────

/// A citizen record (penduduk). Distinct from the authenticating user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// National identity number, 16 digits.
    pub nik: String,
    pub name: String,
    pub address: Option<String>,
}

// ── Submissions ───────────────────────────────────────────────

/// Submission lifecycle status.
///
/// Transitions:
///   Pending → Approved | Rejected | NeedsRevision   (admin verification)
///   Rejected → Pending                              (owner resubmits)
///   NeedsRevision → Pending                         (owner resubmits)
///   Approved is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    NeedsRevision,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsRevision => "needs_revision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "needs_revision" | "needs-revision" => Some(Self::NeedsRevision),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resident's request for a letter of a given type (pengajuan surat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub letter_type_id: Uuid,
    pub resident_id: Uuid,
    pub submission_date: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub letter_number: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approver_user_id: Option<Uuid>,
    pub signature_path: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored value of one attribute for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAttributeValue {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub attribute_definition_id: Uuid,
    pub value: Option<String>,
    pub file_paths: Vec<String>,
}

/// A value row ready to persist (already validated and normalised).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttributeValue {
    pub attribute_definition_id: Uuid,
    pub value: Option<String>,
    pub file_paths: Vec<String>,
}

/// Insert payload for a fresh submission. The id is allocated by the service
/// so attachment keys can be derived before the row exists.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub id: Uuid,
    pub letter_type_id: Uuid,
    pub resident_id: Uuid,
    pub created_by: Uuid,
    pub values: Vec<NewAttributeValue>,
}

/// Owner edit payload. Values are upserted per attribute; rows for attributes
/// not listed are left untouched.
#[derive(Debug, Clone)]
pub struct SubmissionRevision {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub values: Vec<NewAttributeValue>,
}

/// Verification result written by an admin decision.
#[derive(Debug, Clone)]
pub struct SubmissionVerification {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub letter_number: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approver_user_id: Uuid,
    pub signature_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilter {
    #[serde(default)]
    pub status: Option<SubmissionStatus>,
    #[serde(default)]
    pub letter_type_id: Option<Uuid>,
    #[serde(default)]
    pub resident_id: Option<Uuid>,
}

/// A stored value joined to its definition, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeValueView {
    pub definition: AttributeDefinition,
    pub value: Option<String>,
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub letter_type: LetterType,
    pub resident: Resident,
    pub attributes: Vec<AttributeValueView>,
}

/// A rendered letter ready for download.
#[derive(Debug, Clone)]
pub struct LetterPdf {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

// ── Request payloads ──────────────────────────────────────────

/// A file received from the client, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Per-attribute request input, decoded from `attribute[<id>][...]` fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeInput {
    /// `Some` when the client sent `attribute[<id>][nilai]`, even if empty.
    pub value: Option<String>,
    pub files: Vec<UploadedFile>,
    /// References (path or bare filename) of stored files to drop. Edit only.
    pub deleted_files: Vec<String>,
}

/// Create request.
#[derive(Debug, Clone, Default)]
pub struct SubmissionForm {
    pub letter_type_id: Option<Uuid>,
    /// Admin-only: file on behalf of this resident.
    pub resident_id: Option<Uuid>,
    pub attributes: BTreeMap<Uuid, AttributeInput>,
}

/// Edit request.
#[derive(Debug, Clone, Default)]
pub struct SubmissionEdit {
    pub attributes: BTreeMap<Uuid, AttributeInput>,
}

/// Admin verification request, decoded but not yet checked.
#[derive(Debug, Clone, Default)]
pub struct VerificationForm {
    pub status: Option<String>,
    pub reason: Option<String>,
    /// `digital` or `upload`.
    pub signature_type: Option<String>,
    /// `yes` to reuse the approver's stored signature.
    pub use_existing_signature: Option<String>,
    /// Base64 PNG, optionally as a `data:image/png;base64,` URL.
    pub signature_digital: Option<String>,
    pub signature_file: Option<UploadedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parse_accepts_both_revision_spellings() {
        assert_eq!(
            SubmissionStatus::parse("needs_revision"),
            Some(SubmissionStatus::NeedsRevision)
        );
        assert_eq!(
            SubmissionStatus::parse("needs-revision"),
            Some(SubmissionStatus::NeedsRevision)
        );
        assert_eq!(SubmissionStatus::parse("archived"), None);
    }

    #[test]
    fn status_as_str_matches_serde() {
        for status in [
            SubmissionStatus::Pending,
            SubmissionStatus::Approved,
            SubmissionStatus::Rejected,
            SubmissionStatus::NeedsRevision,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().into()));
        }
    }

    #[test]
    fn data_type_strum_and_serde_agree() {
        assert_eq!(
            AttributeDataType::from_str("select").unwrap(),
            AttributeDataType::Select
        );
        assert_eq!(AttributeDataType::Boolean.as_ref(), "boolean");
        let parsed: AttributeDataType = serde_json::from_str("\"number\"").unwrap();
        assert_eq!(parsed, AttributeDataType::Number);
        assert!(AttributeDataType::from_str("file").is_err());
    }

    #[test]
    fn definition_input_defaults() {
        let input: AttributeDefinitionInput =
            serde_json::from_str(r#"{"name":"Keperluan","data_type":"text"}"#).unwrap();
        assert!(input.id.is_none());
        assert!(!input.is_required);
        assert!(input.options.is_empty());
        assert_eq!(input.min_attachment_count, 0);
        assert!(input.display_order.is_none());
    }
}
