//! Schema-driven submission validation.
//!
//! Rules are assembled at request time from the letter type's active
//! definitions ([`ValidationPlan::from_definitions`]) and then applied to the
//! decoded form ([`ValidationPlan::apply`]). Every failing field is reported;
//! nothing short-circuits.
//!
//! Error keys:
//!   attribute.<id>.nilai              value presence / type
//!   attribute.<id>.lampiran_files     attachment count
//!   attribute.<id>.lampiran_files.<n> a single uploaded file

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate};
use uuid::Uuid;

use crate::{
    error::{FieldErrors, SuratError},
    types::{AttributeDataType, AttributeDefinition, AttributeInput, UploadedFile},
};

pub const DEFAULT_MAX_FILE_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

// ── Rules ─────────────────────────────────────────────────────

/// Type rule for a value, one variant per [`AttributeDataType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRule {
    Text,
    Number,
    Date,
    Boolean,
    Select(Vec<String>),
}

impl ValueRule {
    fn for_definition(def: &AttributeDefinition) -> Self {
        match def.data_type {
            AttributeDataType::Text => Self::Text,
            AttributeDataType::Number => Self::Number,
            AttributeDataType::Date => Self::Date,
            AttributeDataType::Boolean => Self::Boolean,
            AttributeDataType::Select => Self::Select(def.options.clone()),
        }
    }

    /// Check a non-empty trimmed value and return its stored form.
    fn normalize(&self, raw: &str) -> Option<String> {
        match self {
            Self::Text => Some(raw.to_string()),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|_| raw.to_string()),
            Self::Date => parse_date(raw).map(|d| d.format("%Y-%m-%d").to_string()),
            Self::Boolean => parse_bool(raw).map(|b| if b { "1" } else { "0" }.to_string()),
            Self::Select(options) => options.iter().find(|o| o.as_str() == raw).cloned(),
        }
    }

    fn message(&self, name: &str) -> String {
        match self {
            Self::Text => format!("The {name} must be a string."),
            Self::Number => format!("The {name} must be a number."),
            Self::Date => format!("The {name} is not a valid date."),
            Self::Boolean => format!("The {name} field must be true or false."),
            Self::Select(_) => format!("The selected {name} is invalid."),
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRule {
    pub label: String,
    pub min_count: u32,
    pub required: bool,
}

/// Everything needed to check one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub attribute_id: Uuid,
    pub name: String,
    pub required: bool,
    pub value: ValueRule,
    pub attachment: Option<AttachmentRule>,
}

/// Per-file constraints for attachments.
#[derive(Debug, Clone)]
pub struct FileLimits {
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl FileLimits {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn check(&self, file: &UploadedFile) -> Option<String> {
        if file.data.is_empty() {
            return Some("The file must not be empty.".into());
        }
        if file.data.len() > self.max_bytes {
            return Some(format!(
                "The file may not be greater than {} kilobytes.",
                self.max_bytes / 1024
            ));
        }
        let extension = file
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if self.allowed_extensions.iter().any(|a| *a == ext) => None,
            _ => Some(format!(
                "The file must be a file of type: {}.",
                self.allowed_extensions.join(", ")
            )),
        }
    }
}

// ── Plan ──────────────────────────────────────────────────────

/// A field that passed validation, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedField {
    pub attribute_id: Uuid,
    /// Normalised value; `None` when absent or blank.
    pub value: Option<String>,
    /// The client sent the value key (even if blank).
    pub value_supplied: bool,
    pub files: Vec<UploadedFile>,
    pub deleted_files: Vec<String>,
}

impl ValidatedField {
    /// Whether this field produces (or touches) a stored row.
    pub fn has_content(&self) -> bool {
        self.value_supplied || !self.files.is_empty() || !self.deleted_files.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationPlan {
    rules: Vec<FieldRule>,
}

impl ValidationPlan {
    /// Build rules in the order given (callers pass display order).
    pub fn from_definitions(definitions: &[AttributeDefinition]) -> Self {
        let rules = definitions
            .iter()
            .map(|def| FieldRule {
                attribute_id: def.id,
                name: def.name.clone(),
                required: def.is_required,
                value: ValueRule::for_definition(def),
                attachment: def.attachment_label.as_ref().map(|label| AttachmentRule {
                    label: label.clone(),
                    min_count: def.min_attachment_count,
                    required: def.is_attachment_required,
                }),
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Apply the plan to decoded inputs.
    ///
    /// `kept_files` holds, per attribute, how many stored files survive the
    /// edit's deletions; new uploads are added on top before the count check.
    /// Inputs for ids outside the plan are dropped.
    pub fn apply(
        &self,
        mut inputs: BTreeMap<Uuid, AttributeInput>,
        kept_files: &HashMap<Uuid, usize>,
        limits: &FileLimits,
    ) -> Result<Vec<ValidatedField>, SuratError> {
        let mut errors = FieldErrors::new();
        let mut fields = Vec::new();

        for rule in &self.rules {
            let input = inputs.remove(&rule.attribute_id).unwrap_or_default();
            fields.push(check_field(rule, input, kept_files, limits, &mut errors));
        }

        for unknown in inputs.keys() {
            tracing::debug!(attribute_id = %unknown, "ignoring input for unknown attribute");
        }

        errors.into_result()?;
        Ok(fields)
    }
}

fn check_field(
    rule: &FieldRule,
    input: AttributeInput,
    kept_files: &HashMap<Uuid, usize>,
    limits: &FileLimits,
    errors: &mut FieldErrors,
) -> ValidatedField {
    let id = rule.attribute_id;
    let value_key = format!("attribute.{id}.nilai");
    let value_supplied = input.value.is_some();

    let trimmed = input
        .value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let value = match trimmed {
        None => {
            if rule.required {
                errors.add(&value_key, format!("The {} field is required.", rule.name));
            }
            None
        }
        Some(raw) => match rule.value.normalize(raw) {
            Some(normalised) => Some(normalised),
            None => {
                errors.add(&value_key, rule.value.message(&rule.name));
                None
            }
        },
    };

    let files = match &rule.attachment {
        Some(attachment) => {
            let files_key = format!("attribute.{id}.lampiran_files");
            for (n, file) in input.files.iter().enumerate() {
                if let Some(message) = limits.check(file) {
                    errors.add(format!("{files_key}.{n}"), message);
                }
            }
            let total = kept_files.get(&id).copied().unwrap_or(0) + input.files.len();
            if attachment.required && total < attachment.min_count as usize {
                errors.add(
                    files_key,
                    format!(
                        "The {} must have at least {} file(s).",
                        attachment.label, attachment.min_count
                    ),
                );
            }
            input.files
        }
        None => {
            if !input.files.is_empty() {
                tracing::debug!(
                    attribute_id = %id,
                    "attribute takes no attachments; dropping uploads"
                );
            }
            Vec::new()
        }
    };

    ValidatedField {
        attribute_id: id,
        value,
        value_supplied,
        files,
        deleted_files: if rule.attachment.is_some() {
            input.deleted_files
        } else {
            Vec::new()
        },
    }
}
