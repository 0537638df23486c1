//! Attribute schema resolution and letter-type input checks.
//!
//! Resolution turns a letter-type id into its active definitions in display
//! order. The `check_*` / `build_*` functions are pure and aggregate every
//! problem into one [`FieldErrors`] map keyed `attributes.<index>.<field>`.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{FieldErrors, SuratError},
    ports::LetterTypeStore,
    types::{
        AttributeDataType, AttributeDefinition, AttributeDefinitionInput, LetterType,
        LetterTypeInput,
    },
};

const MAX_CODE_LEN: usize = 20;
/// Upper bound for `min_attachment_count`.
pub const MAX_ATTACHMENT_COUNT: u32 = 50;

/// Sort by `display_order` ascending, ties broken by name.
pub fn order_definitions(mut definitions: Vec<AttributeDefinition>) -> Vec<AttributeDefinition> {
    definitions.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.name.cmp(&b.name))
    });
    definitions
}

/// Load an active letter type and its ordered schema.
pub async fn resolve(
    store: &dyn LetterTypeStore,
    letter_type_id: Uuid,
) -> Result<(LetterType, Vec<AttributeDefinition>), SuratError> {
    let letter_type = store
        .get(letter_type_id)
        .await?
        .ok_or_else(|| SuratError::NotFound(format!("letter type {letter_type_id}")))?;
    let definitions = store.definitions(letter_type_id).await?;
    Ok((letter_type, order_definitions(definitions)))
}

/// Canonical form of a letter-type code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Name / code checks for create and update.
pub fn check_letter_type_input(input: &LetterTypeInput, errors: &mut FieldErrors) {
    if input.name.trim().is_empty() {
        errors.add("name", "The name field is required.");
    }
    let code = normalize_code(&input.code);
    if code.is_empty() {
        errors.add("code", "The code field is required.");
    } else if code.len() > MAX_CODE_LEN {
        errors.add(
            "code",
            format!("The code may not be greater than {MAX_CODE_LEN} characters."),
        );
    } else if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        errors.add(
            "code",
            "The code may only contain letters, digits, dashes and dots.",
        );
    }
}

/// Build a fresh [`LetterType`] row from validated input.
pub fn new_letter_type(input: &LetterTypeInput) -> LetterType {
    let now = Utc::now();
    LetterType {
        id: Uuid::new_v4(),
        name: input.name.trim().to_string(),
        code: normalize_code(&input.code),
        description: clean_optional(input.description.as_deref()),
        created_at: now,
        updated_at: now,
    }
}

fn clean_optional(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Check every definition input and turn the schema into rows for
/// `letter_type_id`. Inputs carrying an `id` must refer to a definition in
/// `existing`; inputs without one get a fresh id.
pub fn build_definitions(
    letter_type_id: Uuid,
    inputs: &[AttributeDefinitionInput],
    existing: &[AttributeDefinition],
) -> Result<Vec<AttributeDefinition>, SuratError> {
    let mut errors = FieldErrors::new();
    let existing_ids: HashSet<Uuid> = existing.iter().map(|d| d.id).collect();
    let mut seen_names: HashMap<String, usize> = HashMap::new();
    let mut seen_ids: HashSet<Uuid> = HashSet::new();
    let mut definitions = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        let key = |field: &str| format!("attributes.{index}.{field}");

        let name = input.name.trim();
        if name.is_empty() {
            errors.add(key("name"), "The attribute name is required.");
        } else if let Some(first) = seen_names.insert(name.to_lowercase(), index) {
            errors.add(
                key("name"),
                format!("The attribute name duplicates attributes.{first}.name."),
            );
        }

        if let Some(id) = input.id {
            if !existing_ids.contains(&id) {
                errors.add(key("id"), "The attribute does not belong to this letter type.");
            } else if !seen_ids.insert(id) {
                errors.add(key("id"), "The attribute is listed more than once.");
            }
        }

        let options: Vec<String> = input
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if input.data_type == AttributeDataType::Select && options.is_empty() {
            errors.add(key("options"), "A select attribute needs at least one option.");
        }

        let attachment_label = clean_optional(input.attachment_label.as_deref());
        if attachment_label.is_some() && input.min_attachment_count < 1 {
            errors.add(
                key("min_attachment_count"),
                "The minimum attachment count must be at least 1 when an attachment label is set.",
            );
        } else if input.min_attachment_count > MAX_ATTACHMENT_COUNT {
            errors.add(
                key("min_attachment_count"),
                format!(
                    "The minimum attachment count may not be greater than {MAX_ATTACHMENT_COUNT}."
                ),
            );
        }
        if input.is_attachment_required && attachment_label.is_none() {
            errors.add(
                key("attachment_label"),
                "A required attachment needs an attachment label.",
            );
        }

        definitions.push(AttributeDefinition {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            letter_type_id,
            name: name.to_string(),
            data_type: input.data_type,
            options: if input.data_type == AttributeDataType::Select {
                options
            } else {
                Vec::new()
            },
            is_required: input.is_required,
            min_attachment_count: if attachment_label.is_some() {
                input.min_attachment_count
            } else {
                0
            },
            is_attachment_required: input.is_attachment_required && attachment_label.is_some(),
            attachment_label,
            display_order: input.display_order.unwrap_or(index as i32),
        });
    }

    errors.into_result()?;
    Ok(definitions)
}
