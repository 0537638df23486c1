//! Multipart form decoding for submission and verification requests.
//!
//! Field names follow the portal's HTML forms:
//!
//! ```text
//! jenis_surat_id                          letter type id (create)
//! penduduk_id                             resident id, admin on-behalf (create)
//! attribute[<id>][nilai]                  attribute value
//! attribute[<id>][lampiran_files][]       uploaded attachment (repeatable)
//! attribute[<id>][deleted_files][]        stored attachment to drop (edit)
//! status, alasan_penolakan, tanda_tangan_type,
//! use_existing_ttd, tanda_tangan_digital, tanda_tangan_file   (verification)
//! ```
//!
//! Decoding is split in two: [`FormAccumulator`] is pure and unit tested,
//! the `read_*` functions only drain axum's [`Multipart`] into it.

use std::collections::BTreeMap;

use axum::extract::Multipart;
use surat_core::error::{FieldErrors, SuratError};
use surat_core::types::{
    AttributeInput, SubmissionEdit, SubmissionForm, UploadedFile, VerificationForm,
};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    LetterType,
    Resident,
    AttributeValue(Uuid),
    AttributeFile(Uuid),
    AttributeDeletedFile(Uuid),
    Status,
    Reason,
    SignatureType,
    UseExistingSignature,
    SignatureDigital,
    SignatureFile,
    Unknown,
}

impl FormField {
    pub fn parse(name: &str) -> Self {
        match name {
            "jenis_surat_id" => Self::LetterType,
            "penduduk_id" => Self::Resident,
            "status" => Self::Status,
            "alasan_penolakan" => Self::Reason,
            "tanda_tangan_type" => Self::SignatureType,
            "use_existing_ttd" => Self::UseExistingSignature,
            "tanda_tangan_digital" => Self::SignatureDigital,
            "tanda_tangan_file" => Self::SignatureFile,
            _ => Self::parse_attribute(name).unwrap_or(Self::Unknown),
        }
    }

    fn parse_attribute(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("attribute[")?;
        let (id, rest) = rest.split_once(']')?;
        let id = Uuid::parse_str(id.trim()).ok()?;
        let slot = rest.strip_prefix('[')?;
        let (slot, tail) = slot.split_once(']')?;
        // Array suffix is optional: `[]` or an explicit index like `[0]`.
        let tail_ok = tail.is_empty()
            || tail
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .is_some_and(|idx| idx.chars().all(|c| c.is_ascii_digit()));
        if !tail_ok {
            return None;
        }
        match slot {
            "nilai" if tail.is_empty() => Some(Self::AttributeValue(id)),
            "lampiran_files" => Some(Self::AttributeFile(id)),
            "deleted_files" => Some(Self::AttributeDeletedFile(id)),
            _ => None,
        }
    }
}

/// Collects decoded parts, then converts into one of the request payloads.
#[derive(Debug, Default)]
pub struct FormAccumulator {
    letter_type: Option<String>,
    resident: Option<String>,
    attributes: BTreeMap<Uuid, AttributeInput>,
    verification: VerificationForm,
}

impl FormAccumulator {
    pub fn push_text(&mut self, name: &str, value: String) {
        match FormField::parse(name) {
            FormField::LetterType => self.letter_type = Some(value),
            FormField::Resident => self.resident = Some(value),
            FormField::AttributeValue(id) => {
                self.attributes.entry(id).or_default().value = Some(value);
            }
            FormField::AttributeDeletedFile(id) => {
                let value = value.trim();
                if !value.is_empty() {
                    self.attributes
                        .entry(id)
                        .or_default()
                        .deleted_files
                        .push(value.to_string());
                }
            }
            FormField::Status => self.verification.status = Some(value),
            FormField::Reason => self.verification.reason = Some(value),
            FormField::SignatureType => self.verification.signature_type = Some(value),
            FormField::UseExistingSignature => {
                self.verification.use_existing_signature = Some(value)
            }
            FormField::SignatureDigital => self.verification.signature_digital = Some(value),
            FormField::AttributeFile(_) | FormField::SignatureFile => {
                tracing::debug!(field = name, "text part sent for a file field, ignored");
            }
            FormField::Unknown => tracing::debug!(field = name, "unknown form field ignored"),
        }
    }

    pub fn push_file(&mut self, name: &str, file: UploadedFile) {
        // An empty file input still posts a part with no name and no bytes.
        if file.file_name.is_empty() && file.data.is_empty() {
            return;
        }
        match FormField::parse(name) {
            FormField::AttributeFile(id) => self.attributes.entry(id).or_default().files.push(file),
            FormField::SignatureFile => self.verification.signature_file = Some(file),
            _ => tracing::debug!(field = name, "file sent for a non-file field, ignored"),
        }
    }

    pub fn into_submission_form(self) -> Result<SubmissionForm, SuratError> {
        let mut errors = FieldErrors::new();
        let letter_type_id = parse_id(self.letter_type, "jenis_surat_id", &mut errors);
        let resident_id = parse_id(self.resident, "penduduk_id", &mut errors);
        errors.into_result()?;
        Ok(SubmissionForm {
            letter_type_id,
            resident_id,
            attributes: self.attributes,
        })
    }

    pub fn into_submission_edit(self) -> SubmissionEdit {
        SubmissionEdit {
            attributes: self.attributes,
        }
    }

    pub fn into_verification_form(self) -> VerificationForm {
        self.verification
    }
}

fn parse_id(raw: Option<String>, key: &str, errors: &mut FieldErrors) -> Option<Uuid> {
    let raw = raw?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(key, format!("The selected {key} is invalid."));
            None
        }
    }
}

async fn drain(mut multipart: Multipart) -> Result<FormAccumulator, AppError> {
    let mut acc = FormAccumulator::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(bad_multipart)?;
                acc.push_file(
                    &name,
                    UploadedFile {
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    },
                );
            }
            None => {
                let value = field.text().await.map_err(bad_multipart)?;
                acc.push_text(&name, value);
            }
        }
    }
    Ok(acc)
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError(SuratError::InvalidInput(format!(
        "malformed multipart body: {}",
        e.body_text()
    )))
}

pub async fn read_submission_form(multipart: Multipart) -> Result<SubmissionForm, AppError> {
    Ok(drain(multipart).await?.into_submission_form()?)
}

pub async fn read_submission_edit(multipart: Multipart) -> Result<SubmissionEdit, AppError> {
    Ok(drain(multipart).await?.into_submission_edit())
}

pub async fn read_verification_form(multipart: Multipart) -> Result<VerificationForm, AppError> {
    Ok(drain(multipart).await?.into_verification_form())
}
