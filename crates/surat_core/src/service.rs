//! SuratService: the letter-submission domain service.
//!
//! Takes port traits via `Arc<dyn PortTrait>` so the same logic runs against
//! Postgres (`surat_postgres`) or the in-memory doubles in [`crate::memory`].
//! Every method takes the calling [`Principal`] explicitly and authorizes
//! through [`AccessPolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    blob::BlobStore,
    error::{FieldErrors, SuratError},
    letter_number, lifecycle, pdf,
    policy::{AccessPolicy, Action, Actor, Resource},
    ports::{LetterTypeStore, ResidentStore, Result, SignatureStore, SubmissionStore},
    principal::Principal,
    reconcile::{self, basename},
    schema,
    signature::{self, SignatureSource},
    types::*,
    validation::{FileLimits, ValidatedField, ValidationPlan},
};

const MAX_STORED_NAME_CHARS: usize = 100;

// ── SuratService trait ────────────────────────────────────────

#[async_trait]
pub trait SuratService: Send + Sync {
    /// Active letter types with their ordered schemas.
    async fn list_letter_types(&self, principal: &Principal)
        -> Result<Vec<LetterTypeWithAttributes>>;

    async fn get_letter_type(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<LetterTypeWithAttributes>;

    async fn create_letter_type(
        &self,
        principal: &Principal,
        input: LetterTypeInput,
    ) -> Result<LetterTypeWithAttributes>;

    /// Update name, code and description. `input.attributes` is ignored.
    async fn update_letter_type(
        &self,
        principal: &Principal,
        id: Uuid,
        input: LetterTypeInput,
    ) -> Result<LetterTypeWithAttributes>;

    /// Replace the whole attribute schema. Unlisted definitions are soft-deleted.
    async fn replace_attributes(
        &self,
        principal: &Principal,
        id: Uuid,
        attributes: Vec<AttributeDefinitionInput>,
    ) -> Result<LetterTypeWithAttributes>;

    async fn delete_letter_type(&self, principal: &Principal, id: Uuid) -> Result<()>;

    /// Own submissions for residents, all (filtered) for admins.
    async fn list_submissions(
        &self,
        principal: &Principal,
        filter: SubmissionFilter,
    ) -> Result<Vec<Submission>>;

    async fn get_submission(&self, principal: &Principal, id: Uuid) -> Result<SubmissionDetail>;

    async fn create_submission(
        &self,
        principal: &Principal,
        form: SubmissionForm,
    ) -> Result<SubmissionDetail>;

    async fn update_submission(
        &self,
        principal: &Principal,
        id: Uuid,
        edit: SubmissionEdit,
    ) -> Result<SubmissionDetail>;

    async fn delete_submission(&self, principal: &Principal, id: Uuid) -> Result<()>;

    async fn verify_submission(
        &self,
        principal: &Principal,
        id: Uuid,
        form: VerificationForm,
    ) -> Result<Submission>;

    async fn export_pdf(&self, principal: &Principal, id: Uuid) -> Result<LetterPdf>;
}

// ── SuratServiceImpl ──────────────────────────────────────────

pub struct SuratServiceImpl {
    pub letter_types: Arc<dyn LetterTypeStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub residents: Arc<dyn ResidentStore>,
    pub signatures: Arc<dyn SignatureStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub limits: FileLimits,
}

impl SuratServiceImpl {
    pub fn new(
        letter_types: Arc<dyn LetterTypeStore>,
        submissions: Arc<dyn SubmissionStore>,
        residents: Arc<dyn ResidentStore>,
        signatures: Arc<dyn SignatureStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            letter_types,
            submissions,
            residents,
            signatures,
            blobs,
            limits: FileLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: FileLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn own_resident(&self, principal: &Principal) -> Result<Option<Resident>> {
        self.residents.find_by_user(principal.user_id).await
    }

    async fn load_submission(&self, id: Uuid) -> Result<Submission> {
        self.submissions
            .get(id)
            .await?
            .ok_or_else(|| SuratError::NotFound(format!("submission {id}")))
    }

    /// Load a submission and authorize `action` on it.
    async fn authorized_submission(
        &self,
        principal: &Principal,
        id: Uuid,
        action: Action,
    ) -> Result<Submission> {
        let submission = self.load_submission(id).await?;
        let resident = self.own_resident(principal).await?;
        AccessPolicy::authorize(
            Actor {
                principal,
                resident_id: resident.map(|r| r.id),
            },
            action,
            Resource::Submission {
                resident_id: submission.resident_id,
            },
        )?;
        Ok(submission)
    }

    fn authorize_global(
        &self,
        principal: &Principal,
        resident_id: Option<Uuid>,
        action: Action,
    ) -> Result<()> {
        AccessPolicy::authorize(
            Actor {
                principal,
                resident_id,
            },
            action,
            Resource::Global,
        )
    }

    async fn letter_type_view(&self, id: Uuid) -> Result<LetterTypeWithAttributes> {
        let (letter_type, attributes) = schema::resolve(self.letter_types.as_ref(), id).await?;
        Ok(LetterTypeWithAttributes {
            letter_type,
            attributes,
        })
    }

    async fn detail(&self, submission: Submission) -> Result<SubmissionDetail> {
        let letter_type = self
            .letter_types
            .get_with_deleted(submission.letter_type_id)
            .await?
            .ok_or_else(|| {
                SuratError::NotFound(format!("letter type {}", submission.letter_type_id))
            })?;
        let resident = self
            .residents
            .get(submission.resident_id)
            .await?
            .ok_or_else(|| SuratError::NotFound(format!("resident {}", submission.resident_id)))?;
        let definitions = schema::order_definitions(
            self.letter_types
                .definitions_with_deleted(submission.letter_type_id)
                .await?,
        );
        let mut values: HashMap<Uuid, SubmissionAttributeValue> = self
            .submissions
            .values(submission.id)
            .await?
            .into_iter()
            .map(|v| (v.attribute_definition_id, v))
            .collect();
        let attributes = definitions
            .into_iter()
            .filter_map(|definition| {
                values.remove(&definition.id).map(|v| AttributeValueView {
                    definition,
                    value: v.value,
                    file_paths: v.file_paths,
                })
            })
            .collect();
        Ok(SubmissionDetail {
            submission,
            letter_type,
            resident,
            attributes,
        })
    }

    /// Write every new upload of `fields` to blob storage. Returns the stored
    /// keys per attribute. On failure, already written blobs are removed.
    async fn store_uploads(
        &self,
        submission_id: Uuid,
        fields: &[ValidatedField],
    ) -> Result<HashMap<Uuid, Vec<String>>> {
        let mut stored: HashMap<Uuid, Vec<String>> = HashMap::new();
        for field in fields {
            for file in &field.files {
                let key = attachment_key(submission_id, field.attribute_id, &file.file_name);
                let content_type = file
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream");
                if let Err(e) = self.blobs.store(&key, &file.data, content_type).await {
                    tracing::error!(
                        submission_id = %submission_id,
                        key = %key,
                        error = %e,
                        "attachment upload failed"
                    );
                    self.remove_blobs(stored.values().flatten()).await;
                    return Err(e.into());
                }
                stored.entry(field.attribute_id).or_default().push(key);
            }
        }
        Ok(stored)
    }

    /// Best-effort, idempotent storage removal.
    async fn remove_blobs<'a>(&self, keys: impl IntoIterator<Item = &'a String>) {
        for key in keys {
            if let Err(e) = self.blobs.delete(key).await {
                tracing::warn!(key = %key, error = %e, "failed to remove stored file");
            }
        }
    }
}

/// `lampiran/<submission>/<attribute>/<uuid>_<sanitised name>`
pub fn attachment_key(submission_id: Uuid, attribute_id: Uuid, file_name: &str) -> String {
    format!(
        "lampiran/{submission_id}/{attribute_id}/{}_{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(file_name)
    )
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = basename(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let tail: String = {
        let count = cleaned.chars().count();
        cleaned
            .chars()
            .skip(count.saturating_sub(MAX_STORED_NAME_CHARS))
            .collect()
    };
    if tail.is_empty() {
        "file".into()
    } else {
        tail
    }
}

fn pdf_file_name(submission: &Submission) -> String {
    let stem = submission
        .letter_number
        .as_deref()
        .map(|n| n.replace('/', "-"))
        .unwrap_or_else(|| submission.id.to_string());
    format!("surat-{stem}.pdf")
}

#[async_trait]
impl SuratService for SuratServiceImpl {
    async fn list_letter_types(
        &self,
        principal: &Principal,
    ) -> Result<Vec<LetterTypeWithAttributes>> {
        self.authorize_global(principal, None, Action::ViewLetterTypes)?;
        let mut out = Vec::new();
        for letter_type in self.letter_types.list().await? {
            let attributes =
                schema::order_definitions(self.letter_types.definitions(letter_type.id).await?);
            out.push(LetterTypeWithAttributes {
                letter_type,
                attributes,
            });
        }
        Ok(out)
    }

    async fn get_letter_type(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<LetterTypeWithAttributes> {
        self.authorize_global(principal, None, Action::ViewLetterTypes)?;
        self.letter_type_view(id).await
    }

    async fn create_letter_type(
        &self,
        principal: &Principal,
        input: LetterTypeInput,
    ) -> Result<LetterTypeWithAttributes> {
        self.authorize_global(principal, None, Action::ManageLetterTypes)?;
        let mut errors = FieldErrors::new();
        schema::check_letter_type_input(&input, &mut errors);
        let letter_type = schema::new_letter_type(&input);
        let definitions = match schema::build_definitions(
            letter_type.id,
            input.attributes.as_deref().unwrap_or_default(),
            &[],
        ) {
            Ok(defs) => defs,
            Err(SuratError::Validation(more)) => {
                errors.merge(more);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        errors.into_result()?;

        if self
            .letter_types
            .find_by_code(&letter_type.code)
            .await?
            .is_some()
        {
            return Err(SuratError::Conflict(format!(
                "letter type code {} is already in use",
                letter_type.code
            )));
        }
        self.letter_types.create(&letter_type, &definitions).await?;
        tracing::info!(
            letter_type_id = %letter_type.id,
            code = %letter_type.code,
            "letter type created"
        );
        self.letter_type_view(letter_type.id).await
    }

    async fn update_letter_type(
        &self,
        principal: &Principal,
        id: Uuid,
        input: LetterTypeInput,
    ) -> Result<LetterTypeWithAttributes> {
        self.authorize_global(principal, None, Action::ManageLetterTypes)?;
        let mut letter_type = self
            .letter_types
            .get(id)
            .await?
            .ok_or_else(|| SuratError::NotFound(format!("letter type {id}")))?;
        let mut errors = FieldErrors::new();
        schema::check_letter_type_input(&input, &mut errors);
        errors.into_result()?;

        let code = schema::normalize_code(&input.code);
        if let Some(other) = self.letter_types.find_by_code(&code).await? {
            if other.id != id {
                return Err(SuratError::Conflict(format!(
                    "letter type code {code} is already in use"
                )));
            }
        }
        letter_type.name = input.name.trim().to_string();
        letter_type.code = code;
        letter_type.description = input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        letter_type.updated_at = Utc::now();
        self.letter_types.update(&letter_type).await?;
        tracing::info!(letter_type_id = %id, "letter type updated");
        self.letter_type_view(id).await
    }

    async fn replace_attributes(
        &self,
        principal: &Principal,
        id: Uuid,
        attributes: Vec<AttributeDefinitionInput>,
    ) -> Result<LetterTypeWithAttributes> {
        self.authorize_global(principal, None, Action::ManageLetterTypes)?;
        let (_, existing) = schema::resolve(self.letter_types.as_ref(), id).await?;
        let definitions = schema::build_definitions(id, &attributes, &existing)?;
        self.letter_types
            .replace_definitions(id, &definitions)
            .await?;
        tracing::info!(
            letter_type_id = %id,
            attributes = definitions.len(),
            "letter type schema replaced"
        );
        self.letter_type_view(id).await
    }

    async fn delete_letter_type(&self, principal: &Principal, id: Uuid) -> Result<()> {
        self.authorize_global(principal, None, Action::ManageLetterTypes)?;
        if !self.letter_types.soft_delete(id).await? {
            return Err(SuratError::NotFound(format!("letter type {id}")));
        }
        tracing::info!(letter_type_id = %id, "letter type deleted");
        Ok(())
    }

    async fn list_submissions(
        &self,
        principal: &Principal,
        mut filter: SubmissionFilter,
    ) -> Result<Vec<Submission>> {
        let resident = self.own_resident(principal).await?;
        let actor = Actor {
            principal,
            resident_id: resident.as_ref().map(|r| r.id),
        };
        if !AccessPolicy::allows(actor, Action::ListAllSubmissions, Resource::Global) {
            let Some(resident) = resident else {
                return Ok(Vec::new());
            };
            filter.resident_id = Some(resident.id);
        }
        self.submissions.list(&filter).await
    }

    async fn get_submission(&self, principal: &Principal, id: Uuid) -> Result<SubmissionDetail> {
        let submission = self
            .authorized_submission(principal, id, Action::ViewSubmission)
            .await?;
        self.detail(submission).await
    }

    async fn create_submission(
        &self,
        principal: &Principal,
        form: SubmissionForm,
    ) -> Result<SubmissionDetail> {
        let own = self.own_resident(principal).await?;
        self.authorize_global(principal, own.as_ref().map(|r| r.id), Action::CreateSubmission)?;

        let letter_type_id = form.letter_type_id.ok_or_else(|| {
            SuratError::field("jenis_surat_id", "The letter type field is required.")
        })?;

        let resident_id = match (form.resident_id, &own) {
            (Some(requested), own) if principal.is_admin() => {
                if own.as_ref().map(|r| r.id) != Some(requested)
                    && self.residents.get(requested).await?.is_none()
                {
                    return Err(SuratError::field(
                        "penduduk_id",
                        "The selected resident is invalid.",
                    ));
                }
                requested
            }
            (Some(requested), Some(own)) if requested != own.id => {
                return Err(SuratError::Forbidden(
                    "residents may only file for themselves".into(),
                ))
            }
            (_, Some(own)) => own.id,
            (_, None) => {
                return Err(SuratError::field(
                    "penduduk_id",
                    "The resident field is required.",
                ))
            }
        };

        let (letter_type, definitions) =
            schema::resolve(self.letter_types.as_ref(), letter_type_id).await?;
        let fields = ValidationPlan::from_definitions(&definitions).apply(
            form.attributes,
            &HashMap::new(),
            &self.limits,
        )?;

        let submission_id = Uuid::new_v4();
        let mut uploaded = self.store_uploads(submission_id, &fields).await?;
        let values: Vec<NewAttributeValue> = fields
            .iter()
            .filter(|f| f.has_content())
            .map(|f| NewAttributeValue {
                attribute_definition_id: f.attribute_id,
                value: f.value.clone(),
                file_paths: uploaded.remove(&f.attribute_id).unwrap_or_default(),
            })
            .collect();

        let new = NewSubmission {
            id: submission_id,
            letter_type_id,
            resident_id,
            created_by: principal.user_id,
            values,
        };
        let submission = match self.submissions.create(&new).await {
            Ok(s) => s,
            Err(e) => {
                self.remove_blobs(new.values.iter().flat_map(|v| &v.file_paths).collect::<Vec<_>>())
                    .await;
                return Err(e);
            }
        };
        tracing::info!(
            submission_id = %submission.id,
            letter_type_id = %letter_type.id,
            resident_id = %resident_id,
            "submission created"
        );
        self.detail(submission).await
    }

    async fn update_submission(
        &self,
        principal: &Principal,
        id: Uuid,
        edit: SubmissionEdit,
    ) -> Result<SubmissionDetail> {
        let submission = self
            .authorized_submission(principal, id, Action::EditSubmission)
            .await?;
        let next_status = lifecycle::status_after_owner_edit(submission.status)?;

        let (_, definitions) =
            schema::resolve(self.letter_types.as_ref(), submission.letter_type_id).await?;
        let existing: HashMap<Uuid, SubmissionAttributeValue> = self
            .submissions
            .values(id)
            .await?
            .into_iter()
            .map(|v| (v.attribute_definition_id, v))
            .collect();

        let kept: HashMap<Uuid, usize> = definitions
            .iter()
            .map(|def| {
                let current = existing
                    .get(&def.id)
                    .map(|v| v.file_paths.as_slice())
                    .unwrap_or_default();
                let deleted = edit
                    .attributes
                    .get(&def.id)
                    .map(|input| input.deleted_files.as_slice())
                    .unwrap_or_default();
                let remaining = if def.accepts_attachments() {
                    reconcile::reconcile(id, current, deleted, &[]).files.len()
                } else {
                    current.len()
                };
                (def.id, remaining)
            })
            .collect();

        let fields = ValidationPlan::from_definitions(&definitions).apply(
            edit.attributes,
            &kept,
            &self.limits,
        )?;

        let mut uploaded = self.store_uploads(id, &fields).await?;
        let fresh_uploads: Vec<String> = uploaded.values().flatten().cloned().collect();
        let mut storage_deletions: Vec<String> = Vec::new();
        let mut values = Vec::new();
        for field in fields.iter().filter(|f| f.has_content()) {
            let previous = existing.get(&field.attribute_id);
            let current = previous.map(|v| v.file_paths.as_slice()).unwrap_or_default();
            let new_keys = uploaded.remove(&field.attribute_id).unwrap_or_default();
            let outcome = reconcile::reconcile(id, current, &field.deleted_files, &new_keys);
            for ignored in &outcome.ignored {
                tracing::warn!(
                    submission_id = %id,
                    attribute_id = %field.attribute_id,
                    reference = %ignored,
                    "ignoring delete reference outside the submission's files"
                );
            }
            storage_deletions.extend(outcome.storage_deletions);
            values.push(NewAttributeValue {
                attribute_definition_id: field.attribute_id,
                value: if field.value_supplied {
                    field.value.clone()
                } else {
                    previous.and_then(|v| v.value.clone())
                },
                file_paths: outcome.files,
            });
        }

        let revision = SubmissionRevision {
            submission_id: id,
            status: next_status,
            values,
        };
        let updated = match self.submissions.revise(&revision).await {
            Ok(s) => s,
            Err(e) => {
                self.remove_blobs(&fresh_uploads).await;
                return Err(e);
            }
        };

        self.remove_blobs(&storage_deletions).await;
        tracing::info!(
            submission_id = %id,
            status = %updated.status,
            removed_files = storage_deletions.len(),
            "submission updated"
        );
        self.detail(updated).await
    }

    async fn delete_submission(&self, principal: &Principal, id: Uuid) -> Result<()> {
        let submission = self
            .authorized_submission(principal, id, Action::DeleteSubmission)
            .await?;
        lifecycle::can_delete(submission.status)?;
        let files: Vec<String> = self
            .submissions
            .values(id)
            .await?
            .into_iter()
            .flat_map(|v| v.file_paths)
            .collect();
        if !self.submissions.delete(id).await? {
            return Err(SuratError::NotFound(format!("submission {id}")));
        }
        self.remove_blobs(&files).await;
        tracing::info!(submission_id = %id, removed_files = files.len(), "submission deleted");
        Ok(())
    }

    async fn verify_submission(
        &self,
        principal: &Principal,
        id: Uuid,
        form: VerificationForm,
    ) -> Result<Submission> {
        let submission = self
            .authorized_submission(principal, id, Action::VerifySubmission)
            .await?;
        let stored_signature = match self.signatures.get(principal.user_id).await? {
            Some(key) if self.blobs.exists(&key).await? => Some(key),
            Some(key) => {
                tracing::warn!(
                    user_id = %principal.user_id,
                    key = %key,
                    "stored signature file is missing"
                );
                None
            }
            None => None,
        };
        let decision =
            signature::parse_verification(form, stored_signature.is_some(), &self.limits)?;
        lifecycle::check_verification(submission.status, decision.status)?;

        let signature_path = match decision.signature {
            Some(SignatureSource::Stored) => stored_signature,
            Some(SignatureSource::Fresh(image)) => {
                let key = image.storage_key(principal.user_id);
                self.blobs
                    .store(&key, &image.bytes, image.content_type())
                    .await?;
                self.signatures.set(principal.user_id, &key).await?;
                Some(key)
            }
            None => None,
        };

        let now = Utc::now();
        let (letter_number, approval_date) = if decision.status == SubmissionStatus::Approved {
            let letter_type = self
                .letter_types
                .get_with_deleted(submission.letter_type_id)
                .await?
                .ok_or_else(|| {
                    SuratError::NotFound(format!("letter type {}", submission.letter_type_id))
                })?;
            let sequence = self
                .submissions
                .count_approved_in_year(submission.letter_type_id, now)
                .await?
                + 1;
            (
                Some(letter_number::format_letter_number(
                    sequence,
                    &letter_type.code,
                    now,
                )),
                Some(now),
            )
        } else {
            (None, None)
        };

        let verified = self
            .submissions
            .verify(&SubmissionVerification {
                submission_id: id,
                status: decision.status,
                letter_number,
                approval_date,
                rejection_reason: decision.reason,
                approver_user_id: principal.user_id,
                signature_path,
            })
            .await?;
        tracing::info!(
            submission_id = %id,
            status = %verified.status,
            letter_number = verified.letter_number.as_deref().unwrap_or("-"),
            "submission verified"
        );
        Ok(verified)
    }

    async fn export_pdf(&self, principal: &Principal, id: Uuid) -> Result<LetterPdf> {
        let submission = self
            .authorized_submission(principal, id, Action::ExportSubmission)
            .await?;
        lifecycle::can_export(submission.status)?;
        let file_name = pdf_file_name(&submission);
        let detail = self.detail(submission).await?;
        let bytes = pdf::render_letter_pdf(&detail)?;
        Ok(LetterPdf { file_name, bytes })
    }
}
