//! Verification request checks: outcome, reason and signature source.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::{FieldErrors, SuratError},
    lifecycle,
    types::{SubmissionStatus, VerificationForm},
    validation::FileLimits,
};

pub const MIN_REASON_CHARS: usize = 10;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A freshly provided signature image.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl SignatureImage {
    pub fn content_type(&self) -> &'static str {
        match self.extension.as_str() {
            "png" => "image/png",
            _ => "image/jpeg",
        }
    }

    /// Content-addressed blob key under the signer's namespace.
    pub fn storage_key(&self, user_id: Uuid) -> String {
        let digest = hex::encode(Sha256::digest(&self.bytes));
        format!("ttd/{user_id}/{}.{}", &digest[..16], self.extension)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureSource {
    /// Reuse the approver's stored signature.
    Stored,
    Fresh(SignatureImage),
}

/// A checked verification request.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationDecision {
    pub status: SubmissionStatus,
    pub reason: Option<String>,
    /// Set for approval and rejection.
    pub signature: Option<SignatureSource>,
}

/// Whether `status` needs a signature.
pub fn requires_signature(status: SubmissionStatus) -> bool {
    matches!(status, SubmissionStatus::Approved | SubmissionStatus::Rejected)
}

pub fn requires_reason(status: SubmissionStatus) -> bool {
    matches!(
        status,
        SubmissionStatus::Rejected | SubmissionStatus::NeedsRevision
    )
}

/// Check a verification form. `has_stored_signature` tells whether the
/// approver can reuse a stored signature. All field problems are aggregated.
pub fn parse_verification(
    form: VerificationForm,
    has_stored_signature: bool,
    limits: &FileLimits,
) -> Result<VerificationDecision, SuratError> {
    let mut errors = FieldErrors::new();

    let status = match form.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            errors.add("status", "The status field is required.");
            None
        }
        Some(raw) => match SubmissionStatus::parse(raw) {
            Some(s) if lifecycle::is_verification_outcome(s) => Some(s),
            _ => {
                errors.add("status", "The selected status is invalid.");
                None
            }
        },
    };

    let reason = form
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    let mut signature = None;
    if let Some(status) = status {
        if requires_reason(status) {
            match &reason {
                None => errors.add("alasan_penolakan", "The reason field is required."),
                Some(r) if r.chars().count() < MIN_REASON_CHARS => errors.add(
                    "alasan_penolakan",
                    format!("The reason must be at least {MIN_REASON_CHARS} characters."),
                ),
                Some(_) => {}
            }
        }
        if requires_signature(status) {
            signature = check_signature(&form, has_stored_signature, limits, &mut errors);
        }
    }

    errors.into_result()?;
    let status =
        status.ok_or_else(|| SuratError::field("status", "The status field is required."))?;
    Ok(VerificationDecision {
        status,
        reason: if requires_reason(status) { reason } else { None },
        signature,
    })
}

fn check_signature(
    form: &VerificationForm,
    has_stored_signature: bool,
    limits: &FileLimits,
    errors: &mut FieldErrors,
) -> Option<SignatureSource> {
    let reuse = form
        .use_existing_signature
        .as_deref()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"));
    if reuse {
        if has_stored_signature {
            return Some(SignatureSource::Stored);
        }
        errors.add("use_existing_ttd", "You have no stored signature to reuse.");
        return None;
    }

    match form.signature_type.as_deref().map(str::trim) {
        Some("digital") => {
            let data = form
                .signature_digital
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty());
            let Some(data) = data else {
                errors.add(
                    "tanda_tangan_digital",
                    "The digital signature is required when not using an existing signature.",
                );
                return None;
            };
            match decode_digital(data) {
                Some(bytes) => Some(SignatureSource::Fresh(SignatureImage {
                    bytes,
                    extension: "png".into(),
                })),
                None => {
                    errors.add(
                        "tanda_tangan_digital",
                        "The digital signature must be a base64 encoded PNG image.",
                    );
                    None
                }
            }
        }
        Some("upload") => {
            let Some(file) = &form.signature_file else {
                errors.add(
                    "tanda_tangan_file",
                    "The signature file is required when not using an existing signature.",
                );
                return None;
            };
            let extension = file
                .file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
            let valid_image =
                file.data.starts_with(&PNG_MAGIC) || file.data.starts_with(&JPEG_MAGIC);
            match extension {
                _ if file.data.len() > limits.max_bytes => {
                    errors.add(
                        "tanda_tangan_file",
                        format!(
                            "The signature file may not be greater than {} kilobytes.",
                            limits.max_bytes / 1024
                        ),
                    );
                    None
                }
                Some(ext) if valid_image => Some(SignatureSource::Fresh(SignatureImage {
                    bytes: file.data.clone(),
                    extension: if ext == "jpeg" { "jpg".into() } else { ext },
                })),
                _ => {
                    errors.add(
                        "tanda_tangan_file",
                        "The signature file must be a PNG or JPEG image.",
                    );
                    None
                }
            }
        }
        Some(_) => {
            errors.add("tanda_tangan_type", "The selected signature type is invalid.");
            None
        }
        None => {
            errors.add("tanda_tangan_type", "The signature type field is required.");
            None
        }
    }
}

/// Decode a base64 PNG, accepting an optional `data:image/png;base64,` prefix.
pub fn decode_digital(data: &str) -> Option<Vec<u8>> {
    let payload = match data.split_once(',') {
        Some((header, payload)) if header.starts_with("data:") => {
            if !header.eq_ignore_ascii_case("data:image/png;base64") {
                return None;
            }
            payload
        }
        Some(_) => return None,
        None => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    bytes.starts_with(&PNG_MAGIC).then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UploadedFile;

    fn png() -> Vec<u8> {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"rest-of-image");
        bytes
    }

    fn form(status: &str) -> VerificationForm {
        VerificationForm {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    fn errors(result: Result<VerificationDecision, SuratError>) -> FieldErrors {
        match result {
            Err(SuratError::Validation(f)) => f,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn digital_without_data_and_without_reuse_fails() {
        let mut f = form("approved");
        f.signature_type = Some("digital".into());
        f.use_existing_signature = Some("no".into());
        let errs = errors(parse_verification(f, true, &FileLimits::default()));
        assert!(errs.contains_key("tanda_tangan_digital"));
    }

    #[test]
    fn approve_with_stored_signature() {
        let mut f = form("approved");
        f.use_existing_signature = Some("yes".into());
        let d = parse_verification(f, true, &FileLimits::default()).unwrap();
        assert_eq!(d.status, SubmissionStatus::Approved);
        assert_eq!(d.signature, Some(SignatureSource::Stored));
        assert!(d.reason.is_none());
    }

    #[test]
    fn reuse_without_stored_signature_fails() {
        let mut f = form("approved");
        f.use_existing_signature = Some("yes".into());
        let errs = errors(parse_verification(f, false, &FileLimits::default()));
        assert!(errs.contains_key("use_existing_ttd"));
    }

    #[test]
    fn digital_data_url_accepted() {
        let mut f = form("approved");
        f.signature_type = Some("digital".into());
        f.signature_digital = Some(format!("data:image/png;base64,{}", STANDARD.encode(png())));
        let d = parse_verification(f, false, &FileLimits::default()).unwrap();
        let Some(SignatureSource::Fresh(image)) = d.signature else {
            panic!("expected fresh signature");
        };
        assert_eq!(image.bytes, png());
        assert_eq!(image.content_type(), "image/png");
    }

    #[test]
    fn digital_garbage_rejected() {
        assert!(decode_digital("not base64!").is_none());
        assert!(decode_digital(&STANDARD.encode(b"plain text")).is_none());
        let gif = format!("data:image/gif;base64,{}", STANDARD.encode(png()));
        assert!(decode_digital(&gif).is_none());
        assert_eq!(decode_digital(&STANDARD.encode(png())), Some(png()));
    }

    #[test]
    fn rejection_needs_reason_and_signature() {
        let mut f = form("rejected");
        f.reason = Some("kurang".into());
        let errs = errors(parse_verification(f, false, &FileLimits::default()));
        assert!(errs.contains_key("alasan_penolakan"));
        assert!(errs.contains_key("tanda_tangan_type"));
    }

    #[test]
    fn revision_needs_reason_only() {
        let mut f = form("needs_revision");
        f.reason = Some("Lampiran KK tidak terbaca".into());
        let d = parse_verification(f, false, &FileLimits::default()).unwrap();
        assert_eq!(d.status, SubmissionStatus::NeedsRevision);
        assert_eq!(d.reason.as_deref(), Some("Lampiran KK tidak terbaca"));
        assert!(d.signature.is_none());
    }

    #[test]
    fn pending_and_unknown_status_rejected() {
        for status in ["pending", "archived", " "] {
            let errs = errors(parse_verification(form(status), true, &FileLimits::default()));
            assert!(errs.contains_key("status"), "status {status:?}");
        }
    }

    #[test]
    fn uploaded_signature_checks_type() {
        let mut f = form("approved");
        f.signature_type = Some("upload".into());
        f.signature_file = Some(UploadedFile {
            file_name: "ttd.JPEG".into(),
            content_type: Some("image/jpeg".into()),
            data: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        });
        let d = parse_verification(f.clone(), false, &FileLimits::default()).unwrap();
        let Some(SignatureSource::Fresh(image)) = d.signature else {
            panic!("expected fresh signature");
        };
        assert_eq!(image.extension, "jpg");

        f.signature_file = Some(UploadedFile {
            file_name: "ttd.pdf".into(),
            content_type: None,
            data: b"%PDF".to_vec(),
        });
        let errs = errors(parse_verification(f, false, &FileLimits::default()));
        assert!(errs.contains_key("tanda_tangan_file"));
    }

    #[test]
    fn storage_key_is_content_addressed() {
        let image = SignatureImage {
            bytes: png(),
            extension: "png".into(),
        };
        let user = Uuid::nil();
        let key = image.storage_key(user);
        assert!(key.starts_with(&format!("ttd/{user}/")));
        assert!(key.ends_with(".png"));
        assert_eq!(key, image.storage_key(user));
    }
}
