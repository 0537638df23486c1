//! Attachment reconciliation for submission edits.
//!
//! [`reconcile`] is pure: it computes the new file list and the storage keys to
//! remove. The service applies the removals after the database commit.

use uuid::Uuid;

/// Result of reconciling one attribute's files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Kept files in their original order, followed by new uploads.
    pub files: Vec<String>,
    /// Storage keys to delete once the edit is committed.
    pub storage_deletions: Vec<String>,
    /// Delete references that matched nothing and lie outside the submission's
    /// attachment namespace. Never touched in storage.
    pub ignored: Vec<String>,
}

/// Storage prefix owning every attachment of `submission_id`.
pub fn attachment_namespace(submission_id: Uuid) -> String {
    format!("lampiran/{submission_id}/")
}

pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn within_namespace(reference: &str, namespace: &str) -> bool {
    reference.starts_with(namespace)
        && reference.len() > namespace.len()
        && !reference.split(['/', '\\']).any(|seg| seg == ".." || seg == ".")
}

/// Reconcile `current` against delete references and freshly stored uploads.
///
/// Each reference removes at most one entry: an exact path match first, else
/// the first entry with the same basename. Unmatched references inside the
/// submission's namespace are still scheduled for storage deletion so no
/// orphan is left behind.
pub fn reconcile(
    submission_id: Uuid,
    current: &[String],
    delete_refs: &[String],
    uploaded: &[String],
) -> Reconciliation {
    let namespace = attachment_namespace(submission_id);
    let mut files: Vec<String> = current.to_vec();
    let mut storage_deletions: Vec<String> = Vec::new();
    let mut ignored = Vec::new();

    for reference in delete_refs.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        let position = files.iter().position(|f| f == reference).or_else(|| {
            let wanted = basename(reference);
            files.iter().position(|f| basename(f) == wanted)
        });
        match position {
            Some(i) => {
                let removed = files.remove(i);
                if !storage_deletions.contains(&removed) {
                    storage_deletions.push(removed);
                }
            }
            None if within_namespace(reference, &namespace) => {
                if !storage_deletions.iter().any(|d| d == reference) {
                    storage_deletions.push(reference.to_string());
                }
            }
            None => ignored.push(reference.to_string()),
        }
    }

    files.extend(uploaded.iter().cloned());
    Reconciliation {
        files,
        storage_deletions,
        ignored,
    }
}
