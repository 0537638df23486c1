//! Submission lifecycle state machine.
//!
//! ```text
//!   pending ──verify──▶ approved          (terminal)
//!      │   ──verify──▶ rejected      ──owner edit──▶ pending
//!      │   ──verify──▶ needs_revision ──owner edit──▶ pending
//!      └── owner edit stays pending
//! ```

use crate::{error::SuratError, types::SubmissionStatus};

/// Outcomes an admin may choose when verifying.
pub fn is_verification_outcome(status: SubmissionStatus) -> bool {
    matches!(
        status,
        SubmissionStatus::Approved | SubmissionStatus::Rejected | SubmissionStatus::NeedsRevision
    )
}

pub fn can_transition(from: SubmissionStatus, to: SubmissionStatus) -> bool {
    use SubmissionStatus::*;
    matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, NeedsRevision)
            | (Pending, Pending)
            | (Rejected, Pending)
            | (NeedsRevision, Pending)
    )
}

/// Check a verification decision against the current status.
pub fn check_verification(
    current: SubmissionStatus,
    outcome: SubmissionStatus,
) -> Result<(), SuratError> {
    if !is_verification_outcome(outcome) {
        return Err(SuratError::field(
            "status",
            format!("Status {outcome} is not a verification outcome."),
        ));
    }
    if !can_transition(current, outcome) {
        return Err(SuratError::InvalidTransition(format!(
            "cannot move submission from {current} to {outcome}"
        )));
    }
    Ok(())
}

/// Status an owner edit leaves the submission in. Editing a rejected or
/// needs-revision submission resubmits it.
pub fn status_after_owner_edit(current: SubmissionStatus) -> Result<SubmissionStatus, SuratError> {
    match current {
        SubmissionStatus::Pending
        | SubmissionStatus::Rejected
        | SubmissionStatus::NeedsRevision => Ok(SubmissionStatus::Pending),
        SubmissionStatus::Approved => Err(SuratError::InvalidTransition(
            "approved submissions can no longer be edited".into(),
        )),
    }
}

pub fn can_delete(current: SubmissionStatus) -> Result<(), SuratError> {
    if current == SubmissionStatus::Approved {
        return Err(SuratError::InvalidTransition(
            "approved submissions cannot be deleted".into(),
        ));
    }
    Ok(())
}

pub fn can_export(current: SubmissionStatus) -> Result<(), SuratError> {
    if current != SubmissionStatus::Approved {
        return Err(SuratError::InvalidTransition(format!(
            "only approved submissions can be exported (status is {current})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubmissionStatus::*;

    const ALL: [SubmissionStatus; 4] = [Pending, Approved, Rejected, NeedsRevision];

    #[test]
    fn approved_is_terminal() {
        for to in ALL {
            assert!(!can_transition(Approved, to), "approved -> {to}");
        }
        assert!(matches!(
            status_after_owner_edit(Approved),
            Err(SuratError::InvalidTransition(_))
        ));
    }

    #[test]
    fn owner_edit_resubmits() {
        assert_eq!(status_after_owner_edit(Pending).unwrap(), Pending);
        assert_eq!(status_after_owner_edit(Rejected).unwrap(), Pending);
        assert_eq!(status_after_owner_edit(NeedsRevision).unwrap(), Pending);
    }

    #[test]
    fn verification_only_from_pending() {
        assert!(check_verification(Pending, Approved).is_ok());
        assert!(check_verification(Pending, Rejected).is_ok());
        assert!(check_verification(Pending, NeedsRevision).is_ok());
        assert!(matches!(
            check_verification(Rejected, Approved),
            Err(SuratError::InvalidTransition(_))
        ));
        assert!(matches!(
            check_verification(Approved, Rejected),
            Err(SuratError::InvalidTransition(_))
        ));
    }

    #[test]
    fn pending_is_not_a_verification_outcome() {
        let err = check_verification(Pending, Pending).unwrap_err();
        assert!(matches!(err, SuratError::Validation(ref f) if f.contains_key("status")));
    }

    #[test]
    fn export_and_delete_guards() {
        assert!(can_export(Approved).is_ok());
        for s in [Pending, Rejected, NeedsRevision] {
            assert!(can_export(s).is_err());
            assert!(can_delete(s).is_ok());
        }
        assert!(can_delete(Approved).is_err());
    }
}
