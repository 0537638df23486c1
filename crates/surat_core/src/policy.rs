//! Access policy. Every authorization decision goes through
//! [`AccessPolicy::authorize`] so handlers and the service never carry their
//! own ownership checks.

use uuid::Uuid;

use crate::{error::SuratError, principal::Principal};

pub const PERM_MANAGE_LETTER_TYPES: &str = "jenis-surat.manage";
pub const PERM_VERIFY_SUBMISSIONS: &str = "pengajuan-surat.verify";
pub const PERM_VIEW_ALL_SUBMISSIONS: &str = "pengajuan-surat.view-all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    ViewLetterTypes,
    ManageLetterTypes,
    CreateSubmission,
    ViewSubmission,
    EditSubmission,
    DeleteSubmission,
    VerifySubmission,
    ExportSubmission,
    ListAllSubmissions,
}

/// What the action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Not tied to an existing record (listing, creating).
    Global,
    /// A submission, by its owning resident.
    Submission { resident_id: Uuid },
}

/// The acting principal together with the resident record linked to it, if any.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub principal: &'a Principal,
    pub resident_id: Option<Uuid>,
}

pub struct AccessPolicy;

impl AccessPolicy {
    pub fn authorize(
        actor: Actor<'_>,
        action: Action,
        resource: Resource,
    ) -> Result<(), SuratError> {
        if Self::allows(actor, action, resource) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %actor.principal.user_id,
                action = %action,
                "access denied"
            );
            Err(SuratError::Forbidden(format!("not allowed to {action}")))
        }
    }

    pub fn allows(actor: Actor<'_>, action: Action, resource: Resource) -> bool {
        let principal = actor.principal;
        let owns = match resource {
            Resource::Submission { resident_id } => actor.resident_id == Some(resident_id),
            Resource::Global => false,
        };
        match action {
            Action::ViewLetterTypes => true,
            Action::ManageLetterTypes => grants(principal, PERM_MANAGE_LETTER_TYPES),
            Action::VerifySubmission => grants(principal, PERM_VERIFY_SUBMISSIONS),
            Action::ListAllSubmissions => grants(principal, PERM_VIEW_ALL_SUBMISSIONS),
            // Residents file for themselves; admins may file on behalf of anyone.
            Action::CreateSubmission => principal.is_admin() || actor.resident_id.is_some(),
            Action::EditSubmission => owns,
            Action::ViewSubmission | Action::ExportSubmission => {
                owns || grants(principal, PERM_VIEW_ALL_SUBMISSIONS)
            }
            Action::DeleteSubmission => owns || principal.is_admin(),
        }
    }
}

fn grants(principal: &Principal, permission: &str) -> bool {
    principal.is_admin() || principal.has_permission(permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Principal {
        Principal::in_process(Uuid::new_v4(), vec!["admin".into()])
    }

    fn resident() -> Principal {
        Principal::in_process(Uuid::new_v4(), vec!["warga".into()])
    }

    fn actor(principal: &Principal, resident_id: Option<Uuid>) -> Actor<'_> {
        Actor {
            principal,
            resident_id,
        }
    }

    fn owned_by(resident_id: Uuid) -> Resource {
        Resource::Submission { resident_id }
    }

    #[test]
    fn owner_can_edit_own_submission_only() {
        let p = resident();
        let mine = Uuid::new_v4();
        let actor = actor(&p, Some(mine));
        assert!(AccessPolicy::allows(actor, Action::EditSubmission, owned_by(mine)));
        let err = AccessPolicy::authorize(actor, Action::EditSubmission, owned_by(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, SuratError::Forbidden(_)));
    }

    #[test]
    fn admin_cannot_edit_but_can_verify_and_view() {
        let p = admin();
        let actor = actor(&p, None);
        let res = owned_by(Uuid::new_v4());
        assert!(!AccessPolicy::allows(actor, Action::EditSubmission, res));
        assert!(AccessPolicy::allows(actor, Action::VerifySubmission, res));
        assert!(AccessPolicy::allows(actor, Action::ViewSubmission, res));
        assert!(AccessPolicy::allows(actor, Action::DeleteSubmission, res));
        assert!(AccessPolicy::allows(actor, Action::ManageLetterTypes, Resource::Global));
    }

    #[test]
    fn resident_cannot_verify_or_manage() {
        let p = resident();
        let mine = Uuid::new_v4();
        let actor = actor(&p, Some(mine));
        let res = owned_by(mine);
        assert!(!AccessPolicy::allows(actor, Action::VerifySubmission, res));
        assert!(!AccessPolicy::allows(actor, Action::ManageLetterTypes, Resource::Global));
        assert!(!AccessPolicy::allows(actor, Action::ListAllSubmissions, Resource::Global));
        assert!(AccessPolicy::allows(actor, Action::ExportSubmission, res));
    }

    #[test]
    fn permission_claim_grants_without_admin_role() {
        let p = resident().with_permissions(vec![PERM_VERIFY_SUBMISSIONS.into()]);
        let actor = actor(&p, None);
        let res = owned_by(Uuid::new_v4());
        assert!(AccessPolicy::allows(actor, Action::VerifySubmission, res));
        assert!(!AccessPolicy::allows(actor, Action::ViewSubmission, res));
    }

    #[test]
    fn account_without_resident_cannot_create() {
        let p = resident();
        assert!(!AccessPolicy::allows(actor(&p, None), Action::CreateSubmission, Resource::Global));
    }
}
