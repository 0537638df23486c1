use std::collections::HashMap;

use uuid::Uuid;

use crate::error::SuratError;

pub const ADMIN_ROLE: &str = "admin";

/// The authenticated caller. Built once at the server boundary from JWT
/// claims; core logic never reads raw tokens.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Principal {
    pub fn from_jwt_claims(claims: &JwtClaims) -> Result<Self, SuratError> {
        let sub = claims
            .sub
            .as_deref()
            .ok_or_else(|| SuratError::Unauthenticated("missing sub claim".into()))?;
        let user_id = Uuid::parse_str(sub).map_err(|_| {
            SuratError::Unauthenticated(format!("sub claim is not a user id: {sub}"))
        })?;
        Ok(Self {
            user_id,
            roles: claims.roles.clone().unwrap_or_default(),
            permissions: claims.permissions.clone().unwrap_or_default(),
            claims: claims.extra.clone().unwrap_or_default(),
        })
    }

    /// Construct explicitly for in-process callers (tests, seeding tools).
    pub fn in_process(user_id: Uuid, roles: Vec<String>) -> Self {
        Self {
            user_id,
            roles,
            permissions: Vec::new(),
            claims: HashMap::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// JWT claims shape expected from the identity provider.
#[derive(Debug, serde::Deserialize)]
pub struct JwtClaims {
    pub sub: Option<String>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Option<HashMap<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: sub.map(str::to_string),
            roles: Some(vec!["warga".into()]),
            permissions: Some(vec!["pengajuan-surat.create".into()]),
            exp: None,
            extra: Some(HashMap::from([("name".into(), "Siti".into())])),
        }
    }

    #[test]
    fn from_jwt_claims_happy_path() {
        let id = Uuid::new_v4();
        let p = Principal::from_jwt_claims(&claims(Some(&id.to_string()))).unwrap();
        assert_eq!(p.user_id, id);
        assert_eq!(p.roles, vec!["warga"]);
        assert!(p.has_permission("pengajuan-surat.create"));
        assert_eq!(p.claims.get("name"), Some(&serde_json::json!("Siti")));
        assert!(!p.is_admin());
    }

    #[test]
    fn claims_deserialize_with_numeric_extras() {
        let json = serde_json::json!({
            "sub": Uuid::nil().to_string(),
            "roles": ["admin"],
            "exp": 4102444800i64,
            "iat": 1700000000,
        });
        let c: JwtClaims = serde_json::from_value(json).unwrap();
        assert_eq!(c.exp, Some(4102444800));
        let p = Principal::from_jwt_claims(&c).unwrap();
        assert!(p.is_admin());
        assert_eq!(p.claims.get("iat"), Some(&serde_json::json!(1700000000)));
    }

    #[test]
    fn from_jwt_claims_missing_sub() {
        let err = Principal::from_jwt_claims(&claims(None)).unwrap_err();
        assert!(matches!(err, SuratError::Unauthenticated(_)));
    }

    #[test]
    fn from_jwt_claims_non_uuid_sub() {
        let err = Principal::from_jwt_claims(&claims(Some("alice"))).unwrap_err();
        assert!(matches!(err, SuratError::Unauthenticated(_)));
    }

    #[test]
    fn from_jwt_claims_defaults() {
        let c = JwtClaims {
            sub: Some(Uuid::nil().to_string()),
            roles: None,
            permissions: None,
            exp: Some(0),
            extra: None,
        };
        let p = Principal::from_jwt_claims(&c).unwrap();
        assert!(p.roles.is_empty());
        assert!(p.permissions.is_empty());
        assert!(p.claims.is_empty());
    }

    #[test]
    fn admin_role_detected() {
        let p = Principal::in_process(Uuid::nil(), vec!["admin".into()]);
        assert!(p.is_admin());
        assert!(p.has_role("admin"));
        assert!(!p.has_role("warga"));
    }
}
