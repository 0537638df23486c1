//! Bearer-token authentication.
//!
//! Validates `Authorization: Bearer <jwt>` (HS256, `exp` required) and stores
//! the resulting [`Principal`] as a request extension for handlers.

use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response, Extension};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use surat_core::{
    error::SuratError,
    principal::{JwtClaims, Principal},
};

use crate::error::AppError;

#[derive(Clone)]
pub struct JwtConfig {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            validation,
        }
    }

    pub fn principal_from_token(&self, token: &str) -> Result<Principal, SuratError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| SuratError::Unauthenticated(format!("invalid token: {e}")))?;
        Principal::from_jwt_claims(&data.claims)
    }
}

pub async fn jwt_auth(
    Extension(config): Extension<JwtConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| SuratError::Unauthenticated("missing bearer token".into()))?;

    let principal = config.principal_from_token(token.trim())?;
    tracing::debug!(user_id = %principal.user_id, roles = ?principal.roles, "authenticated");

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
