//! AppError: maps SuratError into HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use surat_core::error::SuratError;

/// Newtype so we can implement IntoResponse for SuratError.
#[derive(Debug)]
pub struct AppError(pub SuratError);

impl From<SuratError> for AppError {
    fn from(e: SuratError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.0.code();

        let body = match &self.0 {
            SuratError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                json!({ "code": code, "message": "internal server error" })
            }
            SuratError::Validation(errors) => json!({
                "code": code,
                "message": self.0.to_string(),
                "errors": errors,
            }),
            other => {
                tracing::debug!(status = status.as_u16(), error = %other, "request failed");
                json!({ "code": code, "message": other.to_string() })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_detail_is_hidden() {
        let err = SuratError::Internal(anyhow::anyhow!("password=hunter2"));
        let resp = AppError(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body(resp).await;
        assert_eq!(json["code"], "INTERNAL");
        assert!(!json.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn validation_carries_field_map() {
        let resp = AppError(SuratError::field("attribute.x.nilai", "required")).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body(resp).await;
        assert_eq!(json["errors"]["attribute.x.nilai"][0], "required");
    }

    #[tokio::test]
    async fn transition_is_conflict() {
        let resp = AppError(SuratError::InvalidTransition("approved".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body(resp).await["code"], "INVALID_TRANSITION");
    }
}
