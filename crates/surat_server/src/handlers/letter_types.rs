//! Letter type administration.
//!
//! GET    /api/letter-types                 - active types with their schemas
//! POST   /api/letter-types                 - create (admin)
//! GET    /api/letter-types/:id             - one type with ordered attributes
//! PUT    /api/letter-types/:id             - update name / code / description (admin)
//! PUT    /api/letter-types/:id/attributes  - replace the attribute schema (admin)
//! DELETE /api/letter-types/:id             - soft delete (admin)

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use serde::Deserialize;
use surat_core::{
    principal::Principal,
    service::SuratService,
    types::{AttributeDefinitionInput, LetterTypeInput, LetterTypeWithAttributes},
};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ReplaceAttributesRequest {
    pub attributes: Vec<AttributeDefinitionInput>,
}

pub async fn list(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
) -> Result<Json<Vec<LetterTypeWithAttributes>>, AppError> {
    Ok(Json(service.list_letter_types(&principal).await?))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LetterTypeWithAttributes>, AppError> {
    Ok(Json(service.get_letter_type(&principal, id).await?))
}

pub async fn create(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Json(input): Json<LetterTypeInput>,
) -> Result<(StatusCode, Json<LetterTypeWithAttributes>), AppError> {
    let created = service.create_letter_type(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
    Json(input): Json<LetterTypeInput>,
) -> Result<Json<LetterTypeWithAttributes>, AppError> {
    Ok(Json(service.update_letter_type(&principal, id, input).await?))
}

pub async fn replace_attributes(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceAttributesRequest>,
) -> Result<Json<LetterTypeWithAttributes>, AppError> {
    Ok(Json(
        service
            .replace_attributes(&principal, id, req.attributes)
            .await?,
    ))
}

pub async fn delete(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_letter_type(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
