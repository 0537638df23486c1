//! Letter submissions (pengajuan surat).
//!
//! GET    /api/submissions            - own submissions, or all for admins
//! POST   /api/submissions            - multipart create
//! GET    /api/submissions/:id        - detail with ordered attribute values
//! POST   /api/submissions/:id        - multipart owner edit / resubmission
//! DELETE /api/submissions/:id        - delete a non-approved submission
//! POST   /api/submissions/:id/verify - admin decision (multipart)
//! GET    /api/submissions/:id/pdf    - approved letter as PDF

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use surat_core::{
    principal::Principal,
    service::SuratService,
    types::{Submission, SubmissionDetail, SubmissionFilter},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::multipart;

pub async fn list(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Query(filter): Query<SubmissionFilter>,
) -> Result<Json<Vec<Submission>>, AppError> {
    Ok(Json(service.list_submissions(&principal, filter).await?))
}

pub async fn get(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionDetail>, AppError> {
    Ok(Json(service.get_submission(&principal, id).await?))
}

pub async fn create(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    body: Multipart,
) -> Result<(StatusCode, Json<SubmissionDetail>), AppError> {
    let form = multipart::read_submission_form(body).await?;
    let detail = service.create_submission(&principal, form).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
    body: Multipart,
) -> Result<Json<SubmissionDetail>, AppError> {
    let edit = multipart::read_submission_edit(body).await?;
    Ok(Json(service.update_submission(&principal, id, edit).await?))
}

pub async fn delete(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_submission(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
    body: Multipart,
) -> Result<Json<Submission>, AppError> {
    let form = multipart::read_verification_form(body).await?;
    Ok(Json(service.verify_submission(&principal, id, form).await?))
}

pub async fn pdf(
    Extension(principal): Extension<Principal>,
    Extension(service): Extension<Arc<dyn SuratService>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let letter = service.export_pdf(&principal, id).await?;
    let disposition = format!("attachment; filename=\"{}\"", letter.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        letter.bytes,
    )
        .into_response())
}
