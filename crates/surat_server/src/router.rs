//! Router construction for the letter submission server.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_mw,
    routing::{get, post, put},
    Extension, Router,
};
use surat_core::service::SuratService;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware::jwt::{jwt_auth, JwtConfig};

/// Build the full axum router with all routes and middleware.
///
/// `max_body_bytes` caps a whole request; per-file limits are enforced by
/// the service.
pub fn build_router(
    service: Arc<dyn SuratService>,
    jwt_config: JwtConfig,
    max_body_bytes: usize,
) -> Router {
    // Routes that require JWT authentication
    let protected = Router::new()
        .route(
            "/api/letter-types",
            get(handlers::letter_types::list).post(handlers::letter_types::create),
        )
        .route(
            "/api/letter-types/:id",
            get(handlers::letter_types::get)
                .put(handlers::letter_types::update)
                .delete(handlers::letter_types::delete),
        )
        .route(
            "/api/letter-types/:id/attributes",
            put(handlers::letter_types::replace_attributes),
        )
        .route(
            "/api/submissions",
            get(handlers::submissions::list).post(handlers::submissions::create),
        )
        .route(
            "/api/submissions/:id",
            get(handlers::submissions::get)
                .post(handlers::submissions::update)
                .delete(handlers::submissions::delete),
        )
        .route(
            "/api/submissions/:id/verify",
            post(handlers::submissions::verify),
        )
        .route("/api/submissions/:id/pdf", get(handlers::submissions::pdf))
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt_config));

    // Public routes (no auth)
    let public = Router::new().route("/health", get(handlers::health::health));

    public
        .merge(protected)
        .layer(Extension(service))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
