//! surat_core: letter submission domain for the village administration portal.
//!
//! Pure domain types, port traits and the schema-driven submission pipeline.
//! Storage lives behind [`ports`]; `surat_postgres` implements them with sqlx and
//! `surat_server` exposes [`service::SuratService`] over HTTP.

pub mod blob;
pub mod error;
pub mod letter_number;
pub mod lifecycle;
pub mod pdf;
pub mod policy;
pub mod ports;
pub mod principal;
pub mod reconcile;
pub mod schema;
pub mod service;
pub mod signature;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use error::{FieldErrors, SuratError};
pub use principal::Principal;
pub use service::{SuratService, SuratServiceImpl};
