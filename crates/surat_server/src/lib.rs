//! surat_server: REST front end for the letter submission service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod multipart;
pub mod router;
