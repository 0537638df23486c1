//! Server configuration from `SURAT_*` environment variables.

use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
const DEFAULT_STORAGE_DIR: &str = "./storage";
const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub db_pool_size: u32,
    pub max_upload_bytes: usize,
    pub max_body_bytes: usize,
    pub run_migrations: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url =
            get("SURAT_DATABASE_URL").ok_or(ConfigError::Missing("SURAT_DATABASE_URL"))?;
        let jwt_secret = get("SURAT_JWT_SECRET").ok_or(ConfigError::Missing("SURAT_JWT_SECRET"))?;

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: get("SURAT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            storage_dir: get("SURAT_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            db_pool_size: parse_or(
                get("SURAT_DB_POOL_SIZE"),
                "SURAT_DB_POOL_SIZE",
                DEFAULT_POOL_SIZE,
            )?,
            max_upload_bytes: parse_or(
                get("SURAT_MAX_UPLOAD_BYTES"),
                "SURAT_MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            max_body_bytes: parse_or(
                get("SURAT_MAX_BODY_BYTES"),
                "SURAT_MAX_BODY_BYTES",
                DEFAULT_MAX_BODY_BYTES,
            )?,
            run_migrations: match get("SURAT_RUN_MIGRATIONS") {
                None => true,
                Some(v) => parse_flag(&v).ok_or(ConfigError::Invalid {
                    name: "SURAT_RUN_MIGRATIONS",
                    value: v,
                })?,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
