//! surat_server: standalone REST server for village letter submissions.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   SURAT_DATABASE_URL     - Postgres connection string (required)
//!   SURAT_JWT_SECRET       - JWT HMAC secret (required)
//!   SURAT_BIND_ADDR        - listen address (default: 0.0.0.0:4200)
//!   SURAT_STORAGE_DIR      - attachment and signature root (default: ./storage)
//!   SURAT_DB_POOL_SIZE     - max pool connections (default: 10)
//!   SURAT_MAX_UPLOAD_BYTES - per-file limit (default: 2 MiB)
//!   SURAT_MAX_BODY_BYTES   - per-request limit (default: 20 MiB)
//!   SURAT_RUN_MIGRATIONS   - apply migrations at startup (default: true)

use std::sync::Arc;

use anyhow::Context;
use surat_core::blob::LocalBlobStore;
use surat_core::service::{SuratService, SuratServiceImpl};
use surat_core::validation::FileLimits;
use surat_postgres::{connect, run_migrations, DatabaseConfig, PgStores};
use surat_server::config::ServerConfig;
use surat_server::middleware::jwt::JwtConfig;
use surat_server::router::build_router;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,surat_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let db_config =
        DatabaseConfig::new(config.database_url.clone()).with_max_connections(config.db_pool_size);
    let pool = connect(&db_config)
        .await
        .context("failed to connect to database")?;

    if config.run_migrations {
        run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("failed to create {}", config.storage_dir.display()))?;
    tracing::info!(storage_dir = %config.storage_dir.display(), "blob storage ready");

    let stores = PgStores::new(pool);
    let service: Arc<dyn SuratService> = Arc::new(
        SuratServiceImpl::new(
            stores.letter_types,
            stores.submissions,
            stores.residents,
            stores.signatures,
            Arc::new(LocalBlobStore::new(config.storage_dir.clone())),
        )
        .with_limits(FileLimits::default().with_max_bytes(config.max_upload_bytes)),
    );

    let jwt_config = JwtConfig::from_secret(config.jwt_secret.as_bytes());
    let app = build_router(service, jwt_config, config.max_body_bytes);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("surat_server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
