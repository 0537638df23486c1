//! Connection pool setup and embedded migrations.

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool configuration. The server fills this from its environment config.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        url = %mask_database_url(&config.database_url),
        max_connections = config.max_connections,
        "connecting to database"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connection_timeout);

    if let Some(idle_timeout) = config.idle_timeout {
        options = options.idle_timeout(idle_timeout);
    }
    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options.connect(&config.database_url).await.map_err(|e| {
        warn!(error = %e, "failed to connect to database");
        e
    })?;

    info!("database pool ready");
    Ok(pool)
}

/// Apply pending migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("running database migrations");
    MIGRATOR.run(pool).await?;
    info!("database migrations complete");
    Ok(())
}

/// Hide the password of a connection URL for logging.
pub fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        Err(_) if url.len() > 20 => {
            let head: String = url.chars().take(10).collect();
            let tail: String = url
                .chars()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{head}***{tail}")
        }
        Err(_) => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_password() {
        let masked = mask_database_url("postgres://surat:hunter2@db:5432/desa");
        assert_eq!(masked, "postgres://surat:***@db:5432/desa");
    }

    #[test]
    fn url_without_password_is_unchanged() {
        let masked = mask_database_url("postgres://db:5432/desa");
        assert_eq!(masked, "postgres://db:5432/desa");
    }

    #[test]
    fn unparseable_url_is_elided() {
        assert_eq!(mask_database_url("nonsense"), "***");
        let long = mask_database_url("this is definitely not a url at all");
        assert!(long.starts_with("this is de***"));
        assert!(!long.contains("definitely"));
    }

    #[test]
    fn config_defaults() {
        let config = DatabaseConfig::new("postgres://db/desa").with_max_connections(4);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }
}
