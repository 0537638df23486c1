//! surat_postgres: PostgreSQL adapter for the surat_core port traits.

mod pool;
mod rows;
mod store;

use std::sync::Arc;

use sqlx::PgPool;

pub use pool::{connect, mask_database_url, run_migrations, DatabaseConfig};
pub use store::{PgLetterTypeStore, PgResidentStore, PgSignatureStore, PgSubmissionStore};

/// All Postgres-backed stores sharing one pool.
#[derive(Clone)]
pub struct PgStores {
    pub letter_types: Arc<PgLetterTypeStore>,
    pub submissions: Arc<PgSubmissionStore>,
    pub residents: Arc<PgResidentStore>,
    pub signatures: Arc<PgSignatureStore>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            letter_types: Arc::new(PgLetterTypeStore::new(pool.clone())),
            submissions: Arc::new(PgSubmissionStore::new(pool.clone())),
            residents: Arc::new(PgResidentStore::new(pool.clone())),
            signatures: Arc::new(PgSignatureStore::new(pool)),
        }
    }
}
