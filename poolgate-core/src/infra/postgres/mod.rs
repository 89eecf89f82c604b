//! Postgres backends for every storage port.

mod assignments;
mod campaigns;
mod ledger;
mod records;
mod suppression;

pub use assignments::PostgresAssignmentStore;
pub use campaigns::PostgresCampaignDirectory;
pub use ledger::PostgresResourceLedger;
pub use records::PostgresRecordStore;
pub use suppression::PostgresSuppressionIndex;

use sqlx::PgPool;
use tracing::info;

use crate::error::{PoolError, Result};

/// Embedded schema migrations for the core tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// All five ports wired to one pool.
#[derive(Clone, Debug)]
pub struct PostgresBackend {
    pub records: PostgresRecordStore,
    pub assignments: PostgresAssignmentStore,
    pub suppression: PostgresSuppressionIndex,
    pub campaigns: PostgresCampaignDirectory,
    pub ledger: PostgresResourceLedger,
}

impl PostgresBackend {
    /// Connect the backends and verify DB health plus the one index the
    /// whole design leans on.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| PoolError::Database(format!("postgres health check failed: {e}")))?;
        info!("allocation core connected to Postgres");

        // The exclusivity invariant is enforced by this partial unique
        // index; refuse to run without it.
        let idx_exists = sqlx::query_scalar::<_, Option<i32>>(
            r#"
            SELECT 1
            FROM pg_indexes
            WHERE schemaname = 'public'
              AND indexname = $1
            LIMIT 1
            "#,
        )
        .bind("uq_assignments_active")
        .fetch_optional(&pool)
        .await
        .map_err(|e| PoolError::Database(format!("schema validation failed: {e}")))?
        .is_some();

        if !idx_exists {
            return Err(PoolError::Database(
                "required index uq_assignments_active is missing; run migrations".into(),
            ));
        }

        Ok(Self {
            records: PostgresRecordStore::new(pool.clone()),
            assignments: PostgresAssignmentStore::new(pool.clone()),
            suppression: PostgresSuppressionIndex::new(pool.clone()),
            campaigns: PostgresCampaignDirectory::new(pool.clone()),
            ledger: PostgresResourceLedger::new(pool),
        })
    }
}
