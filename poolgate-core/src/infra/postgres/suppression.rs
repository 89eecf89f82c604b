//! Postgres suppression index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use poolgate_model::{SuppressionEntry, SuppressionId, SuppressionReason};

use crate::error::{PoolError, Result};
use crate::ports::SuppressionIndex;

#[derive(Clone, Debug)]
pub struct PostgresSuppressionIndex {
    pool: PgPool,
}

impl PostgresSuppressionIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SuppressionRow {
    id: Uuid,
    identifier: String,
    reason: String,
    added_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl SuppressionRow {
    fn into_entry(self) -> Result<SuppressionEntry> {
        Ok(SuppressionEntry {
            id: SuppressionId(self.id),
            identifier: self.identifier,
            reason: SuppressionReason::parse(&self.reason)?,
            added_at: self.added_at,
            expires_at: self.expires_at,
        })
    }
}

#[async_trait]
impl SuppressionIndex for PostgresSuppressionIndex {
    async fn find_active(
        &self,
        identifiers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>> {
        let row = sqlx::query_as::<_, SuppressionRow>(
            r#"
            SELECT id, identifier, reason, added_at, expires_at
            FROM suppression_entries
            WHERE identifier = ANY($1)
              AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY added_at ASC
            LIMIT 1
            "#,
        )
        .bind(identifiers)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("suppression lookup failed: {e}")))?;

        row.map(SuppressionRow::into_entry).transpose()
    }

    async fn insert(&self, entry: SuppressionEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO suppression_entries (id, identifier, reason, added_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id.to_uuid())
        .bind(&entry.identifier)
        .bind(entry.reason.as_str())
        .bind(entry.added_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("suppression insert failed: {e}")))?;
        Ok(())
    }
}
