//! Postgres resource ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use poolgate_model::{Resource, ResourceCounter, ResourceId, next_window_start, window_start};

use crate::error::{PoolError, Result};
use crate::ports::ResourceLedger;

#[derive(Clone, Debug)]
pub struct PostgresResourceLedger {
    pool: PgPool,
}

impl PostgresResourceLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    label: String,
    daily_limit: i32,
    utc_offset_minutes: i32,
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    resource_id: Uuid,
    window_start: DateTime<Utc>,
    count: i32,
    hard_limit: i32,
}

#[async_trait]
impl ResourceLedger for PostgresResourceLedger {
    async fn register_resource(&self, resource: Resource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resources (id, label, daily_limit, utc_offset_minutes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET label = EXCLUDED.label,
                daily_limit = EXCLUDED.daily_limit,
                utc_offset_minutes = EXCLUDED.utc_offset_minutes
            "#,
        )
        .bind(resource.id.to_uuid())
        .bind(&resource.label)
        .bind(resource.daily_limit)
        .bind(resource.utc_offset_minutes)
        .execute(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("resource upsert failed: {e}")))?;
        Ok(())
    }

    async fn get_resource(&self, resource_id: ResourceId) -> Result<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, label, daily_limit, utc_offset_minutes FROM resources WHERE id = $1",
        )
        .bind(resource_id.to_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("resource lookup failed: {e}")))?;

        Ok(row.map(|row| Resource {
            id: ResourceId(row.id),
            label: row.label,
            daily_limit: row.daily_limit,
            utc_offset_minutes: row.utc_offset_minutes,
        }))
    }

    async fn try_increment(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<bool> {
        // Check and increment are one conditional update; two concurrent
        // callers can never both pass at the last remaining unit.
        let result = sqlx::query(
            r#"
            UPDATE resource_counters
            SET count = count + 1
            WHERE resource_id = $1 AND window_start = $2 AND count < hard_limit
            "#,
        )
        .bind(resource_id.to_uuid())
        .bind(window_start)
        .execute(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("counter increment failed: {e}")))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Zero rows is either "at the limit" or "no counter row"; the
        // second case is the fail-closed ResourceCounterMissing path.
        let exists: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM resource_counters WHERE resource_id = $1 AND window_start = $2",
        )
        .bind(resource_id.to_uuid())
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("counter existence check failed: {e}")))?;

        if exists.is_some() {
            Ok(false)
        } else {
            Err(PoolError::ResourceCounterMissing {
                resource_id,
                window_start,
            })
        }
    }

    async fn provision_windows(&self, now: DateTime<Utc>) -> Result<u64> {
        let resources: Vec<ResourceRow> = sqlx::query_as(
            "SELECT id, label, daily_limit, utc_offset_minutes FROM resources",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("resource scan failed: {e}")))?;

        let mut created = 0u64;
        for resource in resources {
            for start in [
                window_start(now, resource.utc_offset_minutes),
                next_window_start(now, resource.utc_offset_minutes),
            ] {
                let result = sqlx::query(
                    r#"
                    INSERT INTO resource_counters (resource_id, window_start, count, hard_limit)
                    VALUES ($1, $2, 0, $3)
                    ON CONFLICT (resource_id, window_start) DO NOTHING
                    "#,
                )
                .bind(resource.id)
                .bind(start)
                .bind(resource.daily_limit)
                .execute(&self.pool)
                .await
                .map_err(|e| PoolError::Database(format!("window provisioning failed: {e}")))?;
                created += result.rows_affected();
            }
        }
        Ok(created)
    }

    async fn counter(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<Option<ResourceCounter>> {
        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT resource_id, window_start, count, hard_limit
            FROM resource_counters
            WHERE resource_id = $1 AND window_start = $2
            "#,
        )
        .bind(resource_id.to_uuid())
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("counter lookup failed: {e}")))?;

        Ok(row.map(|row| ResourceCounter {
            resource_id: ResourceId(row.resource_id),
            window_start: row.window_start,
            count: row.count,
            hard_limit: row.hard_limit,
        }))
    }
}
