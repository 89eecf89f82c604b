//! Postgres record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use poolgate_model::{
    ChannelRequirement, ClaimCriteria, ContactIdentifiers, LifecycleState, PoolRecord, RecordId,
};

use crate::error::{PoolError, Result};
use crate::ports::RecordStore;

#[derive(Clone, Debug)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    id: Uuid,
    email: Option<String>,
    phone: Option<String>,
    handle: Option<String>,
    payload: Value,
    priority_tier: i16,
    state: String,
    utc_offset_minutes: Option<i32>,
    cooldown_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    pub(crate) fn into_record(self) -> Result<PoolRecord> {
        Ok(PoolRecord {
            id: RecordId(self.id),
            contact: ContactIdentifiers {
                email: self.email,
                phone: self.phone,
                handle: self.handle,
            },
            payload: self.payload,
            priority_tier: self.priority_tier,
            state: LifecycleState::parse(&self.state)?,
            utc_offset_minutes: self.utc_offset_minutes,
            cooldown_until: self.cooldown_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const RECORD_COLUMNS: &str = "id, email, phone, handle, payload, priority_tier, \
     state, utc_offset_minutes, cooldown_until, created_at, updated_at";

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn upsert(&self, record: PoolRecord, now: DateTime<Utc>) -> Result<PoolRecord> {
        // The conflict arm only fires while the record is still available,
        // which is the whole enrichment contract in one statement.
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            r#"
            INSERT INTO pool_records (
                id, email, phone, handle, payload, priority_tier,
                state, utc_offset_minutes, cooldown_until, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'available', $7, NULL, $8, $8)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                handle = EXCLUDED.handle,
                payload = EXCLUDED.payload,
                priority_tier = EXCLUDED.priority_tier,
                utc_offset_minutes = EXCLUDED.utc_offset_minutes,
                updated_at = EXCLUDED.updated_at
            WHERE pool_records.state = 'available'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.id.to_uuid())
        .bind(&record.contact.email)
        .bind(&record.contact.phone)
        .bind(&record.contact.handle)
        .bind(&record.payload)
        .bind(record.priority_tier)
        .bind(record.utc_offset_minutes)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("record upsert failed: {e}")))?;

        match row {
            Some(row) => row.into_record(),
            None => Err(PoolError::InvalidState(format!(
                "record {} is not available; enrichment updates rejected",
                record.id
            ))),
        }
    }

    async fn get(&self, record_id: RecordId) -> Result<Option<PoolRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM pool_records WHERE id = $1"
        ))
        .bind(record_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("record lookup failed: {e}")))?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn find_available(
        &self,
        criteria: &ClaimCriteria,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecordId>> {
        // State and suppression filtering happen inside this one query so
        // the selection the claim path works from is never post-filtered.
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT r.id
            FROM pool_records r
            WHERE r.state = 'available'
              AND NOT EXISTS (
                  SELECT 1
                  FROM suppression_entries s
                  WHERE (s.expires_at IS NULL OR s.expires_at > "#,
        );
        builder.push_bind(now);
        builder.push(
            r#")
                    AND s.identifier IN (
                        r.email, r.phone, r.handle, split_part(r.email, '@', 2)
                    )
              )
            "#,
        );

        if let Some(min_tier) = criteria.min_priority_tier {
            builder.push(" AND r.priority_tier >= ");
            builder.push_bind(min_tier);
        }
        for channel in &criteria.required_channels {
            let column = match channel {
                ChannelRequirement::Email => "email",
                ChannelRequirement::Phone => "phone",
                ChannelRequirement::Handle => "handle",
            };
            builder.push(format!(" AND r.{column} IS NOT NULL"));
        }
        if !criteria.payload_filters.is_empty() {
            builder.push(" AND r.payload @> ");
            builder.push_bind(Value::Object(criteria.payload_filters.clone()));
        }

        builder.push(" ORDER BY r.priority_tier DESC, r.created_at ASC, r.id ASC LIMIT ");
        builder.push_bind(limit as i64);

        let ids: Vec<(Uuid,)> = builder
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(|e| PoolError::Database(format!("candidate selection failed: {e}")))?;

        Ok(ids.into_iter().map(|(id,)| RecordId(id)).collect())
    }

    async fn mark(
        &self,
        record_id: RecordId,
        state: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pool_records
            SET state = $2,
                cooldown_until = CASE WHEN $2 = 'cooling' THEN cooldown_until ELSE NULL END,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(record_id.to_uuid())
        .bind(state.as_str())
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("record mark failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(PoolError::NotFound(format!("record {record_id}")));
        }
        Ok(())
    }

    async fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pool_records
            SET state = 'available', cooldown_until = NULL, updated_at = $1
            WHERE state = 'cooling' AND cooldown_until <= $1
            "#,
        )
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("cooldown sweep failed: {e}")))?;

        Ok(result.rows_affected())
    }
}
