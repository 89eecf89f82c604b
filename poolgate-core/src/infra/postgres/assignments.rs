//! Postgres assignment store: the claim commit point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use poolgate_model::{
    Assignment, AssignmentId, AssignmentOutcome, CampaignId, LifecycleState, RecordId,
    ReleaseReason, TenantId,
};

use crate::error::{PoolError, Result};
use crate::ports::{AssignmentStore, ReleaseStatus};

#[derive(Clone, Debug)]
pub struct PostgresAssignmentStore {
    pool: PgPool,
}

impl PostgresAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn assignment_exists(&self, assignment_id: AssignmentId) -> Result<bool> {
        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM assignments WHERE id = $1 LIMIT 1")
                .bind(assignment_id.to_uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| PoolError::Database(format!("assignment existence check failed: {e}")))?;
        Ok(exists.is_some())
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    record_id: Uuid,
    tenant_id: Uuid,
    campaign_id: Uuid,
    assigned_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
    release_reason: Option<String>,
    touch_count: i32,
    last_touch_at: Option<DateTime<Utc>>,
    outcome: String,
}

impl AssignmentRow {
    fn into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: AssignmentId(self.id),
            record_id: RecordId(self.record_id),
            tenant_id: TenantId(self.tenant_id),
            campaign_id: CampaignId(self.campaign_id),
            assigned_at: self.assigned_at,
            released_at: self.released_at,
            release_reason: self
                .release_reason
                .as_deref()
                .map(ReleaseReason::parse)
                .transpose()?,
            touch_count: self.touch_count,
            last_touch_at: self.last_touch_at,
            outcome: AssignmentOutcome::parse(&self.outcome)?,
        })
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, record_id, tenant_id, campaign_id, assigned_at, \
     released_at, release_reason, touch_count, last_touch_at, outcome";

#[async_trait]
impl AssignmentStore for PostgresAssignmentStore {
    async fn try_claim(
        &self,
        record_id: RecordId,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>> {
        // One statement: the conditional record transition is the commit
        // point, and the assignment insert only sees rows that transition
        // actually moved. A concurrent winner leaves the CTE empty and we
        // report a lost race, never an error.
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            r#"
            WITH claimed AS (
                UPDATE pool_records
                SET state = 'claimed', updated_at = $5
                WHERE id = $1 AND state = 'available'
                RETURNING id
            )
            INSERT INTO assignments (
                id, record_id, tenant_id, campaign_id, assigned_at,
                released_at, release_reason, touch_count, last_touch_at, outcome
            )
            SELECT $2, claimed.id, $3, $4, $5, NULL, NULL, 0, NULL, 'pending'
            FROM claimed
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(record_id.to_uuid())
        .bind(AssignmentId::new().to_uuid())
        .bind(tenant_id.to_uuid())
        .bind(campaign_id.to_uuid())
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("claim attempt failed: {e}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn get(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(assignment_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("assignment lookup failed: {e}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn active_for_record(&self, record_id: RecordId) -> Result<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE record_id = $1 AND released_at IS NULL"
        ))
        .bind(record_id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("active assignment lookup failed: {e}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn release(
        &self,
        assignment_id: AssignmentId,
        reason: ReleaseReason,
        cooldown_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ReleaseStatus> {
        let record_state = match reason {
            ReleaseReason::Suppressed => LifecycleState::Suppressed,
            ReleaseReason::Converted => LifecycleState::Converted,
            _ => LifecycleState::Cooling,
        };
        let outcome = reason.implied_outcome().map(|o| o.as_str());

        // The record transition is guarded on `claimed`: a record an
        // operator quarantined keeps its state while the assignment still
        // closes. The released CTE, not the record update, decides the
        // status we report.
        let released: Option<(Uuid,)> = sqlx::query_as(
            r#"
            WITH released AS (
                UPDATE assignments
                SET released_at = $2,
                    release_reason = $3,
                    outcome = COALESCE($4, outcome)
                WHERE id = $1 AND released_at IS NULL
                RETURNING record_id
            ),
            moved AS (
                UPDATE pool_records p
                SET state = $5, cooldown_until = $6, updated_at = $2
                FROM released
                WHERE p.id = released.record_id
                  AND p.state = 'claimed'
                RETURNING p.id
            )
            SELECT record_id FROM released
            "#,
        )
        .bind(assignment_id.to_uuid())
        .bind(now)
        .bind(reason.as_str())
        .bind(outcome)
        .bind(record_state.as_str())
        .bind(cooldown_until)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("release failed: {e}")))?;

        if released.is_some() {
            return Ok(ReleaseStatus::Released);
        }
        if self.assignment_exists(assignment_id).await? {
            Ok(ReleaseStatus::AlreadyReleased)
        } else {
            Err(PoolError::NotFound(format!("assignment {assignment_id}")))
        }
    }

    async fn record_touch(&self, assignment_id: AssignmentId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET touch_count = touch_count + 1, last_touch_at = $2
            WHERE id = $1 AND released_at IS NULL
            "#,
        )
        .bind(assignment_id.to_uuid())
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("touch update failed: {e}")))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.assignment_exists(assignment_id).await? {
            Ok(false)
        } else {
            Err(PoolError::NotFound(format!("assignment {assignment_id}")))
        }
    }

    async fn claims_without_assignment(&self) -> Result<Vec<RecordId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT r.id
            FROM pool_records r
            WHERE r.state = 'claimed'
              AND NOT EXISTS (
                  SELECT 1 FROM assignments a
                  WHERE a.record_id = r.id AND a.released_at IS NULL
              )
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("orphaned claim scan failed: {e}")))?;

        Ok(rows.into_iter().map(|(id,)| RecordId(id)).collect())
    }

    async fn assignments_without_claim(&self) -> Result<Vec<(AssignmentId, RecordId)>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT a.id, a.record_id
            FROM assignments a
            LEFT JOIN pool_records r ON r.id = a.record_id
            WHERE a.released_at IS NULL
              AND (r.id IS NULL OR r.state <> 'claimed')
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| PoolError::Database(format!("orphaned assignment scan failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, record_id)| (AssignmentId(id), RecordId(record_id)))
            .collect())
    }
}
