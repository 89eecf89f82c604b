//! Postgres campaign directory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use poolgate_model::{Campaign, CampaignId, CampaignState, TenantId};

use crate::error::{PoolError, Result};
use crate::ports::CampaignDirectory;

#[derive(Clone, Debug)]
pub struct PostgresCampaignDirectory {
    pool: PgPool,
}

impl PostgresCampaignDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    tenant_id: Uuid,
    state: String,
}

#[async_trait]
impl CampaignDirectory for PostgresCampaignDirectory {
    async fn get(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>(
            "SELECT id, tenant_id, state FROM campaigns WHERE id = $1",
        )
        .bind(campaign_id.to_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("campaign lookup failed: {e}")))?;

        row.map(|row| {
            Ok(Campaign {
                id: CampaignId(row.id),
                tenant_id: TenantId(row.tenant_id),
                state: CampaignState::parse(&row.state)?,
            })
        })
        .transpose()
    }

    async fn upsert(&self, campaign: Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, tenant_id, state)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET tenant_id = EXCLUDED.tenant_id, state = EXCLUDED.state
            "#,
        )
        .bind(campaign.id.to_uuid())
        .bind(campaign.tenant_id.to_uuid())
        .bind(campaign.state.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| PoolError::Database(format!("campaign upsert failed: {e}")))?;
        Ok(())
    }
}
