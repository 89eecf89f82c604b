//! Behaviour of the Postgres backends against a live database.
//!
//! Requires DATABASE_URL; run with `cargo test --features pg-tests`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use sqlx::PgPool;

use poolgate_core::infra::postgres::PostgresBackend;
use poolgate_core::ports::{
    AssignmentStore, RecordStore, ReleaseStatus, ResourceLedger, SuppressionIndex,
};
use poolgate_core::{Allocator, ClaimRequest, PoolConfig, PoolError};
use poolgate_model::{
    CampaignId, ClaimCriteria, ContactIdentifiers, LifecycleState, PoolRecord, ReleaseReason,
    Resource, ResourceId, SuppressionEntry, SuppressionId, SuppressionReason, TenantId,
    window_start,
};

async fn backend(pool: &PgPool) -> Result<PostgresBackend> {
    Ok(PostgresBackend::new(pool.clone()).await?)
}

async fn seed_record(backend: &PostgresBackend, email: &str, tier: i16) -> Result<PoolRecord> {
    let contact = ContactIdentifiers::normalized(Some(email), None, None)?;
    let record = PoolRecord::new(contact, tier, Utc::now());
    Ok(backend.records.upsert(record, Utc::now()).await?)
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn claim_commit_point_is_exclusive(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let record = seed_record(&backend, "solo@example.com", 0).await?;
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = backend.assignments.clone();
        let record_id = record.id;
        handles.push(tokio::spawn(async move {
            store
                .try_claim(record_id, TenantId::new(), CampaignId::new(), now)
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await??.is_some() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1, "the conditional update admits exactly one winner");

    let stored = backend.records.get(record.id).await?.unwrap();
    assert_eq!(stored.state, LifecycleState::Claimed);
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn release_and_sweep_round_trip(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let record = seed_record(&backend, "cooling@example.com", 0).await?;
    let now = Utc::now();

    let assignment = backend
        .assignments
        .try_claim(record.id, TenantId::new(), CampaignId::new(), now)
        .await?
        .expect("claim should win on a fresh record");

    backend
        .assignments
        .release(
            assignment.id,
            ReleaseReason::Replied,
            Some(now + TimeDelta::hours(1)),
            now,
        )
        .await?;

    let stored = backend.records.get(record.id).await?.unwrap();
    assert_eq!(stored.state, LifecycleState::Cooling);

    assert_eq!(
        backend
            .records
            .sweep_cooldowns(now + TimeDelta::minutes(30))
            .await?,
        0
    );
    assert_eq!(
        backend
            .records
            .sweep_cooldowns(now + TimeDelta::hours(2))
            .await?,
        1
    );

    let stored = backend.records.get(record.id).await?.unwrap();
    assert_eq!(stored.state, LifecycleState::Available);
    assert!(stored.cooldown_until.is_none());
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn release_does_not_move_quarantined_records(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let record = seed_record(&backend, "quarantined@example.com", 0).await?;
    let now = Utc::now();

    let assignment = backend
        .assignments
        .try_claim(record.id, TenantId::new(), CampaignId::new(), now)
        .await?
        .expect("claim should win on a fresh record");

    backend
        .records
        .mark(record.id, LifecycleState::NeedsReview, now)
        .await?;

    // The assignment closes, but the quarantined record keeps its state.
    let status = backend
        .assignments
        .release(
            assignment.id,
            ReleaseReason::Replied,
            Some(now + TimeDelta::hours(1)),
            now,
        )
        .await?;
    assert_eq!(status, ReleaseStatus::Released);

    let stored_assignment = backend.assignments.get(assignment.id).await?.unwrap();
    assert!(stored_assignment.released_at.is_some());

    let stored = backend.records.get(record.id).await?.unwrap();
    assert_eq!(stored.state, LifecycleState::NeedsReview);
    assert!(stored.cooldown_until.is_none());
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn candidate_selection_excludes_suppressed_and_orders_by_tier(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let now = Utc::now();

    let low = seed_record(&backend, "low@keep.example.com", 1).await?;
    let high = seed_record(&backend, "high@keep.example.com", 9).await?;
    let blocked = seed_record(&backend, "any@blocked.example.com", 9).await?;

    backend
        .suppression
        .insert(SuppressionEntry {
            id: SuppressionId::new(),
            identifier: "blocked.example.com".into(),
            reason: SuppressionReason::Legal,
            added_at: now,
            expires_at: None,
        })
        .await?;

    let ids = backend
        .records
        .find_available(&ClaimCriteria::any(), 10, now)
        .await?;

    assert_eq!(ids, vec![high.id, low.id]);
    assert!(!ids.contains(&blocked.id));
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn enrichment_upserts_rejected_after_claim(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let record = seed_record(&backend, "locked@example.com", 0).await?;
    let now = Utc::now();

    backend
        .assignments
        .try_claim(record.id, TenantId::new(), CampaignId::new(), now)
        .await?
        .expect("claim should win");

    let err = backend
        .records
        .upsert(record, now)
        .await
        .expect_err("payload updates only apply while available");
    assert!(matches!(err, PoolError::InvalidState(_)));
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn counter_increments_are_exact_under_concurrency(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let now = Utc::now();

    let resource = Resource {
        id: ResourceId::new(),
        label: "shared-domain".into(),
        daily_limit: 3,
        utc_offset_minutes: 0,
    };
    backend.ledger.register_resource(resource.clone()).await?;
    backend.ledger.provision_windows(now).await?;

    let window = window_start(now, 0);
    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = backend.ledger.clone();
        let resource_id = resource.id;
        handles.push(tokio::spawn(async move {
            ledger.try_increment(resource_id, window).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await?? {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 3, "exactly the hard limit may pass");

    let counter = backend.ledger.counter(resource.id, window).await?.unwrap();
    assert_eq!(counter.count, 3);
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn missing_counter_is_a_typed_error(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    let resource = Resource {
        id: ResourceId::new(),
        label: "unprovisioned".into(),
        daily_limit: 10,
        utc_offset_minutes: 0,
    };
    backend.ledger.register_resource(resource.clone()).await?;

    let err = backend
        .ledger
        .try_increment(resource.id, window_start(Utc::now(), 0))
        .await
        .expect_err("no window row was provisioned");
    assert!(matches!(err, PoolError::ResourceCounterMissing { .. }));
    Ok(())
}

#[sqlx::test(migrator = "poolgate_core::infra::postgres::MIGRATOR")]
async fn allocator_claims_through_postgres(pool: PgPool) -> Result<()> {
    let backend = backend(&pool).await?;
    for i in 0..5 {
        seed_record(&backend, &format!("batch{i}@example.com"), 0).await?;
    }

    let allocator = Allocator::new(
        Arc::new(backend.records.clone()),
        Arc::new(backend.assignments.clone()),
        PoolConfig::default(),
    );

    let claims = allocator
        .claim_batch(
            &ClaimRequest {
                tenant_id: TenantId::new(),
                campaign_id: CampaignId::new(),
                criteria: ClaimCriteria::any(),
                max_count: 3,
            },
            Utc::now(),
        )
        .await?;
    assert_eq!(claims.len(), 3);

    // The exclusivity index holds: every claim is a distinct record.
    let mut records: Vec<_> = claims.iter().map(|a| a.record_id).collect();
    records.sort();
    records.dedup();
    assert_eq!(records.len(), 3);
    Ok(())
}
