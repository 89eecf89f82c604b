//! JIT validator check chain: suppression precedence, stale assignments,
//! campaign gating, contact windows, and rate-limit exactness.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use poolgate_core::infra::memory::MemoryBackend;
use poolgate_core::{
    Allocator, CampaignDirectory, ClaimRequest, JitValidator, PoolConfig, ResourceLedger,
    SuppressionIndex,
};
use poolgate_model::{
    ActionType, Assignment, Campaign, CampaignId, CampaignState, ClaimCriteria,
    ContactIdentifiers, DenyReason, PoolRecord, Resource, ResourceId, SuppressionEntry,
    SuppressionId, SuppressionReason, TenantId, ValidateRequest, Verdict, window_start,
};

/// Tuesday 2026-03-10 14:00 UTC: inside the default contact window at
/// offset zero.
fn tuesday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
}

struct Harness {
    backend: MemoryBackend,
    allocator: Allocator,
    validator: JitValidator,
    tenant: TenantId,
    campaign: CampaignId,
    resource: ResourceId,
    assignment: Assignment,
}

impl Harness {
    /// One available record claimed by one active campaign, one resource
    /// with the given daily limit, windows provisioned.
    async fn new(daily_limit: i32, now: DateTime<Utc>) -> Self {
        use poolgate_core::RecordStore;

        let backend = MemoryBackend::new();
        let config = PoolConfig::default();
        let allocator = Allocator::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            config.clone(),
        );
        let validator = JitValidator::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            config,
        );

        let contact =
            ContactIdentifiers::normalized(Some("jane@prospect.example.com"), None, None).unwrap();
        let mut record = PoolRecord::new(contact, 0, now);
        record.utc_offset_minutes = Some(0);
        RecordStore::upsert(&backend, record, now).await.unwrap();

        let tenant = TenantId::new();
        let campaign = CampaignId::new();
        backend
            .upsert_campaign(tenant, campaign, CampaignState::Active)
            .await;

        let resource = ResourceId::new();
        backend
            .register_resource(Resource {
                id: resource,
                label: "outbound-domain-1".into(),
                daily_limit,
                utc_offset_minutes: 0,
            })
            .await
            .unwrap();
        backend.provision_windows(now).await.unwrap();

        let claims = allocator
            .claim_batch(
                &ClaimRequest {
                    tenant_id: tenant,
                    campaign_id: campaign,
                    criteria: ClaimCriteria::any(),
                    max_count: 1,
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);

        Self {
            backend,
            allocator,
            validator,
            tenant,
            campaign,
            resource,
            assignment: claims[0].clone(),
        }
    }

    fn request(&self) -> ValidateRequest {
        ValidateRequest {
            assignment_id: self.assignment.id,
            tenant_id: self.tenant,
            campaign_id: self.campaign,
            resource_id: self.resource,
            action: ActionType::EmailSend,
        }
    }

    async fn suppress(&self, identifier: &str, expires_at: Option<DateTime<Utc>>) {
        self.backend
            .insert(SuppressionEntry {
                id: SuppressionId::new(),
                identifier: identifier.into(),
                reason: SuppressionReason::OptOut,
                added_at: tuesday_afternoon() - TimeDelta::hours(1),
                expires_at,
            })
            .await
            .unwrap();
    }
}

trait CampaignSeed {
    async fn upsert_campaign(&self, tenant: TenantId, campaign: CampaignId, state: CampaignState);
}

impl CampaignSeed for MemoryBackend {
    async fn upsert_campaign(&self, tenant: TenantId, campaign: CampaignId, state: CampaignState) {
        CampaignDirectory::upsert(
            self,
            Campaign {
                id: campaign,
                tenant_id: tenant,
                state,
            },
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn clean_chain_allows_and_consumes_one_unit() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::Allow);

    let counter = h
        .backend
        .counter(h.resource, window_start(now, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(counter.count, 1);
}

#[tokio::test]
async fn suppression_denies_and_auto_releases() {
    use poolgate_core::RecordStore;
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    h.suppress("jane@prospect.example.com", None).await;

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(
        verdict,
        Verdict::deny(DenyReason::Suppressed),
        "suppression wins regardless of everything else"
    );

    // The global invariant: the assignment was auto-released and the
    // record is terminally suppressed.
    use poolgate_core::AssignmentStore;
    let assignment = AssignmentStore::get(&h.backend, h.assignment.id)
        .await
        .unwrap()
        .unwrap();
    assert!(assignment.released_at.is_some());
    let record = RecordStore::get(&h.backend, h.assignment.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, poolgate_model::LifecycleState::Suppressed);

    // Still Suppressed on repeat calls, not StaleAssignment: the
    // suppression check runs first.
    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::Suppressed));
}

#[tokio::test]
async fn domain_suppression_blocks_the_whole_domain() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    h.suppress("prospect.example.com", None).await;

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::Suppressed));
}

#[tokio::test]
async fn expired_suppression_does_not_block() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    h.suppress(
        "jane@prospect.example.com",
        Some(now - TimeDelta::minutes(5)),
    )
    .await;

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::Allow);
}

#[tokio::test]
async fn released_assignment_is_stale() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    h.allocator
        .release(h.assignment.id, poolgate_model::ReleaseReason::Declined, now)
        .await
        .unwrap();

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::StaleAssignment));
}

#[tokio::test]
async fn foreign_tenant_reference_is_stale() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    let mut request = h.request();
    request.tenant_id = TenantId::new();

    let verdict = h.validator.validate(&request, now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::StaleAssignment));
}

#[tokio::test]
async fn unknown_assignment_is_stale() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    let mut request = h.request();
    request.assignment_id = poolgate_model::AssignmentId::new();

    let verdict = h.validator.validate(&request, now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::StaleAssignment));
}

#[tokio::test]
async fn paused_or_missing_campaign_denies() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    h.backend
        .upsert_campaign(h.tenant, h.campaign, CampaignState::Paused)
        .await;
    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::CampaignInactive));

    h.backend
        .upsert_campaign(h.tenant, h.campaign, CampaignState::Exhausted)
        .await;
    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::CampaignInactive));
}

#[tokio::test]
async fn outside_contact_window_denies() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    // 23:00 local for a UTC+09:00 record.
    use poolgate_core::RecordStore;
    let mut record = RecordStore::get(&h.backend, h.assignment.record_id)
        .await
        .unwrap()
        .unwrap();
    record.utc_offset_minutes = Some(540);
    // Direct state poke: enrichment upserts are rejected while claimed.
    {
        use poolgate_model::LifecycleState;
        h.backend
            .mark(record.id, LifecycleState::Available, now)
            .await
            .unwrap();
        RecordStore::upsert(&h.backend, record, now).await.unwrap();
        h.backend
            .mark(h.assignment.record_id, LifecycleState::Claimed, now)
            .await
            .unwrap();
    }

    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::OutOfWindow));

    // Saturday is out for weekday-only windows even at a friendly hour.
    let h = Harness::new(10, now).await;
    let saturday = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
    h.backend.provision_windows(saturday).await.unwrap();
    let verdict = h.validator.validate(&h.request(), saturday).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::OutOfWindow));
}

#[tokio::test]
async fn rate_limit_is_exact_under_concurrency() {
    let now = tuesday_afternoon();
    let limit = 5i32;
    let extra = 3i32;
    let h = Harness::new(limit, now).await;
    let window = window_start(now, 0);

    let mut handles = Vec::new();
    for _ in 0..(limit + extra) {
        let ledger = h.backend.clone();
        let resource = h.resource;
        handles.push(tokio::spawn(async move {
            ledger.try_increment(resource, window).await.unwrap()
        }));
    }

    let mut allowed = 0;
    let mut denied = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        } else {
            denied += 1;
        }
    }
    assert_eq!(allowed, limit);
    assert_eq!(denied, extra);

    let counter = h.backend.counter(h.resource, window).await.unwrap().unwrap();
    assert_eq!(counter.count, limit);
}

#[tokio::test]
async fn validator_stops_at_the_limit() {
    let now = tuesday_afternoon();
    let h = Harness::new(2, now).await;

    for _ in 0..2 {
        let verdict = h.validator.validate(&h.request(), now).await.unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }
    let verdict = h.validator.validate(&h.request(), now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::RateLimited));
}

#[tokio::test]
async fn missing_counter_fails_closed_then_provisions() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    // A window nobody provisioned: next week.
    let next_week = now + TimeDelta::days(7);

    let verdict = h.validator.validate(&h.request(), next_week).await.unwrap();
    assert_eq!(
        verdict,
        Verdict::deny(DenyReason::RateLimited),
        "missing counter must deny, never fail open"
    );

    // The miss triggered provisioning; the same call now passes.
    let verdict = h.validator.validate(&h.request(), next_week).await.unwrap();
    assert_eq!(verdict, Verdict::Allow);
}

#[tokio::test]
async fn unknown_resource_fails_closed() {
    let now = tuesday_afternoon();
    let h = Harness::new(10, now).await;

    let mut request = h.request();
    request.resource_id = ResourceId::new();

    let verdict = h.validator.validate(&request, now).await.unwrap();
    assert_eq!(verdict, Verdict::deny(DenyReason::RateLimited));
}
