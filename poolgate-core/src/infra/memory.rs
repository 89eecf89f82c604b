//! In-memory backend.
//!
//! Implements every storage port under a single mutex so the conditional
//! transitions keep exactly the semantics the Postgres backend gets from
//! single-statement conditional updates. Used by embedded deployments and
//! by the concurrency test suite; no await ever happens while the lock is
//! held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use poolgate_model::{
    Assignment, AssignmentId, Campaign, CampaignId, ClaimCriteria, LifecycleState, PoolRecord,
    RecordId, ReleaseReason, Resource, ResourceCounter, ResourceId, SuppressionEntry, TenantId,
    next_window_start, window_start,
};

use crate::error::{PoolError, Result};
use crate::ports::{
    AssignmentStore, CampaignDirectory, RecordStore, ReleaseStatus, ResourceLedger,
    SuppressionIndex,
};

#[derive(Debug, Default)]
struct State {
    records: HashMap<RecordId, PoolRecord>,
    assignments: HashMap<AssignmentId, Assignment>,
    active_by_record: HashMap<RecordId, AssignmentId>,
    suppression: Vec<SuppressionEntry>,
    campaigns: HashMap<CampaignId, Campaign>,
    resources: HashMap<ResourceId, Resource>,
    counters: HashMap<(ResourceId, DateTime<Utc>), ResourceCounter>,
}

impl State {
    fn is_suppressed(&self, record: &PoolRecord, now: DateTime<Utc>) -> bool {
        let keys = record.contact.suppression_keys();
        self.suppression
            .iter()
            .any(|entry| entry.is_active(now) && keys.iter().any(|k| *k == entry.identifier))
    }
}

/// All five storage ports behind one in-process state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Poisoning only happens if a panic escaped while holding the
        // lock; propagating the panic is the right behavior for tests.
        self.inner.lock().expect("memory backend lock poisoned")
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn upsert(&self, mut record: PoolRecord, now: DateTime<Utc>) -> Result<PoolRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.records.get(&record.id) {
            if existing.state != LifecycleState::Available {
                return Err(PoolError::InvalidState(format!(
                    "record {} is {}; enrichment updates apply only while available",
                    record.id, existing.state
                )));
            }
            record.created_at = existing.created_at;
        }
        record.updated_at = now;
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, record_id: RecordId) -> Result<Option<PoolRecord>> {
        Ok(self.lock().records.get(&record_id).cloned())
    }

    async fn find_available(
        &self,
        criteria: &ClaimCriteria,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecordId>> {
        let state = self.lock();
        let mut matching: Vec<&PoolRecord> = state
            .records
            .values()
            .filter(|r| r.state == LifecycleState::Available)
            .filter(|r| criteria.matches(r.priority_tier, &r.contact, &r.payload))
            .filter(|r| !state.is_suppressed(r, now))
            .collect();
        matching.sort_by(|a, b| {
            b.priority_tier
                .cmp(&a.priority_tier)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(matching.into_iter().take(limit).map(|r| r.id).collect())
    }

    async fn mark(
        &self,
        record_id: RecordId,
        state_to: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&record_id)
            .ok_or_else(|| PoolError::NotFound(format!("record {record_id}")))?;
        record.state = state_to;
        record.updated_at = now;
        if state_to != LifecycleState::Cooling {
            record.cooldown_until = None;
        }
        Ok(())
    }

    async fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let mut moved = 0u64;
        for record in state.records.values_mut() {
            if record.state == LifecycleState::Cooling
                && record.cooldown_until.is_some_and(|until| until <= now)
            {
                record.state = LifecycleState::Available;
                record.cooldown_until = None;
                record.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[async_trait]
impl AssignmentStore for MemoryBackend {
    async fn try_claim(
        &self,
        record_id: RecordId,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>> {
        let mut state = self.lock();
        // The commit point: transition and assignment insert happen under
        // the same critical section or not at all.
        let Some(record) = state.records.get_mut(&record_id) else {
            return Ok(None);
        };
        if record.state != LifecycleState::Available {
            return Ok(None);
        }
        record.state = LifecycleState::Claimed;
        record.updated_at = now;

        let assignment = Assignment {
            id: AssignmentId::new(),
            record_id,
            tenant_id,
            campaign_id,
            assigned_at: now,
            released_at: None,
            release_reason: None,
            touch_count: 0,
            last_touch_at: None,
            outcome: poolgate_model::AssignmentOutcome::Pending,
        };
        state.active_by_record.insert(record_id, assignment.id);
        state.assignments.insert(assignment.id, assignment.clone());
        Ok(Some(assignment))
    }

    async fn get(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>> {
        Ok(self.lock().assignments.get(&assignment_id).cloned())
    }

    async fn active_for_record(&self, record_id: RecordId) -> Result<Option<Assignment>> {
        let state = self.lock();
        Ok(state
            .active_by_record
            .get(&record_id)
            .and_then(|id| state.assignments.get(id))
            .cloned())
    }

    async fn release(
        &self,
        assignment_id: AssignmentId,
        reason: ReleaseReason,
        cooldown_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ReleaseStatus> {
        let mut state = self.lock();
        let assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| PoolError::NotFound(format!("assignment {assignment_id}")))?;
        if assignment.released_at.is_some() {
            return Ok(ReleaseStatus::AlreadyReleased);
        }
        assignment.released_at = Some(now);
        assignment.release_reason = Some(reason);
        if let Some(outcome) = reason.implied_outcome() {
            assignment.outcome = outcome;
        }
        let record_id = assignment.record_id;
        state.active_by_record.remove(&record_id);

        // Only a record still in `claimed` follows the assignment out; a
        // quarantined record stays put until an operator moves it.
        if let Some(record) = state.records.get_mut(&record_id)
            && record.state == LifecycleState::Claimed
        {
            record.state = match reason {
                ReleaseReason::Suppressed => LifecycleState::Suppressed,
                ReleaseReason::Converted => LifecycleState::Converted,
                _ => LifecycleState::Cooling,
            };
            record.cooldown_until = if reason.is_terminal() {
                None
            } else {
                cooldown_until
            };
            record.updated_at = now;
        }
        Ok(ReleaseStatus::Released)
    }

    async fn record_touch(&self, assignment_id: AssignmentId, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        let assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| PoolError::NotFound(format!("assignment {assignment_id}")))?;
        if assignment.released_at.is_some() {
            return Ok(false);
        }
        assignment.touch_count += 1;
        assignment.last_touch_at = Some(now);
        Ok(true)
    }

    async fn claims_without_assignment(&self) -> Result<Vec<RecordId>> {
        let state = self.lock();
        Ok(state
            .records
            .values()
            .filter(|r| r.state == LifecycleState::Claimed)
            .filter(|r| !state.active_by_record.contains_key(&r.id))
            .map(|r| r.id)
            .collect())
    }

    async fn assignments_without_claim(&self) -> Result<Vec<(AssignmentId, RecordId)>> {
        let state = self.lock();
        Ok(state
            .assignments
            .values()
            .filter(|a| a.released_at.is_none())
            .filter(|a| {
                state
                    .records
                    .get(&a.record_id)
                    .is_none_or(|r| r.state != LifecycleState::Claimed)
            })
            .map(|a| (a.id, a.record_id))
            .collect())
    }
}

#[async_trait]
impl SuppressionIndex for MemoryBackend {
    async fn find_active(
        &self,
        identifiers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>> {
        let state = self.lock();
        Ok(state
            .suppression
            .iter()
            .find(|entry| {
                entry.is_active(now) && identifiers.iter().any(|id| *id == entry.identifier)
            })
            .cloned())
    }

    async fn insert(&self, entry: SuppressionEntry) -> Result<()> {
        self.lock().suppression.push(entry);
        Ok(())
    }
}

#[async_trait]
impl CampaignDirectory for MemoryBackend {
    async fn get(&self, campaign_id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.lock().campaigns.get(&campaign_id).cloned())
    }

    async fn upsert(&self, campaign: Campaign) -> Result<()> {
        self.lock().campaigns.insert(campaign.id, campaign);
        Ok(())
    }
}

#[async_trait]
impl ResourceLedger for MemoryBackend {
    async fn register_resource(&self, resource: Resource) -> Result<()> {
        self.lock().resources.insert(resource.id, resource);
        Ok(())
    }

    async fn get_resource(&self, resource_id: ResourceId) -> Result<Option<Resource>> {
        Ok(self.lock().resources.get(&resource_id).cloned())
    }

    async fn try_increment(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        let counter = state
            .counters
            .get_mut(&(resource_id, window_start))
            .ok_or(PoolError::ResourceCounterMissing {
                resource_id,
                window_start,
            })?;
        if counter.count < counter.hard_limit {
            counter.count += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn provision_windows(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let mut created = 0u64;
        let resources: Vec<Resource> = state.resources.values().cloned().collect();
        for resource in resources {
            for start in [
                window_start(now, resource.utc_offset_minutes),
                next_window_start(now, resource.utc_offset_minutes),
            ] {
                state
                    .counters
                    .entry((resource.id, start))
                    .or_insert_with(|| {
                        created += 1;
                        ResourceCounter {
                            resource_id: resource.id,
                            window_start: start,
                            count: 0,
                            hard_limit: resource.daily_limit,
                        }
                    });
            }
        }
        Ok(created)
    }

    async fn counter(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<Option<ResourceCounter>> {
        Ok(self
            .lock()
            .counters
            .get(&(resource_id, window_start))
            .cloned())
    }
}
