//! Storage ports for the allocation core.
//!
//! Every mutual-exclusion guarantee lives behind these traits as an atomic
//! conditional operation: `try_claim` and `release` commit their record
//! transition and assignment write as one indivisible step, and
//! `try_increment` is a single conditional increment. Callers never do
//! read-modify-write against this layer.
//!
//! Time-sensitive methods take an explicit `now` so sweeps and window math
//! are deterministic under test.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use poolgate_model::{
    Assignment, AssignmentId, Campaign, CampaignId, ClaimCriteria, LifecycleState, PoolRecord,
    RecordId, ReleaseReason, Resource, ResourceCounter, ResourceId, SuppressionEntry, TenantId,
};

use crate::error::{PoolError, Result};

/// Outcome of a release attempt. A release is always safe to issue; racing
/// an in-flight release is reported, not failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    Released,
    AlreadyReleased,
}

/// One structural-invariant breach found by the reconcile sweep.
#[derive(Debug, Clone)]
pub struct InvariantFinding {
    pub record_id: RecordId,
    pub assignment_id: Option<AssignmentId>,
    pub detail: String,
}

impl InvariantFinding {
    /// The typed error this breach corresponds to, for logging and for
    /// callers that escalate findings.
    pub fn as_violation(&self) -> PoolError {
        PoolError::InvariantViolation {
            record_id: self.record_id,
            assignment_id: self.assignment_id,
            detail: self.detail.clone(),
        }
    }
}

/// Durable table of candidate records. Storage and query only; lifecycle
/// transitions happen through [`AssignmentStore`] claims/releases and
/// [`RecordStore::mark`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update a record. Payload and priority updates are the
    /// enrichment collaborator's path and are only applied while the record
    /// is `available`; updates against any other state are rejected.
    async fn upsert(&self, record: PoolRecord, now: DateTime<Utc>) -> Result<PoolRecord>;

    async fn get(&self, record_id: RecordId) -> Result<Option<PoolRecord>>;

    /// Candidate records in `available` state matching `criteria`, with no
    /// active suppression against any of their identifiers, ordered by
    /// priority tier descending then insertion time ascending.
    ///
    /// The state and suppression filters run inside this one query; callers
    /// must not post-filter (that would reopen the check-then-act gap the
    /// claim path closes).
    async fn find_available(
        &self,
        criteria: &ClaimCriteria,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecordId>>;

    /// Unconditional state transition, used by maintenance paths only.
    async fn mark(
        &self,
        record_id: RecordId,
        state: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Return elapsed `cooling` records to `available`. Idempotent; safe
    /// concurrently with claims. Returns how many records moved.
    async fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Ownership edges between records and tenants, plus the claim commit point.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// The atomic claim: transition the record from `available` to
    /// `claimed` AND insert an active assignment, as one indivisible
    /// operation. Returns `None` when the record was not `available`
    /// anymore (lost race) — expected control flow, not an error.
    async fn try_claim(
        &self,
        record_id: RecordId,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Assignment>>;

    async fn get(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>>;

    async fn active_for_record(&self, record_id: RecordId) -> Result<Option<Assignment>>;

    /// Atomically set `released_at` on the active assignment and move its
    /// record to the post-release state: `cooling` until `cooldown_until`
    /// for non-terminal reasons, `suppressed`/`converted` for terminal
    /// ones. The record transition only applies while the record is still
    /// `claimed`; a quarantined record keeps its state and the assignment
    /// closes anyway.
    async fn release(
        &self,
        assignment_id: AssignmentId,
        reason: ReleaseReason,
        cooldown_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ReleaseStatus>;

    /// Touch reporting from outreach collaborators. Increments only on the
    /// active assignment; returns `false` if it was already released.
    async fn record_touch(&self, assignment_id: AssignmentId, now: DateTime<Utc>) -> Result<bool>;

    /// Records in `claimed` state with no active assignment.
    async fn claims_without_assignment(&self) -> Result<Vec<RecordId>>;

    /// Active assignments whose record is not in `claimed` state.
    async fn assignments_without_claim(&self) -> Result<Vec<(AssignmentId, RecordId)>>;
}

/// Durable set of blocked contact identifiers. Read-only to the allocator
/// and validator; rows are written by compliance/import collaborators and
/// never deleted by automated processes.
#[async_trait]
pub trait SuppressionIndex: Send + Sync {
    /// The first non-expired entry matching any of the given normalized
    /// identifiers, if one exists.
    async fn find_active(
        &self,
        identifiers: &[String],
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>>;

    /// Compliance/import write path.
    async fn insert(&self, entry: SuppressionEntry) -> Result<()>;
}

/// Campaign operability lookups for validator step 3.
#[async_trait]
pub trait CampaignDirectory: Send + Sync {
    async fn get(&self, campaign_id: CampaignId) -> Result<Option<Campaign>>;

    async fn upsert(&self, campaign: Campaign) -> Result<()>;
}

/// Per-resource usage counters over rolling calendar-day windows.
#[async_trait]
pub trait ResourceLedger: Send + Sync {
    async fn register_resource(&self, resource: Resource) -> Result<()>;

    async fn get_resource(&self, resource_id: ResourceId) -> Result<Option<Resource>>;

    /// Atomic conditional increment: succeeds and increments only while
    /// `count < hard_limit`. Returns `Ok(false)` at the limit and
    /// `Err(PoolError::ResourceCounterMissing)` when no counter row exists
    /// for the window (callers fail closed).
    async fn try_increment(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<bool>;

    /// Create counter rows for the current and next window of every
    /// registered resource. Idempotent; run by maintenance so validation
    /// never finds a missing counter. Returns rows created.
    async fn provision_windows(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn counter(
        &self,
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    ) -> Result<Option<ResourceCounter>>;
}
