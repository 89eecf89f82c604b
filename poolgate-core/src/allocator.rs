//! The allocator: exclusive claiming, release/cooldown, maintenance sweeps.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use poolgate_model::{
    Assignment, AssignmentId, CampaignId, ClaimCriteria, LifecycleState, ReleaseReason, TenantId,
};

use crate::config::PoolConfig;
use crate::error::Result;
use crate::ports::{AssignmentStore, InvariantFinding, RecordStore, ReleaseStatus};

/// One claim request. Tenant identity and criteria are always explicit;
/// nothing here is read from ambient context.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub criteria: ClaimCriteria,
    pub max_count: usize,
}

/// Claims available pool records for tenant campaigns and manages the
/// release/cooldown/reassignment lifecycle.
///
/// Safe under any number of concurrent callers: the per-record
/// available-to-claimed transition is the atomic commit point, so a lost
/// race simply skips to the next candidate. No locks, no blocking, no
/// retries against the same record.
#[derive(Clone)]
pub struct Allocator {
    records: Arc<dyn RecordStore>,
    assignments: Arc<dyn AssignmentStore>,
    config: PoolConfig,
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Allocator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        assignments: Arc<dyn AssignmentStore>,
        config: PoolConfig,
    ) -> Self {
        Self {
            records,
            assignments,
            config,
        }
    }

    /// Claim up to `request.max_count` records (clamped to the configured
    /// batch cap) matching the tenant's criteria, in priority-then-age
    /// order. Candidates lost to concurrent callers are skipped.
    pub async fn claim_batch(
        &self,
        request: &ClaimRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<Assignment>> {
        let want = request.max_count.min(self.config.max_claim_batch);
        if want == 0 {
            return Ok(Vec::new());
        }

        let mut claimed = Vec::with_capacity(want);
        let mut attempted = std::collections::HashSet::new();
        let mut lost = 0usize;

        // Candidates lost to a concurrent caller are skipped, and the
        // selection is refetched until the pool has nothing left for this
        // criteria set. A record is never attempted twice: a lost race
        // means it is unavailable now, not worth waiting for.
        while claimed.len() < want {
            let candidates = self
                .records
                .find_available(&request.criteria, want - claimed.len() + attempted.len(), now)
                .await?;

            let fresh: Vec<_> = candidates
                .into_iter()
                .filter(|id| !attempted.contains(id))
                .take(want - claimed.len())
                .collect();
            if fresh.is_empty() {
                break;
            }

            for record_id in fresh {
                attempted.insert(record_id);
                match self
                    .assignments
                    .try_claim(record_id, request.tenant_id, request.campaign_id, now)
                    .await?
                {
                    Some(assignment) => claimed.push(assignment),
                    None => lost += 1,
                }
            }
        }

        info!(
            tenant = %request.tenant_id,
            campaign = %request.campaign_id,
            requested = request.max_count,
            claimed = claimed.len(),
            lost_races = lost,
            "claim batch complete"
        );
        Ok(claimed)
    }

    /// Release an assignment. Non-terminal reasons park the record in
    /// `cooling` for the configured cooldown; `suppressed`/`converted` are
    /// terminal. Always safe to call, even against an already-released
    /// assignment or with a validate/claim in flight.
    pub async fn release(
        &self,
        assignment_id: AssignmentId,
        reason: ReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<ReleaseStatus> {
        let cooldown_until = if reason.is_terminal() {
            None
        } else {
            Some(now + self.config.cooldown())
        };

        let status = self
            .assignments
            .release(assignment_id, reason, cooldown_until, now)
            .await?;

        match status {
            ReleaseStatus::Released => {
                info!(assignment = %assignment_id, reason = reason.as_str(), "assignment released");
            }
            ReleaseStatus::AlreadyReleased => {
                debug!(assignment = %assignment_id, "release was a no-op; already released");
            }
        }
        Ok(status)
    }

    /// Return elapsed `cooling` records to `available`. Idempotent.
    pub async fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<u64> {
        let moved = self.records.sweep_cooldowns(now).await?;
        if moved > 0 {
            info!(moved, "cooldown sweep returned records to the pool");
        }
        Ok(moved)
    }

    /// Touch reporting passthrough for outreach collaborators.
    pub async fn record_touch(
        &self,
        assignment_id: AssignmentId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let touched = self.assignments.record_touch(assignment_id, now).await?;
        if !touched {
            warn!(assignment = %assignment_id, "touch reported against a released assignment");
        }
        Ok(touched)
    }

    /// Structural-invariant sweep: claimed records must have exactly one
    /// active assignment and vice versa. Breached records are quarantined
    /// to `needs_review` and reported; nothing is ever auto-repaired or
    /// silently created.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<Vec<InvariantFinding>> {
        let mut findings = Vec::new();

        for record_id in self.assignments.claims_without_assignment().await? {
            let finding = InvariantFinding {
                record_id,
                assignment_id: None,
                detail: "claimed record without active assignment".into(),
            };
            error!(error = %finding.as_violation(), "structural invariant breached; quarantining");
            self.records
                .mark(record_id, LifecycleState::NeedsReview, now)
                .await?;
            findings.push(finding);
        }

        for (assignment_id, record_id) in self.assignments.assignments_without_claim().await? {
            let finding = InvariantFinding {
                record_id,
                assignment_id: Some(assignment_id),
                detail: "active assignment without claimed record".into(),
            };
            error!(error = %finding.as_violation(), "structural invariant breached; quarantining");
            self.records
                .mark(record_id, LifecycleState::NeedsReview, now)
                .await?;
            findings.push(finding);
        }

        Ok(findings)
    }
}
