//! The just-in-time validator: the single mandatory gate before every
//! outbound action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use poolgate_model::{DenyReason, ReleaseReason, ValidateRequest, Verdict, window_start};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::ports::{
    AssignmentStore, CampaignDirectory, RecordStore, ResourceLedger, SuppressionIndex,
};

/// Chains suppression, ownership, campaign, timing and rate-limit checks,
/// short-circuiting on the first failure.
///
/// Must be called immediately before the side-effecting action; verdicts
/// are never cached and a pass from even one second earlier is not valid
/// for reuse. The whole chain is local storage lookups plus one atomic
/// counter increment — no external network calls.
#[derive(Clone)]
pub struct JitValidator {
    records: Arc<dyn RecordStore>,
    assignments: Arc<dyn AssignmentStore>,
    suppression: Arc<dyn SuppressionIndex>,
    campaigns: Arc<dyn CampaignDirectory>,
    ledger: Arc<dyn ResourceLedger>,
    config: PoolConfig,
}

impl std::fmt::Debug for JitValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitValidator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JitValidator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        assignments: Arc<dyn AssignmentStore>,
        suppression: Arc<dyn SuppressionIndex>,
        campaigns: Arc<dyn CampaignDirectory>,
        ledger: Arc<dyn ResourceLedger>,
        config: PoolConfig,
    ) -> Self {
        Self {
            records,
            assignments,
            suppression,
            campaigns,
            ledger,
            config,
        }
    }

    /// Run the full check chain for one imminent action.
    ///
    /// On `Allow` the resource counter has already been incremented; the
    /// caller must proceed with the action (or accept having burned one
    /// unit of the resource's window).
    pub async fn validate(&self, request: &ValidateRequest, now: DateTime<Utc>) -> Result<Verdict> {
        // The assignment is the entry point to everything the chain needs;
        // without one there is nothing to suppress or rate-limit.
        let Some(assignment) = self.assignments.get(request.assignment_id).await? else {
            return Ok(self.deny(request, DenyReason::StaleAssignment, now));
        };

        let Some(record) = self.records.get(assignment.record_id).await? else {
            return Ok(self.deny(request, DenyReason::StaleAssignment, now));
        };

        // 1. Global suppression, tenant-independent. A hit against a still
        // active assignment triggers the automatic release the global
        // invariant requires.
        let keys = record.contact.suppression_keys();
        if let Some(entry) = self.suppression.find_active(&keys, now).await? {
            if assignment.is_active() {
                self.assignments
                    .release(assignment.id, ReleaseReason::Suppressed, None, now)
                    .await?;
                info!(
                    assignment = %assignment.id,
                    record = %record.id,
                    identifier = %entry.identifier,
                    reason = entry.reason.as_str(),
                    "suppression hit; assignment auto-released"
                );
            }
            return Ok(self.deny(request, DenyReason::Suppressed, now));
        }

        // 2. Assignment validity: unreleased and owned by the caller.
        if !assignment.is_active()
            || assignment.tenant_id != request.tenant_id
            || assignment.campaign_id != request.campaign_id
        {
            return Ok(self.deny(request, DenyReason::StaleAssignment, now));
        }

        // 3. Campaign operability.
        let operable = self
            .campaigns
            .get(request.campaign_id)
            .await?
            .is_some_and(|campaign| campaign.state.is_operable());
        if !operable {
            return Ok(self.deny(request, DenyReason::CampaignInactive, now));
        }

        // 4. Contact window for the record's locale.
        if !self
            .config
            .contact_window
            .contains(now, record.utc_offset_minutes)
        {
            return Ok(self.deny(request, DenyReason::OutOfWindow, now));
        }

        // 5. Atomic conditional ledger increment. Check and increment are
        // one operation; two concurrent validations can never jointly
        // exceed the limit.
        let Some(resource) = self.ledger.get_resource(request.resource_id).await? else {
            warn!(resource = %request.resource_id, "unknown resource; failing closed");
            return Ok(self.deny(request, DenyReason::RateLimited, now));
        };
        let window = window_start(now, resource.utc_offset_minutes);
        match self.ledger.try_increment(request.resource_id, window).await {
            Ok(true) => {
                debug!(
                    assignment = %assignment.id,
                    resource = %request.resource_id,
                    action = request.action.as_str(),
                    "validation passed"
                );
                Ok(Verdict::Allow)
            }
            Ok(false) => Ok(self.deny(request, DenyReason::RateLimited, now)),
            Err(PoolError::ResourceCounterMissing {
                resource_id,
                window_start,
            }) => {
                // Fail closed, then provision so the next call finds a row.
                error!(
                    resource = %resource_id,
                    window = %window_start,
                    "resource counter missing; denying and provisioning"
                );
                if let Err(e) = self.ledger.provision_windows(now).await {
                    error!(error = %e, "window provisioning after counter miss failed");
                }
                Ok(self.deny(request, DenyReason::RateLimited, now))
            }
            Err(e) => Err(e),
        }
    }

    fn deny(&self, request: &ValidateRequest, reason: DenyReason, now: DateTime<Utc>) -> Verdict {
        info!(
            assignment = %request.assignment_id,
            tenant = %request.tenant_id,
            campaign = %request.campaign_id,
            resource = %request.resource_id,
            action = request.action.as_str(),
            reason = reason.as_str(),
            at = %now,
            "validation denied"
        );
        Verdict::deny(reason)
    }
}
