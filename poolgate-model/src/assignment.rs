//! Assignments: the exclusive ownership edge from a record to a tenant.

use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};
use crate::ids::{AssignmentId, CampaignId, RecordId, TenantId};

/// Outcome of the outreach attempt, reported by channel collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AssignmentOutcome {
    Pending,
    Replied,
    Converted,
    Declined,
    Exhausted,
}

impl AssignmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentOutcome::Pending => "pending",
            AssignmentOutcome::Replied => "replied",
            AssignmentOutcome::Converted => "converted",
            AssignmentOutcome::Declined => "declined",
            AssignmentOutcome::Exhausted => "exhausted",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(AssignmentOutcome::Pending),
            "replied" => Ok(AssignmentOutcome::Replied),
            "converted" => Ok(AssignmentOutcome::Converted),
            "declined" => Ok(AssignmentOutcome::Declined),
            "exhausted" => Ok(AssignmentOutcome::Exhausted),
            other => Err(ModelError::UnknownVariant {
                kind: "assignment outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// Why an assignment was released. Decides where the record goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReleaseReason {
    Replied,
    Declined,
    Exhausted,
    CampaignEnded,
    /// Terminal: record moves to `suppressed`, never reassignable.
    Suppressed,
    /// Terminal: record moves to `converted`, never reassignable.
    Converted,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::Replied => "replied",
            ReleaseReason::Declined => "declined",
            ReleaseReason::Exhausted => "exhausted",
            ReleaseReason::CampaignEnded => "campaign_ended",
            ReleaseReason::Suppressed => "suppressed",
            ReleaseReason::Converted => "converted",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "replied" => Ok(ReleaseReason::Replied),
            "declined" => Ok(ReleaseReason::Declined),
            "exhausted" => Ok(ReleaseReason::Exhausted),
            "campaign_ended" => Ok(ReleaseReason::CampaignEnded),
            "suppressed" => Ok(ReleaseReason::Suppressed),
            "converted" => Ok(ReleaseReason::Converted),
            other => Err(ModelError::UnknownVariant {
                kind: "release reason",
                value: other.to_string(),
            }),
        }
    }

    /// Terminal reasons skip cooldown and park the record permanently.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReleaseReason::Suppressed | ReleaseReason::Converted)
    }

    /// Outcome to stamp on the assignment at release time, when the reason
    /// implies one. `CampaignEnded` and `Suppressed` leave the outcome as
    /// reported by the outreach collaborator.
    pub fn implied_outcome(&self) -> Option<AssignmentOutcome> {
        match self {
            ReleaseReason::Replied => Some(AssignmentOutcome::Replied),
            ReleaseReason::Declined => Some(AssignmentOutcome::Declined),
            ReleaseReason::Exhausted => Some(AssignmentOutcome::Exhausted),
            ReleaseReason::Converted => Some(AssignmentOutcome::Converted),
            ReleaseReason::CampaignEnded | ReleaseReason::Suppressed => None,
        }
    }
}

/// Exclusive ownership of one pool record by one tenant campaign.
///
/// At most one assignment per record may have `released_at = None`; the
/// store backends enforce this, not the callers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub id: AssignmentId,
    pub record_id: RecordId,
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub release_reason: Option<ReleaseReason>,
    pub touch_count: i32,
    pub last_touch_at: Option<DateTime<Utc>>,
    pub outcome: AssignmentOutcome,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}
