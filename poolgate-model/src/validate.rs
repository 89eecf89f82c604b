//! Pre-send validation requests and verdicts.

use crate::ids::{AssignmentId, CampaignId, ResourceId, TenantId};

/// The outbound action a caller is about to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActionType {
    EmailSend,
    Call,
    SocialTouch,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::EmailSend => "email_send",
            ActionType::Call => "call",
            ActionType::SocialTouch => "social_touch",
        }
    }
}

/// Structured denial reason. Callers branch on this to decide whether to
/// retry later, release the assignment, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DenyReason {
    /// A non-expired suppression entry matches one of the record's
    /// identifiers. The assignment has already been auto-released.
    Suppressed,
    /// The assignment does not exist, was released, or belongs to another
    /// tenant/campaign.
    StaleAssignment,
    /// The campaign is paused or out of credits.
    CampaignInactive,
    /// Outside the allowed contact window for the record's locale.
    OutOfWindow,
    /// The resource's window counter is at its hard limit (or the counter
    /// row was missing, which fails closed).
    RateLimited,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Suppressed => "suppressed",
            DenyReason::StaleAssignment => "stale_assignment",
            DenyReason::CampaignInactive => "campaign_inactive",
            DenyReason::OutOfWindow => "out_of_window",
            DenyReason::RateLimited => "rate_limited",
        }
    }
}

/// Result of a just-in-time validation. Never cached; a verdict is good for
/// exactly the action it was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case", tag = "verdict"))]
pub enum Verdict {
    Allow,
    Deny { reason: DenyReason },
}

impl Verdict {
    pub fn deny(reason: DenyReason) -> Self {
        Verdict::Deny { reason }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// Everything the validator needs, passed explicitly by the caller.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidateRequest {
    pub assignment_id: AssignmentId,
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub resource_id: ResourceId,
    pub action: ActionType,
}
