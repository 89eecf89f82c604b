//! Campaign operability directory entries.

use crate::error::{ModelError, Result};
use crate::ids::{CampaignId, TenantId};

/// Operating state of a campaign, flipped by tenant-facing collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CampaignState {
    Active,
    Paused,
    /// Credits exhausted; treated the same as paused by the validator.
    Exhausted,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::Active => "active",
            CampaignState::Paused => "paused",
            CampaignState::Exhausted => "exhausted",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(CampaignState::Active),
            "paused" => Ok(CampaignState::Paused),
            "exhausted" => Ok(CampaignState::Exhausted),
            other => Err(ModelError::UnknownVariant {
                kind: "campaign state",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_operable(&self) -> bool {
        matches!(self, CampaignState::Active)
    }
}

/// A campaign known to the directory.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Campaign {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub state: CampaignState,
}
