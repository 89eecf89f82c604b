//! Suppression entries: global blocks on contact identifiers.

use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};
use crate::ids::SuppressionId;

/// Why an identifier is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SuppressionReason {
    OptOut,
    Complaint,
    HardBounce,
    Legal,
    Manual,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionReason::OptOut => "opt_out",
            SuppressionReason::Complaint => "complaint",
            SuppressionReason::HardBounce => "hard_bounce",
            SuppressionReason::Legal => "legal",
            SuppressionReason::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "opt_out" => Ok(SuppressionReason::OptOut),
            "complaint" => Ok(SuppressionReason::Complaint),
            "hard_bounce" => Ok(SuppressionReason::HardBounce),
            "legal" => Ok(SuppressionReason::Legal),
            "manual" => Ok(SuppressionReason::Manual),
            other => Err(ModelError::UnknownVariant {
                kind: "suppression reason",
                value: other.to_string(),
            }),
        }
    }
}

/// A permanent or time-bounded block on a normalized contact identifier
/// (email, phone, handle, or bare domain).
///
/// Written by compliance/import collaborators; the allocator and validator
/// only ever read these, and automated processes never delete them.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SuppressionEntry {
    pub id: SuppressionId,
    pub identifier: String,
    pub reason: SuppressionReason,
    pub added_at: DateTime<Utc>,
    /// `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SuppressionEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}
