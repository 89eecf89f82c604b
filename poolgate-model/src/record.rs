//! Pool records and their lifecycle.

use chrono::{DateTime, Utc};

use crate::contact::ContactIdentifiers;
use crate::error::{ModelError, Result};
use crate::ids::RecordId;

/// Lifecycle state of a pool record.
///
/// Only the allocator transitions these; `Suppressed` and `Converted` are
/// terminal and a record never leaves `NeedsReview` without an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LifecycleState {
    Available,
    Claimed,
    Cooling,
    Suppressed,
    Converted,
    Exhausted,
    NeedsReview,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Available => "available",
            LifecycleState::Claimed => "claimed",
            LifecycleState::Cooling => "cooling",
            LifecycleState::Suppressed => "suppressed",
            LifecycleState::Converted => "converted",
            LifecycleState::Exhausted => "exhausted",
            LifecycleState::NeedsReview => "needs_review",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "available" => Ok(LifecycleState::Available),
            "claimed" => Ok(LifecycleState::Claimed),
            "cooling" => Ok(LifecycleState::Cooling),
            "suppressed" => Ok(LifecycleState::Suppressed),
            "converted" => Ok(LifecycleState::Converted),
            "exhausted" => Ok(LifecycleState::Exhausted),
            "needs_review" => Ok(LifecycleState::NeedsReview),
            other => Err(ModelError::UnknownVariant {
                kind: "lifecycle state",
                value: other.to_string(),
            }),
        }
    }

    /// Terminal states are never reassignable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Suppressed | LifecycleState::Converted | LifecycleState::Exhausted
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate contact record in the shared, tenant-agnostic pool.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolRecord {
    pub id: RecordId,
    pub contact: ContactIdentifiers,
    /// Semi-structured enrichment payload, owned by the enrichment
    /// collaborator. Always a JSON object.
    pub payload: serde_json::Value,
    /// Ordinal set by the scoring collaborator; higher claims first.
    pub priority_tier: i16,
    pub state: LifecycleState,
    /// Minutes east of UTC for the record's locale, used for the contact
    /// window check. Unknown locales validate against UTC.
    pub utc_offset_minutes: Option<i32>,
    /// Set while `Cooling`; cleared when the sweep returns the record.
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PoolRecord {
    /// A fresh, available record as produced by the enrichment collaborator.
    pub fn new(contact: ContactIdentifiers, priority_tier: i16, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            contact,
            payload: serde_json::Value::Object(serde_json::Map::new()),
            priority_tier,
            state: LifecycleState::Available,
            utc_offset_minutes: None,
            cooldown_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_strings() {
        for state in [
            LifecycleState::Available,
            LifecycleState::Claimed,
            LifecycleState::Cooling,
            LifecycleState::Suppressed,
            LifecycleState::Converted,
            LifecycleState::Exhausted,
            LifecycleState::NeedsReview,
        ] {
            assert_eq!(LifecycleState::parse(state.as_str()).unwrap(), state);
        }
        assert!(LifecycleState::parse("armed").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(LifecycleState::Suppressed.is_terminal());
        assert!(LifecycleState::Converted.is_terminal());
        assert!(!LifecycleState::Cooling.is_terminal());
        assert!(!LifecycleState::NeedsReview.is_terminal());
    }
}
