//! Tenant ICP claim criteria.

use serde_json::Value;

/// Which contact channel a criteria set requires on candidate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChannelRequirement {
    Email,
    Phone,
    Handle,
}

/// Matching criteria supplied per claim request. Passed explicitly into
/// `claim_batch`, never read from ambient configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClaimCriteria {
    /// Only records at or above this priority tier match.
    pub min_priority_tier: Option<i16>,
    /// Channels the record must have a normalized identifier for.
    pub required_channels: Vec<ChannelRequirement>,
    /// Exact-match filters against the enrichment payload, e.g.
    /// `{"industry": "logistics"}`. Postgres evaluates these with `@>`;
    /// the memory backend compares top-level keys.
    pub payload_filters: serde_json::Map<String, Value>,
}

impl ClaimCriteria {
    pub fn any() -> Self {
        Self::default()
    }

    /// Whether a record's attributes satisfy this criteria set.
    /// Lifecycle state is deliberately not checked here; the stores filter
    /// state inside the same query used for claiming.
    pub fn matches(
        &self,
        priority_tier: i16,
        contact: &crate::contact::ContactIdentifiers,
        payload: &Value,
    ) -> bool {
        if let Some(min) = self.min_priority_tier
            && priority_tier < min
        {
            return false;
        }
        for channel in &self.required_channels {
            let present = match channel {
                ChannelRequirement::Email => contact.email.is_some(),
                ChannelRequirement::Phone => contact.phone.is_some(),
                ChannelRequirement::Handle => contact.handle.is_some(),
            };
            if !present {
                return false;
            }
        }
        for (key, expected) in &self.payload_filters {
            if payload.get(key) != Some(expected) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::ContactIdentifiers;
    use serde_json::json;

    #[test]
    fn criteria_filters_tier_channel_and_payload() {
        let contact =
            ContactIdentifiers::normalized(Some("jane@example.com"), None, None).unwrap();
        let payload = json!({"industry": "logistics", "size": "mid"});

        let mut criteria = ClaimCriteria::any();
        assert!(criteria.matches(0, &contact, &payload));

        criteria.min_priority_tier = Some(3);
        assert!(!criteria.matches(2, &contact, &payload));
        assert!(criteria.matches(3, &contact, &payload));

        criteria.required_channels = vec![ChannelRequirement::Phone];
        assert!(!criteria.matches(3, &contact, &payload));

        criteria.required_channels = vec![ChannelRequirement::Email];
        criteria
            .payload_filters
            .insert("industry".into(), json!("logistics"));
        assert!(criteria.matches(3, &contact, &payload));

        criteria.payload_filters.insert("size".into(), json!("large"));
        assert!(!criteria.matches(3, &contact, &payload));
    }
}
