//! Core data model definitions shared across poolgate crates.
#![allow(missing_docs)]

pub mod assignment;
pub mod campaign;
pub mod contact;
pub mod criteria;
pub mod error;
pub mod ids;
pub mod record;
pub mod suppression;
pub mod validate;
pub mod window;

// Intentionally curated re-exports for downstream consumers.
pub use assignment::{Assignment, AssignmentOutcome, ReleaseReason};
pub use campaign::{Campaign, CampaignState};
pub use contact::ContactIdentifiers;
pub use criteria::{ChannelRequirement, ClaimCriteria};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{AssignmentId, CampaignId, RecordId, ResourceId, SuppressionId, TenantId};
pub use record::{LifecycleState, PoolRecord};
pub use suppression::{SuppressionEntry, SuppressionReason};
pub use validate::{ActionType, DenyReason, ValidateRequest, Verdict};
pub use window::{ContactWindow, Resource, ResourceCounter, next_window_start, window_start};
