use chrono::{DateTime, Utc};
use poolgate_model::{AssignmentId, RecordId, ResourceId};
use thiserror::Error;

/// Errors surfaced by the allocation core.
///
/// Lost claim races and validation denials are NOT errors; they are typed
/// results (`None` from a claim attempt, `Verdict::Deny` from the
/// validator). This enum covers infrastructure failures and the fail-closed
/// conditions of the maintenance path.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("database error: {0}")]
    Database(String),

    #[error("model error: {0}")]
    Model(#[from] poolgate_model::ModelError),

    #[error("not found: {0}")]
    NotFound(String),

    /// An operation was attempted against a record in the wrong lifecycle
    /// state, e.g. an enrichment upsert on a claimed record.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A record was found in `claimed` with no active assignment, or an
    /// active assignment points at a record that is not `claimed`. Fatal to
    /// the affected record only; it is quarantined, never auto-repaired.
    #[error("invariant violation on record {record_id}: {detail}")]
    InvariantViolation {
        record_id: RecordId,
        assignment_id: Option<AssignmentId>,
        detail: String,
    },

    /// No counter row exists for (resource, window). Always treated as a
    /// deny by the validator; provisioning is triggered for the next call.
    #[error("missing resource counter for {resource_id} at window {window_start}")]
    ResourceCounterMissing {
        resource_id: ResourceId,
        window_start: DateTime<Utc>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
