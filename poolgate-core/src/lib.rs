//! poolgate-core: shared record allocation and pre-send validation.
//!
//! The pool holds tenant-agnostic prospect records; the [`Allocator`] hands
//! out exclusive per-tenant ownership of them under arbitrary concurrency,
//! and the [`JitValidator`] gates every outbound action behind suppression,
//! ownership, timing and rate-limit checks. All mutual exclusion lives in
//! atomic conditional state transitions at the storage layer; there is no
//! lock manager and no coordination between workers.

pub mod allocator;
pub mod config;
pub mod error;
pub mod infra;
pub mod ports;
pub mod validator;

pub use allocator::{Allocator, ClaimRequest};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use ports::{
    AssignmentStore, CampaignDirectory, InvariantFinding, RecordStore, ReleaseStatus,
    ResourceLedger, SuppressionIndex,
};
pub use validator::JitValidator;

pub use poolgate_model as model;
