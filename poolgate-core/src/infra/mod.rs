//! Storage backends implementing the core's ports.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
