use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug)]
pub enum ModelError {
    /// A persisted string did not map to a known enum variant.
    UnknownVariant {
        kind: &'static str,
        value: String,
    },
    /// A contact identifier failed normalization.
    InvalidIdentifier(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnknownVariant { kind, value } => {
                write!(f, "unknown {kind} value: {value}")
            }
            ModelError::InvalidIdentifier(msg) => write!(f, "invalid identifier: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
