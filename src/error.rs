//! Error types surfaced by the simulation

use thiserror::Error;

/// Errors returned to callers of [`crate::engine::TurnEngine`].
///
/// Only caller mistakes are reported. Provider failures are absorbed by the
/// agents and never reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("{0}")]
    Validation(String),
}

impl SimError {
    pub fn validation(message: impl Into<String>) -> Self {
        SimError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
