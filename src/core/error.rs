use super::types::FactoryKey;
use std::time::Duration;
use thiserror::Error;

/// Error raised by collaborators (resource factories, resources themselves).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot acquire resource from {key}: {source}")]
    AcquisitionFailure {
        key: FactoryKey,
        #[source]
        source: BoxError,
    },

    #[error("Already bound a resource holder for {0} in this context")]
    BindingConflict(FactoryKey),

    #[error("No resource holder bound for {0} in this context")]
    NoBinding(FactoryKey),

    #[error("Could not release resource from {key}: {source}")]
    ReleaseFailure {
        key: FactoryKey,
        #[source]
        source: BoxError,
    },

    #[error("Scope timed out: deadline exceeded by {deadline_exceeded_by:?}")]
    TimedOut { deadline_exceeded_by: Duration },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid scope definition: {0}")]
    InvalidDefinition(String),

    #[error("Synchronization failed during {phase}: {message}")]
    CallbackFailed { phase: String, message: String },

    #[error("Scope rolled back because it was marked rollback-only: {0}")]
    UnexpectedRollback(String),

    #[error("Resource operation failed: {0}")]
    ResourceError(String),
}

impl SyncError {
    /// Binding conflicts and misuse of the context are programming defects,
    /// not conditions a caller should retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::BindingConflict(_) | SyncError::NoBinding(_) | SyncError::InvalidState(_)
        )
    }

    pub fn callback(phase: impl std::fmt::Display, message: impl Into<String>) -> Self {
        SyncError::CallbackFailed {
            phase: phase.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
