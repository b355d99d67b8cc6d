//! Error types for the resource pool

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a resource")]
    AcquisitionTimeout(Duration),

    #[error("Pool has been destroyed")]
    PoolDestroyed,

    #[error("Failed to create resource: {0}")]
    CreationFailure(String),

    #[error("Cannot resize pool to {requested}: below minimum size {min}")]
    InvalidResize { requested: usize, min: usize },

    #[error("Pool initialization failed: {created} created, {failed} failed")]
    PoolInitialization { created: usize, failed: usize },

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No pool named '{0}' is registered")]
    PoolNotFound(String),

    #[error("A pool named '{0}' is already registered")]
    PoolAlreadyExists(String),

    #[error("Pool '{0}' does not hold the requested resource type")]
    TypeMismatch(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PoolError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::AcquisitionTimeout(_) | PoolError::CreationFailure(_)
        )
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PoolError::InvalidResize { requested: 1, min: 2 };
        assert_eq!(
            err.to_string(),
            "Cannot resize pool to 1: below minimum size 2"
        );
        assert_eq!(PoolError::PoolDestroyed.to_string(), "Pool has been destroyed");
    }

    #[test]
    fn test_retryable() {
        assert!(PoolError::AcquisitionTimeout(Duration::from_millis(5)).is_retryable());
        assert!(!PoolError::PoolDestroyed.is_retryable());
    }
}
