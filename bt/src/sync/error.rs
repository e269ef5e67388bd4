//! Sync error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while pushing an event to the remote sheet
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Circuit open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },
}

impl SyncError {
    /// Whether the gateway was actually attempted
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, SyncError::CircuitOpen { .. })
    }

    /// Check if a retry inside the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ApiError { status, .. } => *status >= 500,
            SyncError::Network(_) => true,
            SyncError::CircuitOpen { .. }
            | SyncError::Timeout(_)
            | SyncError::RateLimited { .. }
            | SyncError::NotConfigured(_)
            | SyncError::RetriesExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        let err = SyncError::ApiError {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());

        let err = SyncError::ApiError {
            status: 400,
            message: "bad row".to_string(),
        };
        assert!(!err.is_retryable());

        let err = SyncError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert!(!err.is_retryable());

        let err = SyncError::RetriesExhausted {
            attempts: 4,
            last: Box::new(SyncError::ApiError {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Gave up after 4 attempts: API error 502: bad gateway");
    }

    #[test]
    fn test_short_circuit() {
        let err = SyncError::CircuitOpen {
            retry_after: Duration::from_secs(10),
        };
        assert!(err.is_short_circuit());
        assert!(!SyncError::Timeout(Duration::from_secs(5)).is_short_circuit());
    }
}
