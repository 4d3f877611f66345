//! Timeout utilities for sandbox housekeeping
//!
//! Tool calls are bounded by their [`ExecContext`](crate::services::sandbox::ExecContext).
//! The timeouts here bound the short side operations around them: daemon
//! pings and container cleanup.

use std::time::Duration;

/// Timeout configuration for sandbox side operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for a container daemon ping (default: 2s)
    pub docker_ping_timeout: Duration,

    /// Timeout for cleaning up one container (default: 5s)
    pub cleanup_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            docker_ping_timeout: Duration::from_secs(2),
            cleanup_timeout: Duration::from_secs(5),
        }
    }
}

/// Apply timeout to an async operation
///
/// Returns `Err` with the original error type if the operation times out.
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}
