//! Sandbox-specific exceptions and error types
//!
//! This module defines the error taxonomy for isolated tool execution.
//! Transport failures (launch, attach, malformed output) are kept apart from
//! tool-level failures, which are reported by the tool itself.

use super::context::ContextError;
use thiserror::Error;

/// Errors that can occur while executing a tool in a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The requested backend cannot be reached or instantiated
    #[error("Sandbox runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The per-call deadline elapsed before the tool finished
    #[error("Tool {tool} timed out in sandbox")]
    ContainerTimeout { tool: String },

    /// The worker process exited non-zero: killed, crashed or refused the
    /// request. Classed with timeouts.
    #[error("Tool {tool} timed out in sandbox: worker exited with {status}: {stderr}")]
    WorkerExited {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The container was killed by the out-of-memory handler
    #[error("Tool {tool} was killed by the out-of-memory handler (exit status 137)")]
    ContainerOom { tool: String },

    /// The caller cancelled the call
    #[error("Tool {tool} was cancelled")]
    Cancelled { tool: String },

    /// The tool ran and reported a failure of its own
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    /// The worker executable could not be located
    #[error("Failed to resolve sandbox worker executable: {0}")]
    ResolveExecutable(#[source] std::io::Error),

    /// The request could not be serialized
    #[error("Failed to encode request for tool {tool}: {source}")]
    Encode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker process could not be launched
    #[error("Failed to launch sandbox worker for tool {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O with the isolated process failed
    #[error("Sandbox I/O failed for tool {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker exited abnormally without a usable result
    #[error("Sandbox worker for tool {tool} exited with {status}: {stderr}")]
    WorkerFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The worker's output was not a valid result object
    #[error("Malformed sandbox output for tool {tool}: {source} (stderr: {stderr})")]
    MalformedOutput {
        tool: String,
        #[source]
        source: serde_json::Error,
        stderr: String,
    },

    /// A Docker API call failed
    #[error("Docker {stage} failed for tool {tool}: {source}")]
    Docker {
        tool: String,
        stage: &'static str,
        #[source]
        source: bollard::errors::Error,
    },

    /// The container pool was closed
    #[error("Container pool is closed")]
    PoolClosed,

    /// The context was done before any work started
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Configuration rejected at construction time
    #[error("Invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

impl SandboxError {
    /// Map a context error observed during a call to the per-tool error
    pub fn from_context(err: ContextError, tool: &str) -> Self {
        match err {
            ContextError::DeadlineExceeded => SandboxError::ContainerTimeout {
                tool: tool.to_string(),
            },
            ContextError::Cancelled => SandboxError::Cancelled {
                tool: tool.to_string(),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SandboxError::ContainerTimeout { .. }
                | SandboxError::WorkerExited { .. }
                | SandboxError::Context(ContextError::DeadlineExceeded)
        )
    }

    pub fn is_oom(&self) -> bool {
        matches!(self, SandboxError::ContainerOom { .. })
    }

    pub fn is_runtime_unavailable(&self) -> bool {
        matches!(self, SandboxError::RuntimeUnavailable(_))
    }

    /// Whether the failure came from the tool rather than the sandbox machinery
    pub fn is_tool_error(&self) -> bool {
        matches!(self, SandboxError::Tool { .. })
    }

    /// Check if this error is worth retrying by the caller.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SandboxError::RuntimeUnavailable(_)
                | SandboxError::ContainerTimeout { .. }
                | SandboxError::Docker { .. }
        )
    }
}

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;
