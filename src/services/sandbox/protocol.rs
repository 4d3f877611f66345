//! Wire format between the orchestrator and an isolated worker.
//!
//! A request is one JSON object written to the worker's stdin, after which
//! stdin is closed. The response is one JSON object read from stdout once the
//! worker has exited.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command-line flag that switches the binary into worker mode
pub const WORKER_MODE_FLAG: &str = "--sandbox-worker";

/// Highest request version this worker understands (0 means the original format)
pub const PROTOCOL_VERSION: u32 = 1;

/// Tool parameters: an opaque, arbitrarily nested key/value bag
pub type ToolParams = Map<String, Value>;

/// Tool output as returned to callers
pub type ToolOutput = Map<String, Value>;

/// A single tool invocation sent to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u32,
    pub tool_name: String,
    #[serde(default)]
    pub params: ToolParams,
}

impl ExecutionRequest {
    pub fn new(tool_name: impl Into<String>, params: ToolParams) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            tool_name: tool_name.into(),
            params,
        }
    }

    /// Whether a worker speaking [`PROTOCOL_VERSION`] can serve this request
    pub fn is_supported(&self) -> bool {
        self.version <= PROTOCOL_VERSION
    }
}

/// What a worker reports back.
///
/// A non-empty `error` is a tool-level failure; transport failures never
/// reach this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: ToolOutput) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Split into the output map or the tool's error message
    pub fn into_output(self) -> Result<ToolOutput, String> {
        match self.error {
            Some(error) if !error.is_empty() => Err(error),
            _ => Ok(self.output.unwrap_or_default()),
        }
    }
}

fn is_zero(version: &u32) -> bool {
    *version == 0
}
