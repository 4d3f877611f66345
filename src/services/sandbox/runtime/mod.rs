//! Container runtime backends
//!
//! Every isolation strategy implements [`ContainerRuntime`]. Adding a backend
//! means implementing the trait and giving it a slot in the selection order
//! of [`ContainerExecutor`](super::ContainerExecutor); callers do not change.

mod docker;
mod frames;
mod gvisor;
mod native;

pub use docker::{DockerRuntime, SweepScope, SANDBOX_LABEL, TOOL_LABEL};
pub use frames::{parse_container_output, strip_stream_frames, FRAME_HEADER_LEN};
pub use gvisor::GvisorRuntime;
pub use native::NativeRuntime;

use super::context::ExecContext;
use super::exceptions::SandboxResult;
use super::protocol::{ExecutionResult, ToolParams};
use async_trait::async_trait;
use std::time::Duration;

/// Per-invocation container parameters
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    pub tool_name: String,
    pub network_mode: String,
    pub params: ToolParams,
    /// Memory limit in megabytes; zero leaves it unset
    pub memory_mb: u64,
    /// CPU quota in microseconds per period; zero leaves it unset
    pub cpu_quota: i64,
    pub read_only_rootfs: bool,
    /// Zero means no timeout beyond the caller's context
    pub timeout: Duration,
}

/// A backend that can run one tool call in isolation
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run one tool call and return the worker's result
    async fn run(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<ExecutionResult>;

    /// Release resources held for `container_id`.
    ///
    /// An empty ID asks the backend to reclaim everything it left behind,
    /// e.g. after the orchestrator crashed.
    async fn cleanup(&self, ctx: &ExecContext, container_id: &str) -> SandboxResult<()>;

    /// Whether the backend can be used right now
    async fn is_available(&self, ctx: &ExecContext) -> bool;

    fn name(&self) -> &'static str;
}

/// A backend whose containers can be created ahead of the call that uses them
#[async_trait]
pub trait PrewarmRuntime: ContainerRuntime {
    /// Create a container without starting it.
    ///
    /// A container whose creation outlives `ctx` is removed, never leaked.
    async fn create_warm(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<String>;

    /// Drive a pre-created container through one tool call, then remove it
    async fn run_in(
        &self,
        ctx: &ExecContext,
        container_id: &str,
        config: &ContainerConfig,
    ) -> SandboxResult<ExecutionResult>;
}

/// Derive the context a single run is bound by
pub(crate) fn run_context(ctx: &ExecContext, timeout: Duration) -> ExecContext {
    if timeout.is_zero() {
        ctx.clone()
    } else {
        ctx.with_timeout(timeout)
    }
}
