//! Sandboxed tool execution
//!
//! Tool calls go through an [`Executor`]. Three strategies exist:
//!
//! - [`InProcessExecutor`]: calls the handler directly, no isolation.
//! - [`SubprocessExecutor`]: re-runs this binary in worker mode with a clean
//!   environment and exchanges one JSON request/result over stdin/stdout.
//! - [`ContainerExecutor`]: routes through a [`ContainerRuntime`] (Docker,
//!   gVisor or native subprocess), picked once at construction.
//!
//! [`ContainerPool`] keeps pre-warmed container IDs for a single runtime
//! configuration.

pub mod container;
pub mod context;
pub mod exceptions;
pub mod executor;
pub mod pool;
pub mod protocol;
pub mod runtime;
pub mod subprocess;
pub mod worker;

pub use container::ContainerExecutor;
pub use context::{ContextError, ExecContext};
pub use exceptions::{SandboxError, SandboxResult};
pub use executor::{into_output, Executor, InProcessExecutor, ToolHandler, ToolRegistry, RESULT_KEY};
pub use pool::ContainerPool;
pub use protocol::{
    ExecutionRequest, ExecutionResult, ToolOutput, ToolParams, PROTOCOL_VERSION, WORKER_MODE_FLAG,
};
pub use runtime::{
    ContainerConfig, ContainerRuntime, DockerRuntime, GvisorRuntime, NativeRuntime, PrewarmRuntime,
    SweepScope,
};
pub use subprocess::{clean_environment, SubprocessExecutor, ALLOWED_ENV_VARS};
pub use worker::{is_worker_invocation, run_worker, serve_stdio, WorkerOutcome};

use crate::config::Settings;
use std::sync::Arc;

/// Build the executor the settings ask for.
///
/// With isolation disabled tools run in-process from `registry`. Otherwise
/// calls go through a [`ContainerExecutor`], and the registry is only
/// consulted by the worker on the far side.
///
/// Call [`Executor::shutdown`] once the executor is no longer needed so
/// pre-created containers are removed.
pub async fn build_executor(
    settings: &Settings,
    registry: Arc<ToolRegistry>,
) -> SandboxResult<Arc<dyn Executor>> {
    if !settings.isolation.enabled {
        tracing::info!(tools = registry.len(), "Sandbox disabled, running tools in-process");
        return Ok(Arc::new(InProcessExecutor::from_registry(registry)));
    }

    let executor =
        ContainerExecutor::new(settings.isolation.clone(), settings.container.clone()).await?;
    Ok(Arc::new(executor))
}
