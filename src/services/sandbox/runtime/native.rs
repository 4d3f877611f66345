//! Native runtime: the subprocess executor behind the container contract.
//!
//! Always available. There is nothing to clean up since each worker process
//! is reaped when its call finishes.

use super::{run_context, ContainerConfig, ContainerRuntime};
use crate::config::IsolationConfig;
use crate::services::sandbox::context::ExecContext;
use crate::services::sandbox::exceptions::{SandboxError, SandboxResult};
use crate::services::sandbox::executor::Executor;
use crate::services::sandbox::protocol::ExecutionResult;
use crate::services::sandbox::subprocess::SubprocessExecutor;
use async_trait::async_trait;
use std::time::Duration;

pub struct NativeRuntime {
    executor: SubprocessExecutor,
}

impl NativeRuntime {
    /// The per-call timeout comes from each [`ContainerConfig`], so the
    /// executor's own timeout is switched off.
    pub fn new(config: IsolationConfig) -> Self {
        Self {
            executor: SubprocessExecutor::new(config.with_timeout(Duration::ZERO)),
        }
    }
}

#[async_trait]
impl ContainerRuntime for NativeRuntime {
    async fn run(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<ExecutionResult> {
        let ctx = run_context(ctx, config.timeout);

        match self
            .executor
            .execute(&ctx, &config.tool_name, config.params.clone())
            .await
        {
            Ok(output) => Ok(ExecutionResult::success(output)),
            Err(SandboxError::Tool { message, .. }) => Ok(ExecutionResult::failure(message)),
            Err(e) => Err(e),
        }
    }

    async fn cleanup(&self, _ctx: &ExecContext, _container_id: &str) -> SandboxResult<()> {
        Ok(())
    }

    async fn is_available(&self, _ctx: &ExecContext) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sandbox::protocol::ToolParams;

    #[tokio::test]
    async fn test_native_always_available() {
        let runtime = NativeRuntime::new(IsolationConfig::default());
        let ctx = ExecContext::background();
        assert!(runtime.is_available(&ctx).await);
        assert!(runtime.cleanup(&ctx, "anything").await.is_ok());
        assert_eq!(runtime.name(), "native");
    }

    #[tokio::test]
    async fn test_native_expired_context_is_timeout() {
        let runtime = NativeRuntime::new(IsolationConfig::default());
        let config = ContainerConfig {
            tool_name: "exec".to_string(),
            params: ToolParams::new(),
            timeout: Duration::from_secs(30),
            ..Default::default()
        };

        let ctx = ExecContext::background().with_timeout(Duration::ZERO);
        let err = runtime.run(&ctx, &config).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
