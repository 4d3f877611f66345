//! gVisor runtime slot.
//!
//! Not implemented: never available, and `run` always fails. It keeps a named
//! place in the selection order so a real backend can drop in later.

use super::{ContainerConfig, ContainerRuntime};
use crate::services::sandbox::context::ExecContext;
use crate::services::sandbox::exceptions::{SandboxError, SandboxResult};
use crate::services::sandbox::protocol::ExecutionResult;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct GvisorRuntime;

impl GvisorRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for GvisorRuntime {
    async fn run(&self, _ctx: &ExecContext, _config: &ContainerConfig) -> SandboxResult<ExecutionResult> {
        Err(SandboxError::RuntimeUnavailable(
            "gvisor: runtime not implemented".to_string(),
        ))
    }

    async fn cleanup(&self, _ctx: &ExecContext, _container_id: &str) -> SandboxResult<()> {
        Ok(())
    }

    async fn is_available(&self, _ctx: &ExecContext) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "gvisor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gvisor_is_never_available() {
        let runtime = GvisorRuntime::new();
        let ctx = ExecContext::background();
        assert!(!runtime.is_available(&ctx).await);

        let err = runtime
            .run(&ctx, &ContainerConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_runtime_unavailable());
    }
}
