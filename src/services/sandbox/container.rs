//! Container executor
//!
//! Picks a backend once at construction and routes every call through it.
//!
//! Selection order:
//! 1. `docker` / `auto`: use Docker if the daemon answers. An explicit
//!    `docker` request fails instead of degrading.
//! 2. `gvisor` / `auto`: use gVisor if available (never, today). An explicit
//!    `gvisor` request fails.
//! 3. Otherwise, or once `auto` runs out of candidates: native subprocess.
//!
//! With Docker selected and a non-zero pool size, calls first try a
//! pre-created container from a [`ContainerPool`] and top it up afterwards.
//! Labels are fixed when a container is created, so pooled containers carry
//! `tool-sandbox.tool=warm` rather than the name of the tool they end up
//! serving.

use super::context::ExecContext;
use super::exceptions::{SandboxError, SandboxResult};
use super::executor::Executor;
use super::pool::ContainerPool;
use super::protocol::{ExecutionResult, ToolOutput, ToolParams};
use super::runtime::{
    ContainerConfig, ContainerRuntime, DockerRuntime, GvisorRuntime, NativeRuntime, PrewarmRuntime,
};
use crate::config::{ContainerSandboxConfig, IsolationConfig, RuntimeKind, MAX_MEMORY_MB};
use crate::utils::timeout::{with_timeout, TimeoutConfig};
use async_trait::async_trait;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;

/// Tool name recorded on containers created ahead of any call
const WARM_TOOL_NAME: &str = "warm";

pub struct ContainerExecutor {
    config: IsolationConfig,
    sandbox: ContainerSandboxConfig,
    runtime: Arc<dyn ContainerRuntime>,
    warm: Option<WarmPool>,
}

impl ContainerExecutor {
    pub async fn new(config: IsolationConfig, sandbox: ContainerSandboxConfig) -> SandboxResult<Self> {
        let (runtime, docker) = select_runtime(&config, sandbox.runtime).await?;
        if docker.is_some() {
            validate_for_docker(&config, &sandbox)?;
        }

        tracing::info!(
            requested = %sandbox.runtime,
            runtime = runtime.name(),
            image = %sandbox.image,
            "Sandbox runtime selected"
        );

        let executor = Self {
            config,
            sandbox,
            runtime,
            warm: None,
        };

        match docker {
            Some(docker) if executor.sandbox.pool_size > 0 => Ok(executor.with_warm_pool(docker).await),
            _ => Ok(executor),
        }
    }

    /// Pre-create up to `pool_size` containers on `prewarm` for later calls
    async fn with_warm_pool<R>(mut self, prewarm: Arc<R>) -> Self
    where
        R: PrewarmRuntime + 'static,
    {
        let template = self.container_config(WARM_TOOL_NAME, ToolParams::new());
        let warm = WarmPool::new(prewarm, template, self.sandbox.pool_size);
        warm.fill(&ExecContext::background()).await;
        self.warm = Some(warm);
        self
    }

    /// Name of the backend calls are routed to
    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    /// The warm container pool, when one is configured
    pub fn pool(&self) -> Option<&ContainerPool> {
        self.warm.as_ref().map(|warm| warm.pool.as_ref())
    }

    async fn run(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<ExecutionResult> {
        if let Some(warm) = &self.warm {
            if let Some(err) = ctx.err() {
                return Err(SandboxError::from_context(err, &config.tool_name));
            }
            match warm.pool.acquire(ctx) {
                Ok(Some(container_id)) => {
                    warm.replenish();
                    return warm.runtime.run_in(ctx, &container_id, config).await;
                }
                Ok(None) | Err(SandboxError::PoolClosed) => {}
                Err(e) => return Err(e),
            }
        }

        self.runtime.run(ctx, config).await
    }

    fn container_config(&self, tool_name: &str, params: ToolParams) -> ContainerConfig {
        ContainerConfig {
            image: self.sandbox.image.clone(),
            tool_name: tool_name.to_string(),
            network_mode: self.sandbox.network_mode.clone(),
            params,
            memory_mb: self.config.max_memory_mb,
            cpu_quota: self.sandbox.cpu_quota,
            read_only_rootfs: self.sandbox.read_only_rootfs,
            timeout: self.config.timeout_per_tool,
        }
    }
}

/// Settings the Docker backend cannot run without
fn validate_for_docker(config: &IsolationConfig, sandbox: &ContainerSandboxConfig) -> SandboxResult<()> {
    if sandbox.image.trim().is_empty() {
        return Err(SandboxError::InvalidConfig(
            "container image must not be empty".to_string(),
        ));
    }
    if config.max_memory_mb > MAX_MEMORY_MB {
        return Err(SandboxError::InvalidConfig(format!(
            "memory limit of {} MB exceeds {} MB",
            config.max_memory_mb, MAX_MEMORY_MB
        )));
    }
    Ok(())
}

/// Pre-created containers for one executor's image and limits
struct WarmPool {
    runtime: Arc<dyn PrewarmRuntime>,
    pool: Arc<ContainerPool>,
    template: ContainerConfig,
    /// In-flight top-ups, waited for on close
    refills: Mutex<JoinSet<()>>,
    settle_timeout: Duration,
}

impl WarmPool {
    fn new<R>(runtime: Arc<R>, template: ContainerConfig, capacity: usize) -> Self
    where
        R: PrewarmRuntime + 'static,
    {
        let cleanup: Arc<dyn ContainerRuntime> = runtime.clone();
        let runtime: Arc<dyn PrewarmRuntime> = runtime;
        let settle_timeout = TimeoutConfig::default().cleanup_timeout;

        Self {
            runtime,
            pool: Arc::new(ContainerPool::new(cleanup, capacity).with_cleanup_timeout(settle_timeout)),
            template,
            refills: Mutex::new(JoinSet::new()),
            settle_timeout,
        }
    }

    fn refills(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.refills.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create containers until the pool is full or creation fails
    async fn fill(&self, ctx: &ExecContext) {
        for _ in self.pool.size()..self.pool.capacity() {
            match self.runtime.create_warm(ctx, &self.template).await {
                Ok(container_id) => self.pool.release(container_id).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to pre-create sandbox container");
                    break;
                }
            }
        }

        tracing::info!(
            warm = self.pool.size(),
            capacity = self.pool.capacity(),
            "Sandbox container pool filled"
        );
    }

    /// Create one container in the background to replace a used one
    fn replenish(&self) {
        let runtime = Arc::clone(&self.runtime);
        let pool = Arc::clone(&self.pool);
        let template = self.template.clone();
        let cleanup_timeout = self.settle_timeout;

        let mut refills = self.refills();
        while refills.try_join_next().is_some() {}

        refills.spawn(async move {
            let ctx = ExecContext::background();
            let container_id = match runtime.create_warm(&ctx, &template).await {
                Ok(container_id) => container_id,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to replenish sandbox container pool");
                    return;
                }
            };

            // The pool closed while the container was being created
            if let Some(late) = pool.offer(container_id).await {
                let ctx = ctx.with_timeout(cleanup_timeout);
                if let Err(e) = with_timeout(cleanup_timeout, runtime.cleanup(&ctx, &late)).await {
                    tracing::warn!(container_id = %late, error = %e, "Failed to remove late sandbox container");
                }
            }
        });
    }

    /// Wait for in-flight top-ups, aborting any still running after the
    /// settle timeout
    async fn settle(&self) {
        let mut refills = std::mem::take(&mut *self.refills());
        let pending = refills.len();

        let drained = with_timeout(self.settle_timeout, async {
            while refills.join_next().await.is_some() {}
            Ok::<(), Infallible>(())
        })
        .await;

        if let Err(e) = drained {
            if e.is_timeout() {
                tracing::warn!(pending, error = %e, "Sandbox pool top-ups did not finish, aborting them");
                refills.abort_all();
            }
        }
    }

    /// Stop topping up, then remove every pooled container
    async fn close(&self) {
        self.settle().await;
        self.pool.close().await;
    }
}

type Selected = (Arc<dyn ContainerRuntime>, Option<Arc<DockerRuntime>>);

async fn select_runtime(config: &IsolationConfig, requested: RuntimeKind) -> SandboxResult<Selected> {
    let ctx = ExecContext::background();

    if matches!(requested, RuntimeKind::Docker | RuntimeKind::Auto) {
        match DockerRuntime::connect() {
            Ok(docker) if docker.is_available(&ctx).await => {
                let docker = Arc::new(docker);
                let runtime: Arc<dyn ContainerRuntime> = docker.clone();
                return Ok((runtime, Some(docker)));
            }
            Ok(_) if requested == RuntimeKind::Docker => {
                return Err(SandboxError::RuntimeUnavailable(
                    "docker: daemon did not answer ping".to_string(),
                ));
            }
            Err(e) if requested == RuntimeKind::Docker => return Err(e),
            Ok(_) => tracing::debug!("Docker daemon not reachable, trying next runtime"),
            Err(e) => tracing::debug!(error = %e, "Docker unavailable, trying next runtime"),
        }
    }

    if matches!(requested, RuntimeKind::Gvisor | RuntimeKind::Auto) {
        let gvisor = GvisorRuntime::new();
        if gvisor.is_available(&ctx).await {
            let runtime: Arc<dyn ContainerRuntime> = Arc::new(gvisor);
            return Ok((runtime, None));
        }
        if requested == RuntimeKind::Gvisor {
            return Err(SandboxError::RuntimeUnavailable(
                "gvisor: runtime not implemented".to_string(),
            ));
        }
        tracing::debug!("gVisor unavailable, falling back to native subprocess");
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(NativeRuntime::new(config.clone()));
    Ok((runtime, None))
}

#[async_trait]
impl Executor for ContainerExecutor {
    async fn execute(
        &self,
        ctx: &ExecContext,
        tool_name: &str,
        params: ToolParams,
    ) -> SandboxResult<ToolOutput> {
        let config = self.container_config(tool_name, params);

        self.run(ctx, &config)
            .await?
            .into_output()
            .map_err(|message| SandboxError::Tool {
                tool: tool_name.to_string(),
                message,
            })
    }

    /// Close the warm pool and remove its containers
    async fn shutdown(&self) {
        if let Some(warm) = &self.warm {
            warm.close().await;
        }
    }
}
