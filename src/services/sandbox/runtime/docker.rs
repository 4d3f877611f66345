//! Docker runtime
//!
//! Runs each tool call in a throwaway container whose entrypoint is this
//! binary in worker mode. The request goes in over the attached stdin and the
//! result comes back over the attached stdout.

use super::frames::parse_container_output;
use super::{run_context, ContainerConfig, ContainerRuntime, PrewarmRuntime};
use crate::services::sandbox::context::ExecContext;
use crate::services::sandbox::exceptions::{SandboxError, SandboxResult};
use crate::services::sandbox::protocol::{ExecutionRequest, ExecutionResult, WORKER_MODE_FLAG};
use crate::utils::string::stderr_excerpt;
use crate::utils::timeout::{with_timeout, TimeoutConfig};
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

// ============================================================================
// Constants
// ============================================================================

/// Label carried by every sandbox container
pub const SANDBOX_LABEL: &str = "tool-sandbox.managed";

/// Label naming the tool a container was created for
pub const TOOL_LABEL: &str = "tool-sandbox.tool";

/// Container name prefix
const CONTAINER_NAME_PREFIX: &str = "tool-sandbox";

/// CPU period the quota is measured against (100ms)
pub const DEFAULT_CPU_PERIOD: i64 = 100_000;

/// 128 + SIGKILL: how Docker reports a container killed for exceeding its memory
const OOM_EXIT_STATUS: i64 = 137;

/// Mount options for the scratch /tmp
const TMPFS_OPTIONS: &str = "rw,nosuid,size=64m";

// ============================================================================
// Docker Runtime
// ============================================================================

/// Docker-backed container runtime
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
    /// Side-operation timeouts
    timeouts: TimeoutConfig,
}

impl DockerRuntime {
    /// Create a client for the local daemon with default timeouts.
    ///
    /// This does not contact the daemon; use [`ContainerRuntime::is_available`].
    pub fn connect() -> SandboxResult<Self> {
        Self::with_timeouts(TimeoutConfig::default())
    }

    pub fn with_timeouts(timeouts: TimeoutConfig) -> SandboxResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::RuntimeUnavailable(format!("docker: {}", e)))?;

        Ok(Self { docker, timeouts })
    }

    /// Get Docker version info
    pub async fn version(&self) -> SandboxResult<String> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| SandboxError::RuntimeUnavailable(format!("docker: {}", e)))?;

        Ok(format!(
            "Docker {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        ))
    }

    // ========================================================================
    // Container Lifecycle
    // ========================================================================

    /// attach → start → write → close-write → read → wait
    async fn drive(&self, container_id: &str, config: &ContainerConfig) -> SandboxResult<ExecutionResult> {
        let tool = config.tool_name.as_str();

        let request = ExecutionRequest::new(tool, config.params.clone());
        let body = serde_json::to_vec(&request).map_err(|source| SandboxError::Encode {
            tool: tool.to_string(),
            source,
        })?;

        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(false),
            detach_keys: None,
        };
        let AttachContainerResults {
            mut output,
            mut input,
        } = self
            .docker
            .attach_container(container_id, Some(options))
            .await
            .map_err(docker_error(tool, "attach"))?;

        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_error(tool, "start"))?;

        let io_error = |source| SandboxError::Io {
            tool: tool.to_string(),
            source,
        };
        input.write_all(&body).await.map_err(io_error)?;
        input.shutdown().await.map_err(io_error)?;
        drop(input);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = output.next().await {
            match chunk.map_err(docker_error(tool, "read"))? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.extend_from_slice(&message);
                }
                LogOutput::StdErr { message } => {
                    stderr.extend_from_slice(&message);
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        let status = self.wait_container(container_id, tool).await?;
        interpret_exit(tool, status, &stdout, &stderr)
    }

    /// Wait until the container is no longer running and return its exit status
    async fn wait_container(&self, container_id: &str, tool: &str) -> SandboxResult<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut waits = Box::pin(self.docker.wait_container(container_id, Some(options)));

        match waits.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits arrive as errors
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(docker_error(tool, "wait")(e)),
            None => Err(SandboxError::WorkerFailed {
                tool: tool.to_string(),
                status: "unknown".to_string(),
                stderr: "container wait returned no status".to_string(),
            }),
        }
    }

    /// Force-remove a container
    async fn remove_container(&self, container_id: &str) -> Result<(), BollardError> {
        remove_container(&self.docker, container_id).await
    }

    /// Remove labelled sandbox containers in `scope`.
    ///
    /// [`SweepScope::Stopped`] is safe while calls are in flight.
    /// [`SweepScope::All`] also takes down running and pooled containers and
    /// is meant for recovery when no orchestrator is using the daemon.
    pub async fn sweep(&self, scope: SweepScope) -> SandboxResult<usize> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}=true", SANDBOX_LABEL)]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(docker_error("*", "list"))?;

        let mut removed = 0;
        for container in containers {
            if !is_sweepable(scope, container.state.as_deref()) {
                continue;
            }
            let Some(id) = container.id else {
                continue;
            };
            match self.remove_container(&id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(container_id = %id, error = %e, "Failed to sweep sandbox container");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, scope = ?scope, "Swept orphaned sandbox containers");
        }

        Ok(removed)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<ExecutionResult> {
        let ctx = run_context(ctx, config.timeout);
        if let Some(err) = ctx.err() {
            return Err(SandboxError::from_context(err, &config.tool_name));
        }

        let container_id = self.create_warm(&ctx, config).await?;
        self.run_in(&ctx, &container_id, config).await
    }

    /// Remove `container_id` and sweep stopped containers.
    ///
    /// An empty ID sweeps every labelled container instead.
    async fn cleanup(&self, ctx: &ExecContext, container_id: &str) -> SandboxResult<()> {
        let work = async {
            if container_id.is_empty() {
                return self.sweep(SweepScope::All).await.map(|_| ());
            }
            match self.remove_container(container_id).await {
                Ok(()) | Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {}
                Err(e) => return Err(docker_error("*", "remove")(e)),
            }
            self.sweep(SweepScope::Stopped).await.map(|_| ())
        };

        tokio::select! {
            result = work => result,
            err = ctx.done() => Err(SandboxError::Context(err)),
        }
    }

    async fn is_available(&self, ctx: &ExecContext) -> bool {
        tokio::select! {
            ping = with_timeout(self.timeouts.docker_ping_timeout, self.docker.ping()) => match ping {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "Docker daemon not reachable");
                    false
                }
            },
            _ = ctx.done() => false,
        }
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

#[async_trait]
impl PrewarmRuntime for DockerRuntime {
    async fn create_warm(&self, ctx: &ExecContext, config: &ContainerConfig) -> SandboxResult<String> {
        if let Some(err) = ctx.err() {
            return Err(SandboxError::from_context(err, &config.tool_name));
        }

        let docker = self.docker.clone();
        let owned = config.clone();
        let mut pending = PendingCreate::spawn(
            async move { create_container(&docker, &owned).await },
            discard_with(self.docker.clone()),
        );

        // Losing the race drops `pending`, which removes the container once
        // its create call returns
        tokio::select! {
            created = pending.wait(&config.tool_name) => created,
            err = ctx.done() => Err(SandboxError::from_context(err, &config.tool_name)),
        }
    }

    async fn run_in(
        &self,
        ctx: &ExecContext,
        container_id: &str,
        config: &ContainerConfig,
    ) -> SandboxResult<ExecutionResult> {
        let tool = config.tool_name.as_str();
        let mut guard = ContainerGuard::new(self.docker.clone(), container_id);
        let ctx = run_context(ctx, config.timeout);
        let started = Instant::now();

        // Dropping the drive future releases the attach connection; the
        // guard or the explicit removal below takes the container down.
        let result = tokio::select! {
            result = self.drive(container_id, config) => result,
            err = ctx.done() => {
                tracing::warn!(tool, container_id, reason = %err, "Sandbox container aborted");
                Err(SandboxError::from_context(err, tool))
            }
        };

        guard.disarm();
        if let Err(e) = self.remove_container(container_id).await {
            tracing::warn!(tool, container_id, error = %e, "Failed to remove sandbox container");
        }

        tracing::debug!(
            tool,
            container_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Sandbox container finished"
        );

        result
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Removes the container if the run is abandoned before cleanup
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: &str) -> Self {
        Self {
            docker,
            container_id: container_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        spawn_removal(self.docker.clone(), std::mem::take(&mut self.container_id));
    }
}

/// Callback that takes ownership of a container nobody is waiting for
type Discard = Arc<dyn Fn(String) + Send + Sync>;

/// A container create call running on its own task.
///
/// The create request always runs to completion. Whoever stops waiting
/// first (the task, finding the receiver gone, or the drop of this handle,
/// finding an unread ID) hands the new container to `discard`.
struct PendingCreate {
    created: oneshot::Receiver<SandboxResult<String>>,
    discard: Discard,
}

impl PendingCreate {
    fn spawn<C>(create: C, discard: Discard) -> Self
    where
        C: Future<Output = SandboxResult<String>> + Send + 'static,
    {
        let (tx, created) = oneshot::channel();
        let orphaned = Arc::clone(&discard);
        tokio::spawn(async move {
            if let Err(Ok(container_id)) = tx.send(create.await) {
                orphaned(container_id);
            }
        });
        Self { created, discard }
    }

    async fn wait(&mut self, tool: &str) -> SandboxResult<String> {
        match (&mut self.created).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::RuntimeUnavailable(format!(
                "docker: create task for {} ended without a result",
                tool
            ))),
        }
    }
}

impl Drop for PendingCreate {
    fn drop(&mut self) {
        self.created.close();
        if let Ok(Ok(container_id)) = self.created.try_recv() {
            (self.discard)(container_id);
        }
    }
}

/// Discard callback that force-removes the container in the background
fn discard_with(docker: Docker) -> Discard {
    Arc::new(move |container_id| {
        tracing::debug!(container_id = %container_id, "Removing container created for an abandoned call");
        spawn_removal(docker.clone(), container_id);
    })
}

/// Force-remove a container on the current runtime without waiting
fn spawn_removal(docker: Docker, container_id: String) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(container_id = %container_id, "No runtime to remove abandoned sandbox container");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = remove_container(&docker, &container_id).await {
            tracing::warn!(container_id = %container_id, error = %e, "Failed to remove abandoned sandbox container");
        }
    });
}

/// Create a labelled, resource-limited container for `config`
async fn create_container(docker: &Docker, config: &ContainerConfig) -> SandboxResult<String> {
    let name = format!("{}-{}", CONTAINER_NAME_PREFIX, uuid::Uuid::new_v4());
    let options = CreateContainerOptions {
        name: name.as_str(),
        platform: None,
    };

    let response = docker
        .create_container(Some(options), build_container_config(config)?)
        .await
        .map_err(docker_error(&config.tool_name, "create"))?;

    tracing::debug!(
        tool = %config.tool_name,
        container_id = %response.id,
        image = %config.image,
        "Created sandbox container"
    );

    Ok(response.id)
}

async fn remove_container(docker: &Docker, container_id: &str) -> Result<(), BollardError> {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    docker.remove_container(container_id, Some(options)).await
}

/// Which labelled containers a sweep removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Exited or dead containers only
    Stopped,
    /// Every labelled container, whatever its state
    All,
}

fn is_sweepable(scope: SweepScope, state: Option<&str>) -> bool {
    match scope {
        SweepScope::Stopped => matches!(state, Some("exited") | Some("dead")),
        SweepScope::All => true,
    }
}

fn docker_error<'a>(tool: &'a str, stage: &'static str) -> impl FnOnce(BollardError) -> SandboxError + 'a {
    move |source| SandboxError::Docker {
        tool: tool.to_string(),
        stage,
        source,
    }
}

/// Memory limit in bytes, or `None` when unset
pub(crate) fn memory_limit_bytes(memory_mb: u64) -> SandboxResult<Option<i64>> {
    if memory_mb == 0 {
        return Ok(None);
    }
    memory_mb
        .checked_mul(1024 * 1024)
        .and_then(|bytes| i64::try_from(bytes).ok())
        .map(Some)
        .ok_or_else(|| {
            SandboxError::InvalidConfig(format!("memory limit of {} MB is too large", memory_mb))
        })
}

/// Container settings for one sandboxed call
pub(crate) fn build_container_config(config: &ContainerConfig) -> SandboxResult<Config<String>> {
    let mut labels = HashMap::new();
    labels.insert(SANDBOX_LABEL.to_string(), "true".to_string());
    labels.insert(TOOL_LABEL.to_string(), config.tool_name.clone());

    let memory = memory_limit_bytes(config.memory_mb)?;
    let limit_cpu = config.cpu_quota > 0;

    let host_config = HostConfig {
        memory,
        // Same as memory: no swap on top of the limit
        memory_swap: memory,
        cpu_period: limit_cpu.then_some(DEFAULT_CPU_PERIOD),
        cpu_quota: limit_cpu.then_some(config.cpu_quota),
        network_mode: (!config.network_mode.is_empty()).then(|| config.network_mode.clone()),
        readonly_rootfs: Some(config.read_only_rootfs),
        tmpfs: Some(HashMap::from([("/tmp".to_string(), TMPFS_OPTIONS.to_string())])),
        security_opt: Some(vec!["no-new-privileges".to_string()]),
        cap_drop: Some(vec!["ALL".to_string()]),
        ..Default::default()
    };

    Ok(Config {
        image: Some(config.image.clone()),
        cmd: Some(vec![WORKER_MODE_FLAG.to_string()]),
        labels: Some(labels),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(true),
        // stdin closes when the attach connection goes away
        stdin_once: Some(true),
        tty: Some(false),
        network_disabled: Some(config.network_mode == "none"),
        host_config: Some(host_config),
        ..Default::default()
    })
}

/// Map a finished container's exit status and output to a result
pub(crate) fn interpret_exit(
    tool: &str,
    status: i64,
    stdout: &[u8],
    stderr: &[u8],
) -> SandboxResult<ExecutionResult> {
    if status == OOM_EXIT_STATUS {
        return Err(SandboxError::ContainerOom {
            tool: tool.to_string(),
        });
    }

    match parse_container_output(stdout) {
        Ok(result) => {
            if status != 0 {
                tracing::debug!(tool, status, "Sandbox container exited non-zero with a result");
            }
            Ok(result)
        }
        Err(_) if status != 0 => Err(SandboxError::WorkerFailed {
            tool: tool.to_string(),
            status: format!("exit status {}", status),
            stderr: stderr_excerpt(stderr),
        }),
        Err(source) => Err(SandboxError::MalformedOutput {
            tool: tool.to_string(),
            source,
            stderr: stderr_excerpt(stderr),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn sample_config() -> ContainerConfig {
        ContainerConfig {
            image: "tool-sandbox:test".to_string(),
            tool_name: "browser".to_string(),
            network_mode: "none".to_string(),
            params: json!({"url": "https://example.com"}).as_object().unwrap().clone(),
            memory_mb: 128,
            cpu_quota: 25_000,
            read_only_rootfs: true,
            timeout: Duration::from_secs(30),
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![1, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_container_config_labels_and_command() {
        let config = build_container_config(&sample_config()).unwrap();
        let labels = config.labels.unwrap();
        assert_eq!(labels[SANDBOX_LABEL], "true");
        assert_eq!(labels[TOOL_LABEL], "browser");
        assert_eq!(config.cmd.unwrap(), vec![WORKER_MODE_FLAG.to_string()]);
        assert_eq!(config.image.as_deref(), Some("tool-sandbox:test"));
        assert_eq!(config.open_stdin, Some(true));
        assert_eq!(config.stdin_once, Some(true));
        assert_eq!(config.tty, Some(false));
        assert!(config.env.is_none());
    }

    #[test]
    fn test_container_config_limits() {
        let host = build_container_config(&sample_config()).unwrap().host_config.unwrap();
        assert_eq!(host.memory, Some(128 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.cpu_quota, Some(25_000));
        assert_eq!(host.cpu_period, Some(DEFAULT_CPU_PERIOD));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert!(host.tmpfs.unwrap().contains_key("/tmp"));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
    }

    #[test]
    fn test_container_config_without_limits() {
        let mut config = sample_config();
        config.memory_mb = 0;
        config.cpu_quota = 0;
        config.network_mode = String::new();
        config.read_only_rootfs = false;

        let built = build_container_config(&config).unwrap();
        assert_eq!(built.network_disabled, Some(false));
        let host = built.host_config.unwrap();
        assert!(host.memory.is_none());
        assert!(host.cpu_quota.is_none());
        assert!(host.cpu_period.is_none());
        assert!(host.network_mode.is_none());
        assert_eq!(host.readonly_rootfs, Some(false));
    }

    #[test]
    fn test_oversized_memory_limit_is_invalid_config() {
        assert_eq!(memory_limit_bytes(0).unwrap(), None);
        assert_eq!(memory_limit_bytes(1).unwrap(), Some(1024 * 1024));

        let largest = (i64::MAX as u64) / (1024 * 1024);
        assert_eq!(memory_limit_bytes(largest).unwrap(), Some((largest * 1024 * 1024) as i64));

        for memory_mb in [largest + 1, u64::MAX / 1024, u64::MAX] {
            let err = memory_limit_bytes(memory_mb).unwrap_err();
            assert!(matches!(err, SandboxError::InvalidConfig(_)), "{memory_mb}: {err}");
        }

        let mut config = sample_config();
        config.memory_mb = u64::MAX;
        assert!(matches!(
            build_container_config(&config),
            Err(SandboxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stopped_sweep_leaves_running_and_pooled_containers() {
        let scope = SweepScope::Stopped;
        assert!(is_sweepable(scope, Some("exited")));
        assert!(is_sweepable(scope, Some("dead")));
        assert!(!is_sweepable(scope, Some("running")));
        assert!(!is_sweepable(scope, Some("created")));
        assert!(!is_sweepable(scope, None));
    }

    #[test]
    fn test_full_sweep_takes_every_state() {
        for state in [Some("exited"), Some("running"), Some("created"), Some("paused"), None] {
            assert!(is_sweepable(SweepScope::All, state), "{state:?}");
        }
    }

    fn recording_discard() -> (Discard, Arc<std::sync::Mutex<Vec<String>>>) {
        let discarded = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&discarded);
        let discard: Discard = Arc::new(move |id| sink.lock().unwrap().push(id));
        (discard, discarded)
    }

    async fn slow_create(delay: Duration) -> SandboxResult<String> {
        tokio::time::sleep(delay).await;
        Ok("c-1".to_string())
    }

    #[tokio::test]
    async fn test_awaited_create_keeps_container() {
        let (discard, discarded) = recording_discard();
        let mut pending = PendingCreate::spawn(slow_create(Duration::from_millis(10)), discard);

        assert_eq!(pending.wait("exec").await.unwrap(), "c-1");
        drop(pending);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(discarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_abandoned_mid_flight_is_discarded() {
        let (discard, discarded) = recording_discard();
        let pending = PendingCreate::spawn(slow_create(Duration::from_millis(50)), discard);

        // The caller gives up while the create call is still running
        drop(pending);
        assert!(discarded.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*discarded.lock().unwrap(), vec!["c-1"]);
    }

    #[tokio::test]
    async fn test_unread_container_id_is_discarded_on_drop() {
        let (discard, discarded) = recording_discard();
        let pending = PendingCreate::spawn(slow_create(Duration::ZERO), discard);

        // The ID is delivered but never read
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(pending);
        assert_eq!(*discarded.lock().unwrap(), vec!["c-1"]);
    }

    #[tokio::test]
    async fn test_failed_create_discards_nothing() {
        let (discard, discarded) = recording_discard();
        let pending = PendingCreate::spawn(
            async { Err(SandboxError::RuntimeUnavailable("docker: no such image".to_string())) },
            discard,
        );

        drop(pending);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(discarded.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exit_137_is_oom() {
        let err = interpret_exit("exec", 137, br#"{"output":{}}"#, b"Killed").unwrap_err();
        assert!(err.is_oom());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_exit_zero_decodes_plain_and_framed() {
        let result = interpret_exit("exec", 0, br#"{"output":{"n":1}}"#, b"").unwrap();
        assert_eq!(result.output.unwrap()["n"], 1);

        let result = interpret_exit("exec", 0, &frame(br#"{"error":"bad path"}"#), b"").unwrap();
        assert_eq!(result.error.as_deref(), Some("bad path"));
    }

    #[test]
    fn test_non_zero_exit_is_decided_by_output() {
        let result = interpret_exit("browser", 3, br#"{"error":"tool not registered: browser"}"#, b"")
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("tool not registered: browser"));

        let err = interpret_exit("exec", 1, b"", b"exec format error").unwrap_err();
        match err {
            SandboxError::WorkerFailed { status, stderr, .. } => {
                assert_eq!(status, "exit status 1");
                assert_eq!(stderr, "exec format error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_output_is_malformed() {
        let err = interpret_exit("exec", 0, b"hello", b"").unwrap_err();
        assert!(matches!(err, SandboxError::MalformedOutput { .. }));
    }
}
