//! Subprocess executor
//!
//! Re-executes the current binary in worker mode with a stripped environment
//! and talks to it over stdin/stdout. The child sees only `PATH` and `HOME`,
//! so credentials held in the parent's environment never reach tool code.

use super::context::ExecContext;
use super::exceptions::{SandboxError, SandboxResult};
use super::executor::Executor;
use super::protocol::{ExecutionRequest, ExecutionResult, ToolOutput, ToolParams, WORKER_MODE_FLAG};
use crate::config::IsolationConfig;
use crate::utils::string::stderr_excerpt;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The only parent environment variables an isolated process receives
pub const ALLOWED_ENV_VARS: [&str; 2] = ["PATH", "HOME"];

/// Build the clean environment for an isolated process.
///
/// Contains at most `PATH` and `HOME`, copied from the current process.
pub fn clean_environment() -> Vec<(String, String)> {
    ALLOWED_ENV_VARS
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect()
}

/// Command that starts `program` in worker mode with the clean environment
pub fn worker_command(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(WORKER_MODE_FLAG)
        .env_clear()
        .envs(clean_environment())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Runs each tool call in a fresh worker process
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    config: IsolationConfig,
}

impl SubprocessExecutor {
    pub fn new(config: IsolationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    fn resolve_program(&self) -> SandboxResult<PathBuf> {
        match &self.config.worker_program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(SandboxError::ResolveExecutable),
        }
    }

    /// Spawn the worker, feed it `body` and collect its output
    async fn run_worker(&self, program: &Path, tool_name: &str, body: Vec<u8>) -> SandboxResult<Output> {
        let mut child = worker_command(program)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                tool: tool_name.to_string(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| SandboxError::Io {
            tool: tool_name.to_string(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin not captured"),
        })?;

        let write = async move {
            stdin.write_all(&body).await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = output.map_err(|source| SandboxError::Io {
            tool: tool_name.to_string(),
            source,
        })?;

        // A worker that exits before reading its input closes the pipe; its
        // exit status tells the rest of the story.
        if let Err(source) = written {
            if source.kind() != io::ErrorKind::BrokenPipe {
                return Err(SandboxError::Io {
                    tool: tool_name.to_string(),
                    source,
                });
            }
        }

        Ok(output)
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn execute(
        &self,
        ctx: &ExecContext,
        tool_name: &str,
        params: ToolParams,
    ) -> SandboxResult<ToolOutput> {
        let ctx = if self.config.timeout_per_tool.is_zero() {
            ctx.clone()
        } else {
            ctx.with_timeout(self.config.timeout_per_tool)
        };

        if let Some(err) = ctx.err() {
            return Err(SandboxError::from_context(err, tool_name));
        }

        let program = self.resolve_program()?;

        let request = ExecutionRequest::new(tool_name, params);
        let body = serde_json::to_vec(&request).map_err(|source| SandboxError::Encode {
            tool: tool_name.to_string(),
            source,
        })?;

        tracing::debug!(
            tool = tool_name,
            program = %program.display(),
            "Launching sandbox worker"
        );
        let started = Instant::now();

        // Losing this race drops the worker future, and kill_on_drop takes the
        // child down with it.
        let output = tokio::select! {
            output = self.run_worker(&program, tool_name, body) => output?,
            err = ctx.done() => {
                tracing::warn!(tool = tool_name, reason = %err, "Sandbox worker aborted");
                return Err(SandboxError::from_context(err, tool_name));
            }
        };

        tracing::debug!(
            tool = tool_name,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sandbox worker finished"
        );

        decode_worker_output(tool_name, &output)?
            .into_output()
            .map_err(|message| SandboxError::Tool {
                tool: tool_name.to_string(),
                message,
            })
    }
}

/// Turn a finished worker's output into its result.
///
/// A non-zero exit is reported as a timeout-class failure; if the worker still
/// managed to report an error message, that message is kept.
fn decode_worker_output(tool_name: &str, output: &Output) -> SandboxResult<ExecutionResult> {
    let decoded = serde_json::from_slice::<ExecutionResult>(&output.stdout);

    if !output.status.success() {
        let mut stderr = stderr_excerpt(&output.stderr);
        if let Ok(ExecutionResult {
            error: Some(message),
            ..
        }) = &decoded
        {
            stderr = if stderr.is_empty() {
                message.clone()
            } else {
                format!("{} ({})", message, stderr)
            };
        }
        return Err(SandboxError::WorkerExited {
            tool: tool_name.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    decoded.map_err(|source| SandboxError::MalformedOutput {
        tool: tool_name.to_string(),
        source,
        stderr: stderr_excerpt(&output.stderr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clean_environment_only_path_and_home() {
        let env = clean_environment();
        assert!(env.len() <= 2);
        for (key, _) in &env {
            assert!(key == "PATH" || key == "HOME", "unexpected variable {}", key);
        }
    }

    #[test]
    fn test_worker_command_strips_environment() {
        std::env::set_var("SANDBOX_TEST_SECRET", "hunter2");

        let cmd = worker_command(Path::new("/usr/bin/true"));
        let std_cmd = cmd.as_std();

        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec![WORKER_MODE_FLAG]);

        let envs: Vec<String> = std_cmd
            .get_envs()
            .filter(|(_, value)| value.is_some())
            .map(|(key, _)| key.to_string_lossy().into_owned())
            .collect();
        assert!(envs.len() <= 2);
        assert!(envs.iter().all(|k| k == "PATH" || k == "HOME"));
        assert!(!envs.iter().any(|k| k == "SANDBOX_TEST_SECRET"));
    }

    #[tokio::test]
    async fn test_expired_context_is_timeout() {
        let executor = SubprocessExecutor::new(IsolationConfig::default());
        let ctx = ExecContext::background().with_timeout(Duration::ZERO);

        let err = executor
            .execute(&ctx, "exec", ToolParams::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_context_is_not_timeout() {
        let executor = SubprocessExecutor::new(IsolationConfig::default());
        let ctx = ExecContext::background();
        ctx.cancel();

        let err = executor
            .execute(&ctx, "exec", ToolParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_missing_worker_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = IsolationConfig::default().with_worker_program(dir.path().join("missing"));
        let executor = SubprocessExecutor::new(config);

        let err = executor
            .execute(&ExecContext::background(), "exec", ToolParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Spawn { ref tool, .. } if tool == "exec"));
    }

    #[cfg(unix)]
    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_decode_success_and_tool_error() {
        let result = decode_worker_output("exec", &output(0, r#"{"output":{"n":1}}"#, "")).unwrap();
        assert_eq!(result.output.unwrap()["n"], 1);

        let result = decode_worker_output("exec", &output(0, r#"{"error":"no such file"}"#, "")).unwrap();
        assert!(result.is_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_decode_non_zero_exit_keeps_message() {
        let err = decode_worker_output(
            "browser",
            &output(3, r#"{"error":"tool not registered: browser"}"#, "warn: x"),
        )
        .unwrap_err();

        assert!(err.is_timeout());
        match err {
            SandboxError::WorkerExited { tool, stderr, .. } => {
                assert_eq!(tool, "browser");
                assert!(stderr.contains("tool not registered"));
                assert!(stderr.contains("warn: x"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_decode_malformed_output() {
        let err = decode_worker_output("exec", &output(0, "not json", "trace")).unwrap_err();
        assert!(matches!(err, SandboxError::MalformedOutput { ref stderr, .. } if stderr == "trace"));
    }
}
