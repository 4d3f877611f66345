//! Worker-mode entry point
//!
//! When the binary is started with [`WORKER_MODE_FLAG`] it serves exactly one
//! request: decode it from stdin, dispatch to the registered handler, write
//! the result to stdout and exit.
//!
//! Protocol failures (bad request, unknown tool) exit non-zero. A failing
//! tool is a *successful* protocol exchange: exit code 0 with `error` set.
//! That split lets the orchestrator tell broken sandbox machinery apart from
//! a tool that simply failed.

use super::context::ExecContext;
use super::executor::{into_output, ToolRegistry};
use super::protocol::{ExecutionRequest, ExecutionResult, PROTOCOL_VERSION, WORKER_MODE_FLAG};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// How a worker invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The exchange completed; the tool may still have reported an error
    Completed,
    /// The request could not be decoded or has an unsupported version
    BadRequest,
    /// No handler is registered under the requested name
    UnknownTool,
    /// The result could not be written back
    OutputFailed,
}

impl WorkerOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            WorkerOutcome::Completed => 0,
            WorkerOutcome::BadRequest => 2,
            WorkerOutcome::UnknownTool => 3,
            WorkerOutcome::OutputFailed => 4,
        }
    }
}

/// Whether the process arguments ask for worker mode.
///
/// The first item is the program name and is ignored.
pub fn is_worker_invocation<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().skip(1).any(|arg| arg.as_ref() == WORKER_MODE_FLAG)
}

/// Serve one request read from `input`, writing the result to `output`
pub async fn run_worker<R, W>(registry: &ToolRegistry, mut input: R, mut output: W) -> WorkerOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    if let Err(e) = input.read_to_end(&mut raw).await {
        let result = ExecutionResult::failure(format!("failed to read request: {}", e));
        return finish(&mut output, &result, WorkerOutcome::BadRequest).await;
    }

    let request: ExecutionRequest = match serde_json::from_slice(&raw) {
        Ok(request) => request,
        Err(e) => {
            let result = ExecutionResult::failure(format!("invalid request: {}", e));
            return finish(&mut output, &result, WorkerOutcome::BadRequest).await;
        }
    };

    if !request.is_supported() {
        let result = ExecutionResult::failure(format!(
            "unsupported protocol version {} (worker speaks {})",
            request.version, PROTOCOL_VERSION
        ));
        return finish(&mut output, &result, WorkerOutcome::BadRequest).await;
    }

    let Some(handler) = registry.get(&request.tool_name) else {
        let result = ExecutionResult::failure(format!("tool not registered: {}", request.tool_name));
        return finish(&mut output, &result, WorkerOutcome::UnknownTool).await;
    };

    let result = match handler.call(&ExecContext::background(), request.params).await {
        Ok(value) => ExecutionResult::success(into_output(value)),
        Err(e) => ExecutionResult::failure(format!("{:#}", e)),
    };

    finish(&mut output, &result, WorkerOutcome::Completed).await
}

/// Serve one request over the process's stdin/stdout and return the exit code
pub async fn serve_stdio(registry: &ToolRegistry) -> i32 {
    run_worker(registry, tokio::io::stdin(), tokio::io::stdout())
        .await
        .exit_code()
}

async fn finish<W>(output: &mut W, result: &ExecutionResult, outcome: WorkerOutcome) -> WorkerOutcome
where
    W: AsyncWrite + Unpin,
{
    let encoded = match serde_json::to_vec(result) {
        Ok(encoded) => encoded,
        Err(e) => {
            // Output values that cannot be encoded are reported, not lost
            let fallback = ExecutionResult::failure(format!("failed to encode result: {}", e));
            match serde_json::to_vec(&fallback) {
                Ok(encoded) => encoded,
                Err(_) => return WorkerOutcome::OutputFailed,
            }
        }
    };

    let written = async {
        output.write_all(&encoded).await?;
        output.flush().await
    };
    match written.await {
        Ok(()) => outcome,
        Err(_) => WorkerOutcome::OutputFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sandbox::protocol::ToolParams;
    use serde_json::{json, Value};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register("echo", |_ctx: ExecContext, params: ToolParams| async move {
                anyhow::Ok(Value::Object(params))
            })
            .register("answer", |_ctx: ExecContext, _params: ToolParams| async move {
                anyhow::Ok(json!(42))
            })
            .register("fail", |_ctx: ExecContext, _params: ToolParams| async move {
                Err::<Value, _>(anyhow::anyhow!("permission denied"))
            });
        registry
    }

    async fn serve(request: &str) -> (WorkerOutcome, ExecutionResult) {
        let mut out = Vec::new();
        let outcome = run_worker(&registry(), request.as_bytes(), &mut out).await;
        let result = serde_json::from_slice(&out).expect("worker must always emit a result");
        (outcome, result)
    }

    #[test]
    fn test_worker_flag_detection() {
        assert!(is_worker_invocation(["tool-sandbox", WORKER_MODE_FLAG]));
        assert!(!is_worker_invocation(["tool-sandbox", "run", "echo"]));
        assert!(!is_worker_invocation([WORKER_MODE_FLAG]));
        assert!(!is_worker_invocation(Vec::<String>::new()));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkerOutcome::Completed.exit_code(), 0);
        assert_ne!(WorkerOutcome::BadRequest.exit_code(), 0);
        assert_ne!(WorkerOutcome::UnknownTool.exit_code(), 0);
        assert_ne!(WorkerOutcome::OutputFailed.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_success_emits_output() {
        let (outcome, result) = serve(r#"{"version":1,"toolName":"echo","params":{"a":[1,2]}}"#).await;
        assert_eq!(outcome, WorkerOutcome::Completed);
        assert_eq!(result.output.unwrap()["a"], json!([1, 2]));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_scalar_output_is_wrapped() {
        let (_, result) = serve(r#"{"toolName":"answer","params":{}}"#).await;
        assert_eq!(result.output.unwrap()["result"], 42);
    }

    #[tokio::test]
    async fn test_tool_error_exits_zero() {
        let (outcome, result) = serve(r#"{"toolName":"fail","params":{}}"#).await;
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(result.error.as_deref(), Some("permission denied"));
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_exits_non_zero() {
        let (outcome, result) = serve(r#"{"toolName":"browser","params":{}}"#).await;
        assert_eq!(outcome, WorkerOutcome::UnknownTool);
        assert_ne!(outcome.exit_code(), 0);
        assert!(result.error.unwrap().contains("browser"));
    }

    #[tokio::test]
    async fn test_bad_request_exits_non_zero() {
        let (outcome, result) = serve("{not json").await;
        assert_eq!(outcome, WorkerOutcome::BadRequest);
        assert!(result.is_error());

        let (outcome, _) = serve("").await;
        assert_eq!(outcome, WorkerOutcome::BadRequest);
    }

    #[tokio::test]
    async fn test_unsupported_version_exits_non_zero() {
        let (outcome, result) = serve(r#"{"version":99,"toolName":"echo","params":{}}"#).await;
        assert_eq!(outcome, WorkerOutcome::BadRequest);
        assert!(result.error.unwrap().contains("99"));
    }
}
