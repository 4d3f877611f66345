//! End-to-end tests against the compiled binary in worker mode.

use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tool_sandbox::config::{ContainerSandboxConfig, IsolationConfig, RuntimeKind};
use tool_sandbox::services::sandbox::{
    ContainerExecutor, ExecContext, ExecutionResult, Executor, SubprocessExecutor, ToolParams,
    WORKER_MODE_FLAG,
};

const BIN: &str = env!("CARGO_BIN_EXE_tool-sandbox");

fn params(value: Value) -> ToolParams {
    value.as_object().cloned().unwrap_or_default()
}

fn subprocess(timeout: Duration) -> SubprocessExecutor {
    SubprocessExecutor::new(
        IsolationConfig::default()
            .with_timeout(timeout)
            .with_worker_program(BIN),
    )
}

/// Feed one raw request to the worker and return (exit code, decoded stdout)
async fn raw_worker(request: &[u8]) -> (i32, ExecutionResult) {
    let mut child = Command::new(BIN)
        .arg(WORKER_MODE_FLAG)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(request).await.unwrap();
    drop(stdin);

    let output = child.wait_with_output().await.unwrap();
    let result: ExecutionResult = serde_json::from_slice(&output.stdout).unwrap();
    (output.status.code().unwrap_or(-1), result)
}

#[tokio::test]
async fn test_tool_failure_exits_zero() {
    let request = json!({"version": 1, "toolName": "fail", "params": {"message": "nope"}});
    let (code, result) = raw_worker(request.to_string().as_bytes()).await;

    assert_eq!(code, 0);
    assert_eq!(result.error.as_deref(), Some("nope"));
    assert!(result.output.is_none());
}

#[tokio::test]
async fn test_unknown_tool_exits_non_zero() {
    let request = json!({"toolName": "missing", "params": {}});
    let (code, result) = raw_worker(request.to_string().as_bytes()).await;

    assert_eq!(code, 3);
    assert!(result.is_error());
}

#[tokio::test]
async fn test_garbage_request_exits_non_zero() {
    let (code, result) = raw_worker(b"{not json").await;

    assert_eq!(code, 2);
    assert!(result.error.unwrap().contains("invalid request"));
}

#[tokio::test]
async fn test_subprocess_round_trip() {
    let executor = subprocess(Duration::from_secs(30));
    let output = executor
        .execute(
            &ExecContext::background(),
            "echo",
            params(json!({"text": "hello", "n": [1, 2, 3]})),
        )
        .await
        .unwrap();

    assert_eq!(output["text"], "hello");
    assert_eq!(output["n"], json!([1, 2, 3]));
}

#[tokio::test]
async fn test_subprocess_environment_is_clean() {
    std::env::set_var("TOOL_SANDBOX_TEST_SECRET", "hunter2");

    let executor = subprocess(Duration::from_secs(30));
    let output = executor
        .execute(&ExecContext::background(), "env", ToolParams::new())
        .await
        .unwrap();

    let names: Vec<&str> = output["vars"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.iter().all(|name| *name == "PATH" || *name == "HOME"), "{:?}", names);
}

#[tokio::test]
async fn test_subprocess_tool_error() {
    let executor = subprocess(Duration::from_secs(30));
    let err = executor
        .execute(
            &ExecContext::background(),
            "fail",
            params(json!({"message": "bad input"})),
        )
        .await
        .unwrap_err();

    assert!(err.is_tool_error());
    assert!(err.to_string().contains("bad input"));
}

#[tokio::test]
async fn test_subprocess_unknown_tool_is_timeout_class() {
    let executor = subprocess(Duration::from_secs(30));
    let err = executor
        .execute(&ExecContext::background(), "missing", ToolParams::new())
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("tool not registered: missing"));
}

#[tokio::test]
async fn test_subprocess_timeout_kills_worker() {
    let executor = subprocess(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let err = executor
        .execute(&ExecContext::background(), "sleep", params(json!({"ms": 30_000})))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_subprocess_cancellation() {
    let executor = subprocess(Duration::ZERO);
    let ctx = ExecContext::background();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let err = executor
        .execute(&ctx, "sleep", params(json!({"ms": 30_000})))
        .await
        .unwrap_err();
    assert!(!err.is_timeout());
    assert!(!err.is_tool_error());
}

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let executor = std::sync::Arc::new(subprocess(Duration::from_secs(30)));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(&ExecContext::background(), "echo", params(json!({"i": i})))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let output = handle.await.unwrap().unwrap();
        assert_eq!(output["i"], i);
    }
}

#[tokio::test]
async fn test_native_container_executor_round_trip() {
    let executor = ContainerExecutor::new(
        IsolationConfig::default().with_worker_program(BIN),
        ContainerSandboxConfig::default().with_runtime(RuntimeKind::Native),
    )
    .await
    .unwrap();
    let ctx = ExecContext::background();

    let output = executor
        .execute(&ctx, "sleep", params(json!({"ms": 1})))
        .await
        .unwrap();
    assert_eq!(output["slept_ms"], 1);

    let err = executor
        .execute(&ctx, "fail", params(json!({"message": "from container"})))
        .await
        .unwrap_err();
    assert!(err.is_tool_error());
    assert!(err.to_string().contains("from container"));

    executor.shutdown().await;
    let output = executor
        .execute(&ctx, "echo", params(json!({"after": "shutdown"})))
        .await
        .unwrap();
    assert_eq!(output["after"], "shutdown");
}
