//! Built-in tools shipped with the binary.
//!
//! These exist so the sandbox can be exercised end to end without a host
//! application registering its own tools.

use crate::services::sandbox::{ContextError, ExecContext, ToolParams, ToolRegistry};
use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// Registry holding every built-in tool
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register("echo", echo)
        .register("env", env)
        .register("fail", fail)
        .register("sleep", sleep);
    registry
}

/// Returns its parameters unchanged
async fn echo(_ctx: ExecContext, params: ToolParams) -> Result<Value> {
    Ok(Value::Object(params))
}

/// Sorted names of the environment variables this process can see
async fn env(_ctx: ExecContext, _params: ToolParams) -> Result<Value> {
    let mut names: Vec<String> = std::env::vars_os()
        .map(|(key, _)| key.to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(json!({ "vars": names }))
}

async fn fail(_ctx: ExecContext, params: ToolParams) -> Result<Value> {
    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("tool failed");
    bail!("{}", message)
}

/// Sleeps for `params.ms` milliseconds unless the context finishes first
async fn sleep(ctx: ExecContext, params: ToolParams) -> Result<Value> {
    let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
        err = ctx.done() => Err(anyhow!(sleep_interrupted(err))),
    }
}

fn sleep_interrupted(err: ContextError) -> String {
    format!("sleep interrupted: {}", err)
}
