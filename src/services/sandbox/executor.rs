//! Executor contract, tool registry and the in-process executor.

use super::context::ExecContext;
use super::exceptions::{SandboxError, SandboxResult};
use super::protocol::{ToolOutput, ToolParams};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Key used to wrap non-object handler results
pub const RESULT_KEY: &str = "result";

/// Runs a named tool with the given parameters.
///
/// Implementations are safe to call concurrently; every call gets its own
/// request and result, and a done context aborts the underlying work.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        ctx: &ExecContext,
        tool_name: &str,
        params: ToolParams,
    ) -> SandboxResult<ToolOutput>;

    /// Release resources kept between calls, e.g. pre-created containers.
    ///
    /// Calls made afterwards still work, without those resources.
    async fn shutdown(&self) {}
}

/// A tool implementation that can be registered with a [`ToolRegistry`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ExecContext, params: ToolParams) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ExecContext, ToolParams) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, ctx: &ExecContext, params: ToolParams) -> anyhow::Result<Value> {
        (self)(ctx.clone(), params).await
    }
}

/// Coerce a handler's return value into an output map.
///
/// Objects pass through; anything else is wrapped under [`RESULT_KEY`].
pub fn into_output(value: Value) -> ToolOutput {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ToolOutput::new();
            map.insert(RESULT_KEY.to_string(), other);
            map
        }
    }
}

/// Name-to-handler table consulted by the worker and the in-process executor
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: ToolHandler + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

type DispatchFn =
    dyn Fn(ExecContext, String, ToolParams) -> BoxFuture<'static, anyhow::Result<ToolOutput>>
        + Send
        + Sync;

/// Calls the handler directly in the current process. No isolation.
///
/// Only for callers that are already trusted.
#[derive(Clone)]
pub struct InProcessExecutor {
    dispatch: Arc<DispatchFn>,
}

impl InProcessExecutor {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(ExecContext, String, ToolParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolOutput>> + Send + 'static,
    {
        let dispatch: Arc<DispatchFn> =
            Arc::new(move |ctx, tool, params| handler(ctx, tool, params).boxed());
        Self { dispatch }
    }

    /// Dispatch by name through a registry
    pub fn from_registry(registry: Arc<ToolRegistry>) -> Self {
        Self::new(move |ctx: ExecContext, tool: String, params: ToolParams| {
            let handler = registry.get(&tool);
            async move {
                match handler {
                    Some(handler) => handler.call(&ctx, params).await.map(into_output),
                    None => Err(anyhow::anyhow!("tool not registered")),
                }
            }
        })
    }
}

#[async_trait]
impl Executor for InProcessExecutor {
    async fn execute(
        &self,
        ctx: &ExecContext,
        tool_name: &str,
        params: ToolParams,
    ) -> SandboxResult<ToolOutput> {
        (self.dispatch)(ctx.clone(), tool_name.to_string(), params)
            .await
            .map_err(|e| SandboxError::Tool {
                tool: tool_name.to_string(),
                message: format!("{:#}", e),
            })
    }
}
