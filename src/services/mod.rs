//! Services module
//!
//! Sandboxed tool execution and the built-in tools served by the worker.

pub mod sandbox;
pub mod tools;

pub use sandbox::{
    build_executor, ContainerExecutor, ContainerPool, ContainerRuntime, ExecContext, Executor,
    InProcessExecutor, SandboxError, SandboxResult, SubprocessExecutor, ToolRegistry,
};
pub use tools::builtin_registry;
