//! Sandboxed tool execution for agent gateways

// Public modules
pub mod config;
pub mod logging;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use services::sandbox::{Executor, SandboxError, SandboxResult};
