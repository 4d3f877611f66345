//! Configuration management module
//!
//! This module handles loading and validating sandbox configuration
//! from environment variables and .env files.

pub mod settings;

pub use settings::{ContainerSandboxConfig, IsolationConfig, RuntimeKind, Settings, MAX_MEMORY_MB};
