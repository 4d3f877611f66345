//! Application settings and configuration
//!
//! This module provides configuration management for the sandbox,
//! loading settings from environment variables with sensible defaults.

use crate::logging::LogFormat;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-tool timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default memory limit hint in megabytes
pub const DEFAULT_MAX_MEMORY_MB: u64 = 256;

/// Default container image; its entrypoint must be this binary
pub const DEFAULT_SANDBOX_IMAGE: &str = "tool-sandbox:latest";

/// Default network mode for sandbox containers
pub const DEFAULT_NETWORK_MODE: &str = "none";

/// Default CPU quota (50% of one core per 100ms period)
pub const DEFAULT_CPU_QUOTA: i64 = 50_000;

/// Which isolation backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Try docker, then gvisor, then fall back to native
    Auto,
    Docker,
    #[value(alias = "runsc")]
    Gvisor,
    #[value(alias = "subprocess")]
    Native,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Auto => write!(f, "auto"),
            RuntimeKind::Docker => write!(f, "docker"),
            RuntimeKind::Gvisor => write!(f, "gvisor"),
            RuntimeKind::Native => write!(f, "native"),
        }
    }
}

impl Default for RuntimeKind {
    fn default() -> Self {
        RuntimeKind::Auto
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "" => Ok(RuntimeKind::Auto),
            "docker" => Ok(RuntimeKind::Docker),
            "gvisor" | "runsc" => Ok(RuntimeKind::Gvisor),
            "native" | "subprocess" => Ok(RuntimeKind::Native),
            _ => anyhow::bail!(
                "Invalid sandbox runtime: {}. Expected: auto, docker, gvisor, or native",
                s
            ),
        }
    }
}

/// Largest memory limit, in megabytes, whose byte count fits Docker's `i64`
pub const MAX_MEMORY_MB: u64 = (i64::MAX as u64) / (1024 * 1024);

/// Isolation policy shared by every executor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IsolationConfig {
    pub enabled: bool,
    /// Zero means unbounded
    pub timeout_per_tool: Duration,
    /// Soft hint; only enforced where the backend supports it
    pub max_memory_mb: u64,
    /// Worker executable; the running binary when unset
    pub worker_program: Option<PathBuf>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_per_tool: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            worker_program: None,
        }
    }
}

impl IsolationConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_per_tool = timeout;
        self
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }
}

/// Container-specific sandbox parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainerSandboxConfig {
    pub runtime: RuntimeKind,
    pub image: String,
    pub network_mode: String,
    pub read_only_rootfs: bool,
    /// CPU quota in microseconds per 100ms period; zero disables the limit
    pub cpu_quota: i64,
    /// Pre-warmed containers to keep around; zero disables pooling
    pub pool_size: usize,
}

impl Default for ContainerSandboxConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::Auto,
            image: DEFAULT_SANDBOX_IMAGE.to_string(),
            network_mode: DEFAULT_NETWORK_MODE.to_string(),
            read_only_rootfs: true,
            cpu_quota: DEFAULT_CPU_QUOTA,
            pool_size: 0,
        }
    }
}

impl ContainerSandboxConfig {
    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub log_level: String,
    pub log_format: LogFormat,
    pub isolation: IsolationConfig,
    pub container: ContainerSandboxConfig,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let timeout_secs: u64 = env_or_default("SANDBOX_TIMEOUT_SECS", "60")
            .parse()
            .context("Invalid SANDBOX_TIMEOUT_SECS value")?;

        let settings = Self {
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_format: env_or_default("LOG_FORMAT", "json")
                .parse()
                .unwrap_or_default(),

            isolation: IsolationConfig {
                enabled: env_or_default("SANDBOX_ENABLED", "true")
                    .parse()
                    .unwrap_or(true),
                timeout_per_tool: Duration::from_secs(timeout_secs),
                max_memory_mb: env_or_default("SANDBOX_MAX_MEMORY_MB", "256")
                    .parse()
                    .context("Invalid SANDBOX_MAX_MEMORY_MB value")?,
                worker_program: env::var_os("SANDBOX_WORKER_PROGRAM").map(PathBuf::from),
            },

            container: ContainerSandboxConfig {
                runtime: env_or_default("SANDBOX_RUNTIME", "auto").parse()?,
                image: env_or_default("SANDBOX_IMAGE", DEFAULT_SANDBOX_IMAGE),
                network_mode: env_or_default("SANDBOX_NETWORK_MODE", DEFAULT_NETWORK_MODE),
                read_only_rootfs: env_or_default("SANDBOX_READ_ONLY_ROOTFS", "true")
                    .parse()
                    .unwrap_or(true),
                cpu_quota: env_or_default("SANDBOX_CPU_QUOTA", "50000")
                    .parse()
                    .context("Invalid SANDBOX_CPU_QUOTA value")?,
                pool_size: env_or_default("SANDBOX_POOL_SIZE", "0")
                    .parse()
                    .unwrap_or(0),
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        let container = &self.container;

        if matches!(container.runtime, RuntimeKind::Docker | RuntimeKind::Auto) {
            if container.image.trim().is_empty() {
                anyhow::bail!("SANDBOX_IMAGE cannot be empty when the docker runtime may be used");
            }
            if container.network_mode.trim().is_empty() {
                anyhow::bail!("SANDBOX_NETWORK_MODE cannot be empty");
            }
            if self.isolation.max_memory_mb > MAX_MEMORY_MB {
                anyhow::bail!("SANDBOX_MAX_MEMORY_MB must be <= {}", MAX_MEMORY_MB);
            }
        }

        if container.cpu_quota < 0 {
            anyhow::bail!("SANDBOX_CPU_QUOTA must be >= 0");
        }

        if !self.isolation.enabled {
            tracing::warn!("Sandbox isolation disabled: tools will run in-process");
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            isolation: IsolationConfig::default(),
            container: ContainerSandboxConfig::default(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
