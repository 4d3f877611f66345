//! Tool Sandbox
//!
//! Runs agent tools in isolation. The same binary is the orchestrator CLI and,
//! when started with the worker flag, the worker that serves one tool call.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;
use tool_sandbox::{
    config::{RuntimeKind, Settings},
    logging::{init_tracing, LogFormat},
    services::{
        build_executor, builtin_registry,
        sandbox::{
            is_worker_invocation, serve_stdio, ContainerRuntime, DockerRuntime, SweepScope, ToolParams,
        },
        ContainerExecutor, ExecContext, Executor,
    },
};

/// Tool Sandbox
///
/// Runs agent tools in a subprocess or container sandbox.
#[derive(Parser, Debug)]
#[command(name = "tool-sandbox")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error (overrides LOG_LEVEL env var)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: json or pretty (overrides LOG_FORMAT env var)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one tool in the sandbox and print its output as JSON
    Run {
        /// Tool name
        tool: String,

        /// Tool parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Per-tool timeout in seconds, 0 for none (overrides SANDBOX_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,

        /// Isolation runtime (overrides SANDBOX_RUNTIME)
        #[arg(long)]
        runtime: Option<RuntimeKind>,
    },

    /// Print the runtime the sandbox would use
    Probe {
        /// Isolation runtime to probe (overrides SANDBOX_RUNTIME)
        #[arg(long)]
        runtime: Option<RuntimeKind>,
    },

    /// Remove sandbox containers left behind by earlier runs
    Cleanup {
        /// Only remove exited containers, leaving running and pooled ones
        #[arg(long)]
        stopped: bool,
    },

    /// List the built-in tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Worker mode never loads settings; it only sees PATH and HOME
    if is_worker_invocation(std::env::args()) {
        let code = serve_stdio(&builtin_registry()).await;
        std::process::exit(code);
    }

    // Parse command line arguments
    let args = Args::parse();

    // Load configuration first (before logging, so we can use log_level)
    let mut settings = Settings::load()?;

    // Override settings with CLI arguments
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        settings.log_format = log_format;
    }

    init_tracing(&settings.log_level, settings.log_format);

    match args.command {
        Command::Run {
            tool,
            params,
            timeout,
            runtime,
        } => {
            if let Some(secs) = timeout {
                settings.isolation.timeout_per_tool = Duration::from_secs(secs);
            }
            if let Some(runtime) = runtime {
                settings.container.runtime = runtime;
            }
            run_tool(&settings, &tool, &params).await
        }
        Command::Probe { runtime } => {
            if let Some(runtime) = runtime {
                settings.container.runtime = runtime;
            }
            probe(&settings).await
        }
        Command::Cleanup { stopped } => {
            let scope = if stopped { SweepScope::Stopped } else { SweepScope::All };
            cleanup(scope).await
        }
        Command::Tools => {
            print_json(&json!({ "tools": builtin_registry().names() }))
        }
    }
}

async fn run_tool(settings: &Settings, tool: &str, params: &str) -> Result<()> {
    let params: ToolParams = serde_json::from_str(params).context("--params must be a JSON object")?;

    let executor = build_executor(settings, builtin_registry().into()).await?;

    let ctx = ExecContext::background();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling tool call");
            interrupt.cancel();
        }
    });

    let result = executor.execute(&ctx, tool, params).await;
    executor.shutdown().await;

    match result {
        Ok(output) => print_json(&Value::Object(output)),
        Err(e) if e.is_tool_error() => {
            print_json(&json!({ "error": e.to_string() }))?;
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn probe(settings: &Settings) -> Result<()> {
    if !settings.isolation.enabled {
        return print_json(&json!({ "runtime": "in-process" }));
    }

    let executor =
        ContainerExecutor::new(settings.isolation.clone(), settings.container.clone()).await?;

    let warm = executor.pool().map(|pool| pool.size());
    executor.shutdown().await;

    print_json(&json!({
        "requested": settings.container.runtime,
        "runtime": executor.runtime_name(),
        "warm_containers": warm,
    }))
}

async fn cleanup(scope: SweepScope) -> Result<()> {
    let docker = DockerRuntime::connect()?;
    if !docker.is_available(&ExecContext::background()).await {
        anyhow::bail!("Docker daemon is not reachable");
    }

    tracing::info!(version = %docker.version().await?, "Sweeping sandbox containers");
    let removed = docker.sweep(scope).await?;

    print_json(&json!({ "removed": removed }))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
