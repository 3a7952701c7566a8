//! Saferun - safety-gated, verified execution CLI
//!
//! The `saferun` command is the shell front door to the pipeline:
//!
//! - `analyze`: classify a command against the dangerous-pattern rules
//! - `exec`: analyze a command, then run it under a resource budget
//! - `run`: full plan-execute-verify cycle for a registered tool
//! - `probe`: one live check of real system state

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{warn, Level};

use saferun_core::{
    init_tracing, IsolationConfig, Orchestrator, OrchestratorConfig, Recommendation,
    SafetyAnalyzer, SandboxExecutor, ShellTool, SystemValidator, ToolHandler, METRICS,
};

#[derive(Parser)]
#[command(name = "saferun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Safety-gated, verified execution for agent commands", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a shell command against the dangerous-pattern rules
    Analyze {
        /// Command string to analyze
        command: String,
    },

    /// Analyze a shell command and, if permitted, run it under a budget
    Exec {
        /// Command string to run
        command: String,

        /// Confirm execution of commands flagged as destructive
        #[arg(long)]
        confirm_destructive: bool,

        /// Wall-clock budget in milliseconds
        #[arg(long, default_value_t = 60_000)]
        max_time_millis: u64,
    },

    /// Run one full plan-execute-verify cycle for a registered tool
    Run {
        /// Tool name (built-in: shell)
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Confirm execution of commands flagged as destructive
        #[arg(long)]
        confirm_destructive: bool,
    },

    /// Probe real system state once
    Probe {
        #[command(subcommand)]
        target: ProbeTarget,
    },
}

#[derive(Subcommand)]
enum ProbeTarget {
    /// Check that a file or directory exists
    File { path: String },

    /// Check that a TCP port is accepting connections
    Port {
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Check that a GET of a URL returns the expected status
    Endpoint {
        url: String,

        #[arg(long, default_value_t = 200)]
        expect: u16,
    },

    /// Check that a process with the given name is running
    Process { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze { command } => {
            let analysis = SafetyAnalyzer::new().analyze(&command);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            if analysis.blocked() {
                std::process::exit(1);
            }
        }

        Commands::Exec {
            command,
            confirm_destructive,
            max_time_millis,
        } => {
            let analysis = SafetyAnalyzer::new().analyze(&command);

            if analysis.recommendation == Recommendation::Block {
                eprintln!("refused: command matched a block-level safety rule");
                for violation in &analysis.violations {
                    eprintln!("  [{:?}] {}", violation.severity, violation.description);
                }
                if let Some(alternative) = &analysis.alternative {
                    eprintln!("try instead:\n  {alternative}");
                }
                std::process::exit(1);
            }
            if analysis.destructive() && !confirm_destructive {
                bail!("destructive command; re-run with --confirm-destructive to proceed");
            }
            if analysis.recommendation == Recommendation::Warn {
                for violation in &analysis.violations {
                    warn!(
                        event = "frontdoor.violation",
                        severity = ?violation.severity,
                        description = %violation.description,
                    );
                }
            }

            let executor = SandboxExecutor::new();
            let handle = executor.create_context(IsolationConfig {
                max_time_millis,
                ..IsolationConfig::default()
            })?;
            let args = json!({ "command": command });
            let result = executor
                .execute(handle, || async move { ShellTool.run(&args).await })
                .await?;
            executor.destroy_context(handle);

            println!("{}", serde_json::to_string_pretty(&result)?);
            METRICS.flush();
            if !result.success {
                std::process::exit(result.exit_code.max(1));
            }
        }

        Commands::Run {
            tool,
            args,
            confirm_destructive,
        } => {
            let args: serde_json::Value = serde_json::from_str(&args)?;
            let orchestrator = Orchestrator::with_validator(
                OrchestratorConfig {
                    confirm_destructive,
                    ..OrchestratorConfig::default()
                },
                SystemValidator::new(),
            );

            let result = orchestrator.execute_tool(&tool, args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            METRICS.flush();
            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Probe { target } => {
            let validator = SystemValidator::new();
            let result = match target {
                ProbeTarget::File { path } => validator.check_file(&path).await,
                ProbeTarget::Port { port, host } => validator.check_port(port, &host).await,
                ProbeTarget::Endpoint { url, expect } => {
                    validator.check_endpoint(&url, expect).await
                }
                ProbeTarget::Process { name } => validator.check_process(&name).await,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
