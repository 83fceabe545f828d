//! zsync - Zephyr for Jira result synchronization
//!
//! Replays recorded test-engine lifecycle events into the tracker, and
//! inspects configuration and error codes.

#![forbid(unsafe_code)]

mod replay;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use zsync_common::{ErrorCode, LogConfig, Settings, init_logging, validate_config};

#[derive(Parser)]
#[command(name = "zsync")]
#[command(author, version, about = "Synchronize test results with Zephyr for Jira")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log through the listener
    Replay {
        /// Event log to replay
        #[arg(short, long)]
        events: PathBuf,

        /// Settings file (defaults to $ZSYNC_CONFIG, then ./zsync.toml)
        #[arg(short, long, env = "ZSYNC_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Show resolved settings and validation findings
    Config {
        /// Settings file (defaults to $ZSYNC_CONFIG, then ./zsync.toml)
        #[arg(short, long, env = "ZSYNC_CONFIG")]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Explain an error code (e.g. ZS-E102)
    Explain {
        code: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => Some(guards),
        Err(err) => {
            eprintln!("[{}] {err}", err.code().code_string());
            None
        }
    };

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but found problems.
fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Replay { events, config } => {
            let report = replay::run(&events, config.as_deref())?;
            for (line, err) in &report.failures {
                eprintln!("line {line}: {}", err.code().entry().format_full());
                eprintln!("  {err}");
            }
            if let Some(summary) = &report.uploads {
                for failure in &summary.failures {
                    warn!(
                        entity_id = failure.upload.entity_id(),
                        "[{}] {}",
                        failure.error.code().code_string(),
                        failure.error
                    );
                }
            }
            println!(
                "replayed {} events, {} failed",
                report.events,
                report.failures.len()
            );
            Ok(report.is_success())
        }
        Commands::Config { config, json } => show_config(config, json),
        Commands::Explain { code, json } => explain(&code, json),
    }
}

fn show_config(path: Option<PathBuf>, json: bool) -> Result<bool> {
    let settings = Settings::load(path.as_deref())
        .map_err(|err| anyhow::anyhow!("[{}] {err}", err.code().code_string()))?;
    let findings = validate_config(&settings);
    let valid = !findings.iter().any(|f| f.is_error());

    if json {
        let output = serde_json::json!({
            "settings": settings.redacted(),
            "findings": findings,
            "valid": valid,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let rendered = toml::to_string_pretty(&settings.redacted())?;
        println!("{}", rendered.trim_end());
        if !findings.is_empty() {
            println!();
            for finding in &findings {
                println!("{finding}");
            }
        }
    }
    Ok(valid)
}

fn explain(code: &str, json: bool) -> Result<bool> {
    let Some(code) = ErrorCode::parse(code) else {
        bail!("unknown error code '{code}'");
    };
    let entry = code.entry();
    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("{}", entry.format_full().trim_end());
        println!("\nCategory: {} ({})", entry.category, entry.category.description());
    }
    Ok(true)
}
