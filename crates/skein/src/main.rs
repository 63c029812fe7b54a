//! Skein - list and call tools on MCP servers.
//!
//! Main entry point for the Skein CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{call, probe, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Skein - list and call tools on MCP servers
#[derive(Parser)]
#[command(name = "skein")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Also write JSON logs to this directory ("default" for the config dir)
    #[arg(long, global = true, env = "SKEIN_LOG_DIR")]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tools a server offers
    Tools(tools::ToolsArgs),

    /// Call a tool on a server
    Call(call::CallArgs),

    /// Check a server configuration with a one-shot, uncached session
    Probe(probe::ProbeArgs),
}

/// Resolve `--log-dir`, mapping "default" to `<config dir>/skein/logs`.
fn resolve_log_dir(raw: Option<&str>) -> Option<PathBuf> {
    match raw.map(str::trim) {
        None | Some("") => None,
        Some("default") => Some(
            dirs::config_dir()
                .map(|d| d.join("skein").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs")),
        ),
        Some(dir) => Some(PathBuf::from(dir)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console on stderr, plus rotating JSON file when asked
    let filter = if cli.verbose {
        "skein=debug,skein_mcp=debug,info"
    } else {
        "skein=info,skein_mcp=info,warn"
    };

    let (file_layer, _guard) = match resolve_log_dir(cli.log_dir.as_deref()) {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "skein.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "skein=trace,skein_mcp=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
                ),
        )
        .with(file_layer)
        .init();

    // Create context for commands
    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Probe(args) => probe::run(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_log_dir() {
        assert_eq!(resolve_log_dir(None), None);
        assert_eq!(resolve_log_dir(Some("  ")), None);
        assert_eq!(
            resolve_log_dir(Some("/var/log/skein")),
            Some(PathBuf::from("/var/log/skein"))
        );
        let default = resolve_log_dir(Some("default")).unwrap();
        assert!(default.ends_with("logs"));
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from([
            "skein", "--json", "call", "entry.json", "echo", "--args", r#"{"text":"hi"}"#,
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Call(args) => {
                assert_eq!(args.tool, "echo");
                assert_eq!(args.args.as_deref(), Some(r#"{"text":"hi"}"#));
            }
            _ => panic!("expected call command"),
        }
    }
}
