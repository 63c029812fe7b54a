//! `skein probe`: check a server configuration with a throwaway session.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use skein_mcp::{LogObserver, ProbeOptions, SessionManager};

use super::{Context, EntryArgs};

/// Arguments for `skein probe`.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Use newline-delimited framing for stdio servers
    #[arg(long)]
    pub newline: bool,

    /// Echo the server's stdout and stderr (stdio servers)
    #[arg(long)]
    pub show_logs: bool,
}

/// Run `skein probe`.
pub async fn run(args: ProbeArgs, ctx: &Context) -> Result<()> {
    let entry = args.entry.load()?;

    let mut options = ProbeOptions::default().with_newline_framing(args.newline);
    if args.show_logs {
        let observer: LogObserver = Arc::new(|stream, text| {
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                eprintln!("[{stream}] {line}");
            }
        });
        options = options.with_log_observer(observer);
    }

    let manager = SessionManager::new();
    match manager.test_list_tools(&entry, options).await {
        Ok(listed) => {
            let names: Vec<&str> = listed.tools.iter().map(|t| t.name.as_str()).collect();
            if ctx.json_output {
                let output = json!({
                    "status": "ok",
                    "server": entry.id,
                    "transport": entry.transport,
                    "tools": names,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("OK: '{}' ({}) offers {} tool(s)", entry.name, entry.transport, names.len());
                for name in names {
                    println!("  - {name}");
                }
            }
            Ok(())
        }
        Err(e) => {
            if ctx.json_output {
                let output = json!({
                    "status": "error",
                    "server": entry.id,
                    "transport": entry.transport,
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(e.into())
        }
    }
}
