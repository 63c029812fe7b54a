//! `skein tools`: list a server's tools.

use anyhow::Result;
use clap::Args;

use skein_mcp::{ListToolsResult, SessionManager};

use super::{Context, EntryArgs, truncate};

/// Arguments for `skein tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Show full input schemas
    #[arg(long)]
    pub full: bool,
}

/// Run `skein tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let entry = args.entry.load()?;
    let manager = SessionManager::new();
    let listed = manager.list_tools(&entry).await;
    manager.close_all().await;
    let listed = listed?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    } else {
        print_table(&listed, args.full || ctx.verbose)?;
    }
    Ok(())
}

fn print_table(listed: &ListToolsResult, full: bool) -> Result<()> {
    if listed.tools.is_empty() {
        println!("No tools.");
        return Ok(());
    }

    println!("{:<30} {:<50}", "NAME", "DESCRIPTION");
    println!("{}", "-".repeat(80));
    for tool in &listed.tools {
        println!(
            "{:<30} {:<50}",
            truncate(&tool.name, 30),
            truncate(tool.description.as_deref().unwrap_or(""), 50)
        );
        if full {
            if let Some(schema) = &tool.input_schema {
                for line in serde_json::to_string_pretty(schema)?.lines() {
                    println!("    {line}");
                }
            }
        }
    }
    Ok(())
}
