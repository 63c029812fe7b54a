//! `skein call`: call one tool and print its result.

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde_json::Value;

use skein_mcp::{SessionManager, ToolContent};

use super::{Context, EntryArgs};

/// Arguments for `skein call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Name of the tool to call
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,
}

/// Parse `--args`, defaulting to an empty object.
fn parse_arguments(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Value::Object(Default::default()));
    };
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object, got {value}");
    }
    Ok(value)
}

/// Run `skein call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments = parse_arguments(args.args.as_deref())?;
    let entry = args.entry.load()?;

    let manager = SessionManager::new();
    let result = manager.call_tool(&entry, &args.tool, arguments).await;
    manager.close_all().await;
    let result = result?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(result.as_value())?);
    } else {
        for part in result.content() {
            match part {
                ToolContent::Text { text } => println!("{text}"),
                ToolContent::Image { mime_type, data } => {
                    println!("[image: {mime_type}, {} bytes base64]", data.len())
                }
                ToolContent::Resource { resource } => {
                    println!("{}", serde_json::to_string_pretty(&resource)?)
                }
                ToolContent::Unknown => {}
            }
        }
        if let Some(structured) = result.structured_content() {
            if ctx.verbose || result.text().is_none() {
                println!("{}", serde_json::to_string_pretty(structured)?);
            }
        }
    }

    if result.is_error() {
        bail!("tool '{}' reported an error", args.tool);
    }
    Ok(())
}
