//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use skein_mcp::{ServerEntry, TransportKind};

pub mod call;
pub mod probe;
pub mod tools;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Arguments naming the server entry a command runs against.
#[derive(Args, Debug)]
pub struct EntryArgs {
    /// JSON file describing the server entry
    pub entry: PathBuf,

    /// Replace the entry's config with the contents of this file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Replace the entry's bearer token
    #[arg(long, env = "SKEIN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// On-disk form of a server entry.
///
/// `configJson` may be the config text or the config object itself.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
    transport: TransportKind,
    #[serde(default)]
    token: String,
    #[serde(default, alias = "config")]
    config_json: Option<Value>,
}

impl EntryArgs {
    /// Read the entry file and apply the overrides.
    pub fn load(&self) -> Result<ServerEntry> {
        let text = std::fs::read_to_string(&self.entry)
            .with_context(|| format!("failed to read entry file {}", self.entry.display()))?;
        let file: EntryFile = serde_json::from_str(&text)
            .with_context(|| format!("invalid entry file {}", self.entry.display()))?;

        let config_json = match file.config_json {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        };
        let name = file.name.unwrap_or_else(|| file.id.clone());
        let mut entry = ServerEntry::new(file.id, name, file.transport, config_json)
            .with_token(file.token);

        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            entry = entry.with_config_json(text);
        }
        if let Some(token) = &self.token {
            entry = entry.with_token(token.clone());
        }

        tracing::debug!(server = %entry.id, transport = %entry.transport, "loaded server entry");
        Ok(entry)
    }
}

/// Truncate a string to at most `max` characters, ending in "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
