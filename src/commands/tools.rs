//! `tools` subcommand handler
//!
//! Fetches the tool catalogue of every configured server.

use crate::config::Config;
use crate::error::Result;
use crate::mcp::probe::McpProbe;
use crate::mcp::types::ToolFetchResult;
use colored::Colorize;
use prettytable::{format, Table};

/// Longest description shown in the table before it is cut.
const MAX_DESCRIPTION_CHARS: usize = 60;

/// Handle the `tools` subcommand
///
/// # Arguments
///
/// * `config` - Loaded and validated configuration
/// * `server` - Optional name of the single server to query
/// * `json` - Print JSON instead of tables
///
/// # Errors
///
/// Returns an error if `server` names no configured server or the probe
/// cannot be constructed.
pub async fn handle_tools(config: Config, server: Option<String>, json: bool) -> Result<()> {
    let servers = config.select_servers(server.as_deref())?;
    if servers.is_empty() {
        println!("{}", "No MCP servers configured.".yellow());
        return Ok(());
    }

    let probe = McpProbe::new(&config.probe)?;
    let results = probe.fetch_all(&servers).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        let transport = result
            .server_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("\n{} ({})", result.name.cyan().bold(), transport);
        match &result.error {
            Some(error) => println!("  {} {}", "error:".red(), error),
            None if result.tools.is_empty() => println!("  {}", "No tools exposed.".yellow()),
            None => tools_table(result).printstd(),
        }
    }
    println!();
    Ok(())
}

/// Render the tools of one fetch as a table.
pub fn tools_table(result: &ToolFetchResult) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Tool".bold(), "Description".bold()]);
    for tool in &result.tools {
        let description = tool.description.as_deref().unwrap_or("");
        table.add_row(prettytable::row![tool.name.green(), shorten(description)]);
    }
    table
}

fn shorten(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    match line.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}
