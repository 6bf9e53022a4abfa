//! `check` subcommand handler
//!
//! Verifies connectivity of the configured servers and prints one row per
//! server, or a JSON array with `--json`.

use crate::config::Config;
use crate::error::Result;
use crate::mcp::probe::McpProbe;
use crate::mcp::types::{ConnectionStatus, ConnectivityResult};
use colored::Colorize;
use prettytable::{format, Table};

/// Handle the `check` subcommand
///
/// Server failures are reported in the output and never turn into an
/// error; only configuration problems do.
///
/// # Arguments
///
/// * `config` - Loaded and validated configuration
/// * `server` - Optional name of the single server to probe
/// * `json` - Print JSON instead of a table
///
/// # Errors
///
/// Returns an error if `server` names no configured server or the probe
/// cannot be constructed.
pub async fn handle_check(config: Config, server: Option<String>, json: bool) -> Result<()> {
    let servers = config.select_servers(server.as_deref())?;
    if servers.is_empty() {
        println!("{}", "No MCP servers configured.".yellow());
        return Ok(());
    }

    let probe = McpProbe::new(&config.probe)?;
    let results = probe.verify_all(&servers).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        connectivity_table(&results).printstd();
        println!();
        println!("{}", summarize(&results));
    }
    Ok(())
}

/// Render verification results as a table.
pub fn connectivity_table(results: &[ConnectivityResult]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Server".bold(),
        "Status".bold(),
        "Server Info".bold(),
        "Details".bold()
    ]);

    for result in results {
        let status = match result.status {
            ConnectionStatus::Connected => result.status.to_string().green(),
            ConnectionStatus::Pending => result.status.to_string().yellow(),
            ConnectionStatus::Failed => result.status.to_string().red(),
        };
        let info = result
            .server_info
            .as_ref()
            .map(|i| format!("{} {}", i.name, i.version).trim().to_string())
            .unwrap_or_else(|| "-".to_string());
        let details = result.error.clone().unwrap_or_default();
        table.add_row(prettytable::row![result.name.cyan(), status, info, details]);
    }
    table
}

/// One-line tally of statuses.
pub fn summarize(results: &[ConnectivityResult]) -> String {
    let count = |status: ConnectionStatus| results.iter().filter(|r| r.status == status).count();
    format!(
        "{} connected, {} pending, {} failed",
        count(ConnectionStatus::Connected),
        count(ConnectionStatus::Pending),
        count(ConnectionStatus::Failed)
    )
}
