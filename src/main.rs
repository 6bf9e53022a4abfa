//! mcp-probe - MCP server connectivity checker
//!
#![doc = "mcp-probe - MCP server connectivity checker"]
#![doc = "Main entry point for the mcp-probe application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_probe::cli::{Cli, Commands};
use mcp_probe::commands;
use mcp_probe::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("mcp-probe.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Check { server, json } => {
            tracing::debug!("Checking connectivity of {} server(s)", config.servers.len());
            commands::handle_check(config, server, json).await
        }
        Commands::Tools { server, json } => {
            tracing::debug!("Fetching tools of {} server(s)", config.servers.len());
            commands::handle_tools(config, server, json).await
        }
    }
}

/// Initialize tracing/logging
///
/// Logs go to stderr so that table and JSON output on stdout stay clean.
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "mcp_probe=debug"
    } else {
        "mcp_probe=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
