//! Command-line interface definition for mcp-probe
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for connectivity checks and tool discovery.

use clap::{Parser, Subcommand};

/// mcp-probe - MCP server connectivity checker
///
/// Verify that configured Model Context Protocol servers are reachable and
/// list the tools they expose.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-probe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mcp-probe.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Additional command to allow for stdio servers (repeatable)
    #[arg(long = "allow", value_name = "COMMAND")]
    pub allow: Vec<String>,

    /// Maximum number of servers probed concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcp-probe
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Check connectivity of configured servers
    Check {
        /// Only probe the server with this name
        #[arg(short, long)]
        server: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tools exposed by configured servers
    Tools {
        /// Only probe the server with this name
        #[arg(short, long)]
        server: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("mcp-probe.yaml".to_string()),
            verbose: false,
            allow: Vec::new(),
            concurrency: None,
            command: Commands::Check {
                server: None,
                json: false,
            },
        }
    }
}
