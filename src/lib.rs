//! mcp-probe - MCP server connectivity checker library
//!
//! This library verifies that Model Context Protocol servers are reachable
//! and enumerates the tools they expose, over stdio, streamable HTTP and
//! legacy SSE transports.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: Transports, process supervision, SSE parsing and security checks
//! - `commands`: `check` and `tools` subcommand handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use mcp_probe::{Config, McpProbe};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("mcp-probe.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let probe = McpProbe::new(&config.probe)?;
//!     for result in probe.verify_all(&config.servers).await {
//!         println!("{}: {}", result.name, result.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;

// Re-export commonly used types
pub use config::Config;
pub use error::{ProbeError, Result};
pub use mcp::{ConnectionStatus, ConnectivityResult, McpProbe, ServerDefinition, ToolFetchResult};
