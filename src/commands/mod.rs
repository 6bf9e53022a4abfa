//! Subcommand handlers for mcp-probe
//!
//! Each handler receives the loaded configuration, runs the probes, and
//! prints the results to stdout.

pub mod check;
pub mod tools;

pub use check::handle_check;
pub use tools::handle_tools;
