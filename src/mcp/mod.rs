//! MCP (Model Context Protocol) connectivity probing
//!
//! This module checks whether externally configured MCP servers are
//! reachable and lists the tools they expose, across the stdio, streamable
//! HTTP and legacy SSE transports.
//!
//! The handshake targets protocol revision **2024-11-05**.
//!
//! # Module Layout
//!
//! - `types`       -- Server definitions, result records, JSON-RPC envelopes
//! - `allowlist`   -- Launch command allow-list for stdio servers
//! - `endpoint`    -- URL/header sanitation and same-origin enforcement
//! - `server_info` -- `serverInfo` scraping from raw process output
//! - `sse`         -- Bounded incremental SSE frame reader
//! - `process`     -- Child process supervision and termination
//! - `transport`   -- `ServerProbe` trait and per-transport probes
//! - `probe`       -- Facade dispatching on transport kind

pub mod allowlist;
pub mod endpoint;
pub mod probe;
pub mod process;
pub mod server_info;
pub mod sse;
pub mod transport;
pub mod types;

pub use probe::McpProbe;
pub use types::{
    ConnectionStatus, ConnectivityResult, ServerDefinition, ServerInfo, ToolDescriptor,
    ToolFetchResult, TransportKind,
};
