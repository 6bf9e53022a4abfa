//! Per-transport connectivity probes
//!
//! This module defines the [`ServerProbe`] trait implemented once per MCP
//! transport variant:
//!
//! - [`stdio::StdioProbe`] -- spawns the server as a child process and
//!   speaks newline-delimited JSON-RPC over its standard streams.
//! - [`http::HttpProbe`] -- streamable HTTP: every message is a POST, with
//!   `Mcp-Session-Id` continuity once the server assigns one.
//! - [`sse::SseProbe`] -- legacy SSE: a persistent GET stream announces the
//!   POST endpoint, and responses may arrive on that same stream.
//!
//! Both trait methods are infallible by signature. Every failure is folded
//! into the returned record; a deadline trip yields `Pending` for
//! verification and a `"Connection timeout"` error for tool fetches.
//!
//! # Canonical Import Path
//!
//! ```no_run
//! use mcp_probe::mcp::transport::ServerProbe;
//! ```

pub mod http;
pub mod sse;
pub mod stdio;

use crate::error::ProbeError;
use crate::mcp::types::{ConnectivityResult, ServerDefinition, ToolFetchResult, TransportKind};

/// One transport's implementation of the two probing operations.
///
/// Implementations hold only immutable configuration, so one instance can
/// serve any number of concurrent calls. Each call owns its own process
/// handle, stream reader or session state.
#[async_trait::async_trait]
pub trait ServerProbe: Send + Sync + std::fmt::Debug {
    /// Transport variant handled by this probe.
    fn kind(&self) -> TransportKind;

    /// Check that `server` completes the `initialize` handshake.
    async fn verify(&self, server: &ServerDefinition) -> ConnectivityResult;

    /// Run `initialize`, `notifications/initialized` and `tools/list`
    /// against `server` and collect the advertised tools.
    async fn fetch_tools(&self, server: &ServerDefinition) -> ToolFetchResult;
}

/// Fold a verification error into its result record.
///
/// Timeouts are inconclusive and map to `Pending`; every other error is a
/// hard `Failed`.
pub(crate) fn connectivity_from_error(name: &str, err: &ProbeError) -> ConnectivityResult {
    match err {
        ProbeError::Timeout => ConnectivityResult::pending(name, err.to_string()),
        _ => ConnectivityResult::failed(name, err.to_string()),
    }
}

/// The remote URL of `server`, or a configuration error when it is missing.
pub(crate) fn required_url(server: &ServerDefinition) -> Result<&str, ProbeError> {
    server
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            ProbeError::Config(format!("No url specified for {} server", server.transport))
        })
}

/// The launch command of `server`, or a configuration error when it is
/// missing.
pub(crate) fn required_command(server: &ServerDefinition) -> Result<&str, ProbeError> {
    server
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ProbeError::Config("No command specified for stdio server".to_string()))
}
