//! Probe facade dispatching on transport kind
//!
//! [`McpProbe`] is constructed once from a [`ProbeConfig`] and holds one
//! [`ServerProbe`] per transport. It owns no per-call state: every
//! verification or fetch creates its own process handle or connection, so
//! any number of calls may run concurrently.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::config::ProbeConfig;
use crate::error::Result;
use crate::mcp::transport::http::{build_http_client, HttpProbe};
use crate::mcp::transport::sse::SseProbe;
use crate::mcp::transport::stdio::StdioProbe;
use crate::mcp::transport::ServerProbe;
use crate::mcp::types::{ConnectivityResult, ServerDefinition, ToolFetchResult, TransportKind};

/// Connectivity checker and tool lister for MCP servers.
///
/// # Examples
///
/// ```no_run
/// use mcp_probe::config::ProbeConfig;
/// use mcp_probe::mcp::probe::McpProbe;
/// use mcp_probe::mcp::types::{ServerDefinition, TransportKind};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let probe = McpProbe::new(&ProbeConfig::default())?;
/// let servers = vec![
///     ServerDefinition::stdio("fs", "npx", vec!["-y".into(), "server-fs".into()]),
///     ServerDefinition::remote("api", TransportKind::Http, "https://mcp.example.com/mcp"),
/// ];
/// for result in probe.verify_all(&servers).await {
///     println!("{}: {}", result.name, result.status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct McpProbe {
    stdio: Arc<dyn ServerProbe>,
    http: Arc<dyn ServerProbe>,
    sse: Arc<dyn ServerProbe>,
    concurrency: usize,
}

impl McpProbe {
    /// Build the per-transport probes from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = config.client_info();
        let timeouts = &config.timeouts;
        let http_client = build_http_client()?;

        Ok(Self {
            stdio: Arc::new(StdioProbe::new(
                client.clone(),
                config.allowlist(),
                timeouts.stdio_verify(),
                timeouts.stdio_fetch(),
                timeouts.kill_grace(),
            )),
            http: Arc::new(HttpProbe::with_http_client(
                http_client.clone(),
                client.clone(),
                timeouts.http_verify(),
            )),
            sse: Arc::new(SseProbe::new(
                http_client,
                client,
                timeouts.sse_verify(),
                timeouts.sse_fetch(),
            )),
            concurrency: config.concurrency.max(1),
        })
    }

    fn probe_for(&self, kind: TransportKind) -> &dyn ServerProbe {
        match kind {
            TransportKind::Stdio => self.stdio.as_ref(),
            TransportKind::Http => self.http.as_ref(),
            TransportKind::Sse => self.sse.as_ref(),
        }
    }

    /// Verify that one server completes the `initialize` handshake.
    pub async fn verify(&self, server: &ServerDefinition) -> ConnectivityResult {
        tracing::debug!(server = %server.name, transport = %server.transport, "Verifying MCP server");
        let result = self.probe_for(server.transport).verify(server).await;
        tracing::info!(server = %result.name, status = %result.status, "Verification finished");
        result
    }

    /// List the tools one server exposes.
    pub async fn fetch_tools(&self, server: &ServerDefinition) -> ToolFetchResult {
        tracing::debug!(server = %server.name, transport = %server.transport, "Fetching MCP tools");
        let result = self.probe_for(server.transport).fetch_tools(server).await;
        tracing::info!(
            server = %result.name,
            tools = result.tools.len(),
            error = result.error.is_some(),
            "Tool fetch finished"
        );
        result
    }

    /// Verify every server, at most `concurrency` at a time.
    ///
    /// Results are returned in input order.
    pub async fn verify_all(&self, servers: &[ServerDefinition]) -> Vec<ConnectivityResult> {
        stream::iter(servers)
            .map(|server| self.verify(server))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Fetch tools from every server, at most `concurrency` at a time.
    ///
    /// Results are returned in input order.
    pub async fn fetch_all(&self, servers: &[ServerDefinition]) -> Vec<ToolFetchResult> {
        stream::iter(servers)
            .map(|server| self.fetch_tools(server))
            .buffered(self.concurrency)
            .collect()
            .await
    }
}
