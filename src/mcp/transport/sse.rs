//! Legacy SSE probe for MCP servers
//!
//! The legacy transport splits each connection in two:
//!
//! 1. A long-lived GET request whose response is an event stream. Its first
//!    interesting event is `endpoint`, whose data is the URL to POST
//!    requests to.
//! 2. POSTs of JSON-RPC messages to that endpoint. A server may answer in
//!    the POST body or, more commonly, acknowledge with `202` and deliver
//!    the response as a `message` event on the GET stream.
//!
//! One [`SseReader`] is created for the GET response and reused for the
//! whole lifecycle, so no frame is lost or seen twice between the endpoint
//! wait and the response waits. The announced endpoint must have the same
//! origin as the GET URL; anything else is rejected before any request is
//! sent to it.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use crate::error::{ProbeError, ProbeResult};
use crate::mcp::endpoint::{build_request_context, resolve_endpoint_url, RequestContext};
use crate::mcp::sse::{SseData, SseReader};
use crate::mcp::transport::http::{
    post_message, post_notification, protocol_headers, wait_for_response,
};
use crate::mcp::transport::{connectivity_from_error, required_url, ServerProbe};
use crate::mcp::types::{
    initialize_request, initialized_notification, into_result, is_response_to,
    server_info_from_result, tools_from_result, tools_list_request, ClientInfo,
    ConnectivityResult, ServerDefinition, ServerInfo, ToolDescriptor, ToolFetchResult,
    TransportKind, INITIALIZE_REQUEST_ID, TOOLS_LIST_REQUEST_ID,
};

/// Event name announcing the POST endpoint.
pub const ENDPOINT_EVENT: &str = "endpoint";

type EventStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Probe for legacy SSE servers.
#[derive(Debug, Clone)]
pub struct SseProbe {
    http: reqwest::Client,
    client: ClientInfo,
    verify_timeout: Duration,
    fetch_timeout: Duration,
}

/// An open legacy SSE connection: the event stream plus its POST target.
#[derive(Debug)]
struct SseSession {
    reader: SseReader<EventStream>,
    post: RequestContext,
}

impl SseSession {
    /// Open the event stream and wait for the endpoint announcement.
    async fn open(http: &reqwest::Client, ctx: &RequestContext) -> ProbeResult<Self> {
        let headers = protocol_headers(&ctx.headers, "text/event-stream", None)?;
        let response = http.get(ctx.url.clone()).headers(headers).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        let stream: EventStream = Box::pin(response.bytes_stream());
        let mut reader = SseReader::new(stream);
        let event = reader.wait_for_event(|e| e.is(ENDPOINT_EVENT)).await?;
        let candidate = match &event.data {
            Some(SseData::Text(text)) => text.trim().to_string(),
            _ => {
                return Err(ProbeError::Transport(
                    "endpoint event carried no URL".to_string(),
                ))
            }
        };
        let endpoint = resolve_endpoint_url(&candidate, &ctx.url)?;
        tracing::debug!(endpoint = %endpoint, "SSE endpoint announced");

        Ok(Self {
            reader,
            post: RequestContext {
                url: endpoint,
                headers: ctx.headers.clone(),
            },
        })
    }

    /// POST a request and read its response from the body or the stream.
    async fn request(&mut self, http: &reqwest::Client, message: &Value, id: u64) -> ProbeResult<Value> {
        let reply = post_message(http, &self.post, None, message, id).await?;
        let response = match reply.message {
            Some(body) if is_response_to(&body, id) => body,
            _ => wait_for_response(&mut self.reader, id).await?,
        };
        into_result(response)
    }

    async fn notify(&mut self, http: &reqwest::Client, message: &Value) -> ProbeResult<()> {
        post_notification(http, &self.post, None, message).await?;
        Ok(())
    }
}

impl SseProbe {
    /// Create a probe sharing an existing HTTP client.
    pub fn new(
        http: reqwest::Client,
        client: ClientInfo,
        verify_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            http,
            client,
            verify_timeout,
            fetch_timeout,
        }
    }

    async fn handshake(&self, ctx: &RequestContext) -> ProbeResult<(SseSession, Value)> {
        let mut session = SseSession::open(&self.http, ctx).await?;
        let result = session
            .request(&self.http, &initialize_request(&self.client), INITIALIZE_REQUEST_ID)
            .await?;
        Ok((session, result))
    }

    async fn verify_once(&self, server: &ServerDefinition) -> ProbeResult<Option<ServerInfo>> {
        let ctx = build_request_context(required_url(server)?, &server.headers)?;
        let (_, result) = tokio::time::timeout(self.verify_timeout, self.handshake(&ctx))
            .await
            .map_err(|_| ProbeError::Timeout)??;
        Ok(server_info_from_result(&result))
    }

    async fn fetch_once(&self, ctx: &RequestContext) -> ProbeResult<Vec<ToolDescriptor>> {
        let (mut session, _) = self.handshake(ctx).await?;

        if let Err(e) = session.notify(&self.http, &initialized_notification()).await {
            tracing::warn!("initialized notification failed: {}", e);
        }

        let result = session
            .request(&self.http, &tools_list_request(), TOOLS_LIST_REQUEST_ID)
            .await?;
        Ok(tools_from_result(&result))
    }
}

#[async_trait::async_trait]
impl ServerProbe for SseProbe {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn verify(&self, server: &ServerDefinition) -> ConnectivityResult {
        let name = server.name.as_str();
        match self.verify_once(server).await {
            Ok(info) => ConnectivityResult::connected(name, info),
            Err(e) => {
                tracing::warn!(server = name, "SSE verification failed: {}", e);
                connectivity_from_error(name, &e)
            }
        }
    }

    async fn fetch_tools(&self, server: &ServerDefinition) -> ToolFetchResult {
        let name = server.name.as_str();
        let kind = TransportKind::Sse;
        let outcome = match required_url(server)
            .and_then(|url| build_request_context(url, &server.headers))
        {
            Ok(ctx) => tokio::time::timeout(self.fetch_timeout, self.fetch_once(&ctx))
                .await
                .unwrap_or(Err(ProbeError::Timeout)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(tools) => ToolFetchResult::ok(name, kind, tools),
            Err(e) => {
                tracing::warn!(server = name, "SSE tool fetch failed: {}", e);
                ToolFetchResult::err(name, kind, e.to_string())
            }
        }
    }
}
