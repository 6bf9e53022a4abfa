//! Streamable HTTP probe for MCP servers
//!
//! Every JSON-RPC message is sent as an HTTP POST. The server may reply
//! with:
//!
//! - `application/json` -- a direct JSON response body
//! - `text/event-stream` -- an SSE stream carrying the JSON-RPC response
//! - `202 Accepted` -- an acknowledgement with no body (notifications)
//!
//! Bodies that arrive without an event-stream content type but start with
//! `event:` or `data:` are parsed as SSE as well.
//!
//! # Session management
//!
//! When a response carries an `Mcp-Session-Id` header, that value is
//! attached to every subsequent request of the same fetch. Sessions are
//! never shared between fetches or retry attempts.
//!
//! # Retries
//!
//! Tool fetches retry up to [`MAX_RETRIES`] times: session errors (JSON-RPC
//! code `-32600`, or a message mentioning a session) back off 500ms per
//! attempt, connection failures back off 1s per attempt. Each attempt gets
//! its own deadline from [`FETCH_ATTEMPT_TIMEOUTS`].

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{truncate_diagnostic, ProbeError, ProbeResult};
use crate::mcp::endpoint::{build_request_context, RequestContext};
use crate::mcp::sse::{SseData, SseReader};
use crate::mcp::transport::{connectivity_from_error, required_url, ServerProbe};
use crate::mcp::types::{
    initialize_request, initialized_notification, into_result, is_response_to,
    server_info_from_result, tools_from_result, tools_list_request, ClientInfo,
    ConnectivityResult, ServerDefinition, ToolDescriptor, ToolFetchResult, TransportKind,
    INITIALIZE_REQUEST_ID, SESSION_HEADER, TOOLS_LIST_REQUEST_ID,
};

/// `Accept` value for POSTs: servers may answer with JSON or an SSE stream.
pub const ACCEPT_JSON_OR_SSE: &str = "application/json, text/event-stream";

/// Deadline of each tool fetch attempt, by attempt index.
pub const FETCH_ATTEMPT_TIMEOUTS: [Duration; 3] = [
    Duration::from_secs(10),
    Duration::from_secs(15),
    Duration::from_secs(20),
];

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 2;

/// Linear backoff unit after a session error.
pub const SESSION_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Linear backoff unit after a connection failure.
pub const CONNECTION_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// What a POST produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct HttpReply {
    /// `Mcp-Session-Id` response header, if present
    pub session_id: Option<String>,
    /// JSON-RPC message from the body; `None` for empty or `202` bodies
    pub message: Option<Value>,
}

/// Probe for streamable HTTP servers.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use mcp_probe::mcp::transport::http::HttpProbe;
/// use mcp_probe::mcp::transport::ServerProbe;
/// use mcp_probe::mcp::types::{ClientInfo, ServerDefinition, TransportKind};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let probe = HttpProbe::new(ClientInfo::default(), Duration::from_secs(10))?;
/// let server = ServerDefinition::remote("remote", TransportKind::Http, "http://localhost:3000/mcp");
/// let tools = probe.fetch_tools(&server).await;
/// println!("{} tools", tools.tools.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    client: ClientInfo,
    verify_timeout: Duration,
}

impl HttpProbe {
    /// Create a probe with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] if the HTTP client cannot be built.
    pub fn new(client: ClientInfo, verify_timeout: Duration) -> ProbeResult<Self> {
        Ok(Self::with_http_client(
            build_http_client()?,
            client,
            verify_timeout,
        ))
    }

    /// Create a probe sharing an existing HTTP client.
    pub fn with_http_client(
        http: reqwest::Client,
        client: ClientInfo,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            http,
            client,
            verify_timeout,
        }
    }

    async fn initialize(&self, ctx: &RequestContext) -> ProbeResult<(Value, Option<String>)> {
        let reply = post_message(
            &self.http,
            ctx,
            None,
            &initialize_request(&self.client),
            INITIALIZE_REQUEST_ID,
        )
        .await?;
        let message = reply.message.ok_or_else(|| no_response("initialize"))?;
        Ok((into_result(message)?, reply.session_id))
    }

    async fn verify_once(&self, server: &ServerDefinition) -> ProbeResult<(Value, Option<String>)> {
        let ctx = build_request_context(required_url(server)?, &server.headers)?;
        let (result, session_id) = tokio::time::timeout(self.verify_timeout, self.initialize(&ctx))
            .await
            .map_err(|_| ProbeError::Timeout)??;
        if let Some(id) = &session_id {
            tracing::debug!(server = %server.name, session_id = %id, "Server assigned MCP session");
        }
        Ok((result, session_id))
    }

    async fn fetch_once(&self, ctx: &RequestContext) -> ProbeResult<Vec<ToolDescriptor>> {
        let (_, mut session_id) = self.initialize(ctx).await?;
        if let Some(id) = &session_id {
            tracing::debug!(session_id = %id, "MCP session established");
        }

        match post_notification(&self.http, ctx, session_id.as_deref(), &initialized_notification())
            .await
        {
            Ok(Some(id)) => session_id = Some(id),
            Ok(None) => {}
            Err(e) => tracing::warn!("initialized notification failed: {}", e),
        }

        let reply = post_message(
            &self.http,
            ctx,
            session_id.as_deref(),
            &tools_list_request(),
            TOOLS_LIST_REQUEST_ID,
        )
        .await?;
        let message = reply.message.ok_or_else(|| no_response("tools/list"))?;
        let result = into_result(message)?;
        Ok(tools_from_result(&result))
    }
}

#[async_trait::async_trait]
impl ServerProbe for HttpProbe {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn verify(&self, server: &ServerDefinition) -> ConnectivityResult {
        let name = server.name.as_str();
        match self.verify_once(server).await {
            Ok((result, _)) => ConnectivityResult::connected(name, server_info_from_result(&result)),
            Err(e) => {
                tracing::warn!(server = name, "HTTP verification failed: {}", e);
                connectivity_from_error(name, &e)
            }
        }
    }

    async fn fetch_tools(&self, server: &ServerDefinition) -> ToolFetchResult {
        let name = server.name.as_str();
        let kind = TransportKind::Http;
        let ctx = match required_url(server)
            .and_then(|url| build_request_context(url, &server.headers))
        {
            Ok(ctx) => ctx,
            Err(e) => return ToolFetchResult::err(name, kind, e.to_string()),
        };

        let mut attempt: u32 = 0;
        loop {
            let deadline = FETCH_ATTEMPT_TIMEOUTS[(attempt as usize).min(FETCH_ATTEMPT_TIMEOUTS.len() - 1)];
            let outcome = tokio::time::timeout(deadline, self.fetch_once(&ctx))
                .await
                .unwrap_or(Err(ProbeError::Timeout));

            let backoff = match &outcome {
                Ok(_) => None,
                Err(e) if e.is_session_error() => Some(SESSION_RETRY_BACKOFF),
                Err(e) if e.is_connection_error() => Some(CONNECTION_RETRY_BACKOFF),
                Err(_) => None,
            };

            match (outcome, backoff) {
                (Ok(tools), _) => return ToolFetchResult::ok(name, kind, tools),
                (Err(e), Some(unit)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        server = name,
                        attempt,
                        "HTTP tool fetch failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(unit * attempt).await;
                }
                (Err(e), _) => {
                    tracing::warn!(server = name, "HTTP tool fetch failed: {}", e);
                    return ToolFetchResult::err(name, kind, e.to_string());
                }
            }
        }
    }
}

/// Build the HTTP client shared by the network probes.
///
/// # Errors
///
/// Returns [`ProbeError::Transport`] if TLS initialisation fails.
pub fn build_http_client() -> ProbeResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProbeError::Transport(format!("Failed to build HTTP client: {}", e)))
}

fn no_response(method: &str) -> ProbeError {
    ProbeError::Transport(format!("Server returned no JSON-RPC response to {}", method))
}

/// POST a request and read the response carrying `expect_id`.
pub(crate) async fn post_message(
    http: &reqwest::Client,
    ctx: &RequestContext,
    session_id: Option<&str>,
    message: &Value,
    expect_id: u64,
) -> ProbeResult<HttpReply> {
    let response = send_post(http, ctx, session_id, message).await?;
    let session_id = session_header(response.headers());

    if response.status() == StatusCode::ACCEPTED {
        return Ok(HttpReply {
            session_id,
            message: None,
        });
    }

    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with("text/event-stream"))
        .unwrap_or(false);

    let message = if is_event_stream {
        let mut reader = SseReader::new(Box::pin(response.bytes_stream()));
        Some(wait_for_response(&mut reader, expect_id).await?)
    } else {
        let body = response.bytes().await?;
        parse_body(body, expect_id).await?
    };

    Ok(HttpReply {
        session_id,
        message,
    })
}

/// POST a notification. Returns the session id header, if any.
pub(crate) async fn post_notification(
    http: &reqwest::Client,
    ctx: &RequestContext,
    session_id: Option<&str>,
    message: &Value,
) -> ProbeResult<Option<String>> {
    let response = send_post(http, ctx, session_id, message).await?;
    Ok(session_header(response.headers()))
}

async fn send_post(
    http: &reqwest::Client,
    ctx: &RequestContext,
    session_id: Option<&str>,
    message: &Value,
) -> ProbeResult<reqwest::Response> {
    let mut headers = protocol_headers(&ctx.headers, ACCEPT_JSON_OR_SSE, session_id)?;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let response = http
        .post(ctx.url.clone())
        .headers(headers)
        .json(message)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    Ok(response)
}

/// Configured headers with the protocol's own `Accept` and session header
/// replacing any configured values of the same name.
pub(crate) fn protocol_headers(
    configured: &HeaderMap,
    accept: &'static str,
    session_id: Option<&str>,
) -> ProbeResult<HeaderMap> {
    let mut headers = configured.clone();
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    if let Some(id) = session_id {
        let name = HeaderName::from_bytes(SESSION_HEADER.as_bytes())
            .map_err(|e| ProbeError::Transport(format!("invalid session header name: {}", e)))?;
        let value = HeaderValue::from_str(id)
            .map_err(|_| ProbeError::Transport("server sent an invalid session id".to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Error for a non-2xx response.
///
/// A body holding a JSON-RPC `error` becomes [`ProbeError::Protocol`] so
/// session failures reported as `400` stay retryable; any other body is
/// kept as an HTTP diagnostic.
fn status_error(status: StatusCode, body: &str) -> ProbeError {
    if let Ok(message) = serde_json::from_str::<Value>(body.trim()) {
        if message.get("error").is_some() {
            if let Err(e) = into_result(message) {
                return e;
            }
        }
    }
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        truncate_diagnostic(body)
    };
    ProbeError::Http {
        status: status.as_u16(),
        message,
    }
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a fully read response body.
///
/// Empty bodies yield `None`. Bodies that start like SSE frames are parsed
/// as SSE; anything else must be a JSON value.
async fn parse_body(body: Bytes, expect_id: u64) -> ProbeResult<Option<Value>> {
    let text = String::from_utf8_lossy(&body);
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with("event:") || trimmed.starts_with("data:") {
        let chunks = futures::stream::iter([Ok::<_, Infallible>(body.clone())]);
        let mut reader = SseReader::new(chunks);
        return wait_for_response(&mut reader, expect_id).await.map(Some);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::debug!("Response body is not JSON: {}", e);
            Ok(None)
        }
    }
}

/// Wait on `reader` for the JSON-RPC response carrying `expect_id`.
pub(crate) async fn wait_for_response<S, E>(
    reader: &mut SseReader<S>,
    expect_id: u64,
) -> ProbeResult<Value>
where
    S: futures::Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let event = reader
        .wait_for_event(|event| {
            event
                .json()
                .map(|message| is_response_to(message, expect_id))
                .unwrap_or(false)
        })
        .await?;
    match event.data {
        Some(SseData::Json(message)) => Ok(message),
        _ => Err(no_response("request")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_body_json() {
        let body = Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        let message = parse_body(body, 1).await.unwrap().unwrap();
        assert!(is_response_to(&message, 1));
    }

    #[tokio::test]
    async fn test_parse_body_empty_and_non_json() {
        assert!(parse_body(Bytes::new(), 1).await.unwrap().is_none());
        assert!(parse_body(Bytes::from_static(b"Accepted"), 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_parse_body_sniffs_sse_frames() {
        let body = Bytes::from_static(
            b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\nevent: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n",
        );
        let message = parse_body(body, 2).await.unwrap().unwrap();
        assert!(is_response_to(&message, 2));
    }

    #[tokio::test]
    async fn test_parse_body_sse_without_match_is_error() {
        let body = Bytes::from_static(b"data: {\"jsonrpc\":\"2.0\",\"id\":9,\"result\":{}}\n\n");
        let err = parse_body(body, 1).await.unwrap_err();
        assert!(matches!(err, ProbeError::StreamClosed(_)));
    }

    #[test]
    fn test_session_header_extraction() {
        let mut headers = HeaderMap::new();
        assert!(session_header(&headers).is_none());
        headers.insert(
            reqwest::header::HeaderName::from_bytes(SESSION_HEADER.as_bytes()).unwrap(),
            "abc-123".parse().unwrap(),
        );
        assert_eq!(session_header(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_status_error_keeps_json_rpc_error() {
        let body = r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Bad Request: No valid session ID provided"},"id":null}"#;
        let err = status_error(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ProbeError::Protocol { code: -32000, .. }));
        assert!(err.is_session_error());
    }

    #[test]
    fn test_status_error_plain_body_is_http_error() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, ProbeError::Http { status: 502, ref message } if message == "upstream down"));
        let err = status_error(StatusCode::NOT_FOUND, "  ");
        assert!(matches!(err, ProbeError::Http { status: 404, ref message } if message == "Not Found"));
        let err = status_error(StatusCode::BAD_REQUEST, r#"{"detail":"nope"}"#);
        assert!(matches!(err, ProbeError::Http { status: 400, .. }));
    }

    #[test]
    fn test_protocol_headers_replace_configured_values() {
        let mut configured = HeaderMap::new();
        configured.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        configured.insert(
            HeaderName::from_bytes(SESSION_HEADER.as_bytes()).unwrap(),
            HeaderValue::from_static("stale"),
        );
        configured.insert("x-api-key", HeaderValue::from_static("k"));

        let headers = protocol_headers(&configured, ACCEPT_JSON_OR_SSE, Some("fresh")).unwrap();

        let accept: Vec<_> = headers.get_all(ACCEPT).iter().collect();
        assert_eq!(accept, vec![ACCEPT_JSON_OR_SSE]);
        let session: Vec<_> = headers.get_all(SESSION_HEADER).iter().collect();
        assert_eq!(session, vec!["fresh"]);
        assert_eq!(headers.get("x-api-key").unwrap(), "k");
    }

    #[test]
    fn test_protocol_headers_reject_invalid_session_id() {
        let err = protocol_headers(&HeaderMap::new(), ACCEPT_JSON_OR_SSE, Some("bad\nid")).unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[test]
    fn test_attempt_timeouts_escalate() {
        assert_eq!(FETCH_ATTEMPT_TIMEOUTS.len() as u32, MAX_RETRIES + 1);
        assert!(FETCH_ATTEMPT_TIMEOUTS.windows(2).all(|w| w[0] < w[1]));
    }
}
