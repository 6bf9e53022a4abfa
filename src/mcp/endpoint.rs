//! Endpoint resolution and header sanitization for network transports
//!
//! - [`resolve_endpoint_url`] resolves the POST target a legacy SSE server
//!   announces and refuses anything that leaves the original origin or uses a
//!   non-HTTP scheme. A compromised server cannot redirect the probe to an
//!   internal address.
//! - [`sanitize_headers`] drops configuration headers that would interfere
//!   with HTTP framing or proxy authentication.
//! - [`build_request_context`] combines both with relocation of an
//!   `Authorization` value embedded in the URL query string into a header.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use crate::error::{ProbeError, ProbeResult};

/// Header names never forwarded from configuration (compared lowercase).
pub const FORBIDDEN_HEADERS: &[&str] = &[
    "host",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "proxy-authorization",
    "te",
    "trailer",
];

/// Resolve a possibly-relative endpoint against the connection origin.
///
/// # Errors
///
/// Returns [`ProbeError::EndpointRejected`] if the candidate cannot be
/// parsed, resolves to a scheme other than `http`/`https`, or resolves to a
/// different origin (scheme, host, port) than `origin_url`.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use mcp_probe::mcp::endpoint::resolve_endpoint_url;
///
/// let origin = Url::parse("https://a.test/sse").unwrap();
/// let url = resolve_endpoint_url("/msg?id=1", &origin).unwrap();
/// assert_eq!(url.as_str(), "https://a.test/msg?id=1");
/// assert!(resolve_endpoint_url("https://evil.test/x", &origin).is_err());
/// ```
pub fn resolve_endpoint_url(candidate: &str, origin_url: &Url) -> ProbeResult<Url> {
    let candidate = candidate.trim();
    let resolved = origin_url
        .join(candidate)
        .map_err(|e| ProbeError::EndpointRejected(format!("invalid endpoint: {}", e)))?;

    if !matches!(resolved.scheme(), "http" | "https") {
        return Err(ProbeError::EndpointRejected(format!(
            "unsupported scheme '{}'",
            resolved.scheme()
        )));
    }

    if resolved.origin() != origin_url.origin() {
        tracing::warn!(
            expected = %origin_url.origin().ascii_serialization(),
            actual = %resolved.origin().ascii_serialization(),
            "Refusing cross-origin MCP endpoint"
        );
        return Err(ProbeError::EndpointRejected(format!(
            "endpoint origin {} does not match server origin {}",
            resolved.origin().ascii_serialization(),
            origin_url.origin().ascii_serialization()
        )));
    }

    Ok(resolved)
}

/// Keep only configuration headers that are safe to send.
///
/// Drops forbidden names (see [`FORBIDDEN_HEADERS`]), non-string values, and
/// names or values that are not valid HTTP header tokens (which also blocks
/// CR/LF injection).
pub fn sanitize_headers(raw: &HashMap<String, Value>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in raw {
        let lower = name.to_ascii_lowercase();
        if FORBIDDEN_HEADERS.contains(&lower.as_str()) {
            tracing::debug!(header = %name, "Dropping forbidden header");
            continue;
        }
        let Some(text) = value.as_str() else {
            tracing::debug!(header = %name, "Dropping non-string header value");
            continue;
        };
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_str(text),
        ) else {
            tracing::debug!(header = %name, "Dropping malformed header");
            continue;
        };
        headers.insert(name, value);
    }
    headers
}

/// URL and headers ready for a request to an MCP server.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Target URL with any embedded credentials removed
    pub url: Url,
    /// Sanitized headers, including a relocated `Authorization` value
    pub headers: HeaderMap,
}

/// Parse `url`, sanitize `headers`, and relocate an `Authorization` query
/// parameter into a header.
///
/// The query parameter name is matched case-insensitively. An explicitly
/// configured `Authorization` header takes precedence over the URL value;
/// the URL value is stripped either way.
///
/// # Errors
///
/// Returns [`ProbeError::Config`] if `url` does not parse or is not
/// `http`/`https`.
pub fn build_request_context(url: &str, headers: &HashMap<String, Value>) -> ProbeResult<RequestContext> {
    let mut url = Url::parse(url.trim())
        .map_err(|e| ProbeError::Config(format!("invalid server url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProbeError::Config(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }

    let mut headers = sanitize_headers(headers);

    let mut embedded_auth: Option<String> = None;
    let mut kept: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        if key.eq_ignore_ascii_case("authorization") {
            embedded_auth = Some(value.into_owned());
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }

    if let Some(auth) = embedded_auth {
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        if headers.contains_key(AUTHORIZATION) {
            tracing::debug!("Authorization header configured; ignoring url-embedded value");
        } else {
            match HeaderValue::from_str(&auth) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Dropping malformed url-embedded Authorization value"),
            }
        }
    }

    Ok(RequestContext { url, headers })
}
