//! Error types for mcp-probe
//!
//! This module defines the error taxonomy used while probing MCP servers,
//! using `thiserror` for ergonomic error handling. Probing entry points never
//! surface these errors directly; they are folded into `Failed`/`Pending`
//! result records at the transport boundary.

use thiserror::Error;

/// Maximum number of characters of diagnostic output kept in an error
/// message.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Main error type for probe operations
///
/// Variants map onto the failure classes a probe can hit: configuration
/// problems, security rejections, transport failures, protocol errors,
/// timeouts and stream-integrity violations.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration-related errors (missing command or url, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command rejected by the allow-list
    #[error("{0}")]
    CommandRejected(#[from] crate::mcp::allowlist::CommandRejection),

    /// Endpoint rejected by the resolver (cross-origin, bad scheme, unparsable)
    #[error("Endpoint rejected: {0}")]
    EndpointRejected(String),

    /// Generic transport failure (spawn failure, process exit, bad body)
    #[error("{0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Reason phrase or body excerpt
        message: String,
    },

    /// Connection could not be established (refused, DNS, reset)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// JSON-RPC error payload returned by the server
    #[error("JSON-RPC error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },

    /// No terminal signal within the deadline
    #[error("Connection timeout")]
    Timeout,

    /// SSE stream exceeded a hard bound
    #[error("Stream integrity error: {0}")]
    StreamIntegrity(String),

    /// SSE stream ended before the awaited event arrived
    #[error("Stream closed: {0}")]
    StreamClosed(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProbeError {
    /// Returns true for protocol errors that the streamable HTTP fetcher
    /// retries: code `-32600` or a message mentioning a session.
    pub fn is_session_error(&self) -> bool {
        match self {
            ProbeError::Protocol { code, message } => {
                *code == -32600 || message.to_lowercase().contains("session")
            }
            _ => false,
        }
    }

    /// Returns true for transport-level connection failures that the
    /// streamable HTTP fetcher retries.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ProbeError::Connection(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_connect() {
            ProbeError::Connection(err.to_string())
        } else if err.is_timeout() {
            ProbeError::Timeout
        } else if let Some(status) = err.status() {
            ProbeError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            }
        } else {
            ProbeError::Transport(format!("HTTP request failed: {}", err))
        }
    }
}

/// Result type alias for application-level operations (config, CLI)
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for probing internals.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Truncate diagnostic text to [`MAX_DIAGNOSTIC_CHARS`] characters.
///
/// Counts characters rather than bytes so multi-byte output never splits
/// inside a code point. An ellipsis marks truncated text.
pub fn truncate_diagnostic(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_DIAGNOSTIC_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ProbeError::Config("missing command".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing command");
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(ProbeError::Timeout.to_string(), "Connection timeout");
    }

    #[test]
    fn test_protocol_error_display() {
        let error = ProbeError::Protocol {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert_eq!(error.to_string(), "JSON-RPC error -32601: Method not found");
    }

    #[test]
    fn test_session_error_by_code() {
        let error = ProbeError::Protocol {
            code: -32600,
            message: "Bad Request".to_string(),
        };
        assert!(error.is_session_error());
    }

    #[test]
    fn test_session_error_by_message() {
        let error = ProbeError::Protocol {
            code: -32000,
            message: "No valid Session ID provided".to_string(),
        };
        assert!(error.is_session_error());
    }

    #[test]
    fn test_other_protocol_error_is_not_session_error() {
        let error = ProbeError::Protocol {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert!(!error.is_session_error());
        assert!(!ProbeError::Timeout.is_session_error());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(ProbeError::Connection("refused".into()).is_connection_error());
        assert!(!ProbeError::Transport("boom".into()).is_connection_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ProbeError = io_error.into();
        assert!(matches!(error, ProbeError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ProbeError = json_error.into();
        assert!(matches!(error, ProbeError::Serialization(_)));
    }

    #[test]
    fn test_truncate_diagnostic_short_text_unchanged() {
        assert_eq!(truncate_diagnostic("  hello \n"), "hello");
    }

    #[test]
    fn test_truncate_diagnostic_long_text_bounded() {
        let long = "é".repeat(2000);
        let out = truncate_diagnostic(&long);
        assert_eq!(out.chars().count(), MAX_DIAGNOSTIC_CHARS + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProbeError>();
    }
}
