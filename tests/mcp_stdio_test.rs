//! MCP stdio probe integration tests
//!
//! Exercises `StdioProbe` against real child processes: `echo`, `sh`, and
//! the `mcp_test_server` helper binary, whose behaviour is selected with
//! `MCP_TEST_SERVER_MODE`.

mod common;

use std::time::{Duration, Instant};

use mcp_probe::mcp::transport::ServerProbe;
use mcp_probe::mcp::types::{ConnectionStatus, ServerDefinition, TransportKind};

use common::{stdio_probe, stdio_probe_with_timeouts, test_server_exe};

fn test_server(mode: &str) -> ServerDefinition {
    ServerDefinition::stdio(
        "test-server",
        test_server_exe().to_string_lossy().to_string(),
        vec![],
    )
    .with_env("MCP_TEST_SERVER_MODE", mode)
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_echo_response_is_connected_without_server_info() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio(
        "echo",
        "echo",
        vec![r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string()],
    );

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    assert!(result.server_info.is_none());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_disallowed_command_is_rejected_before_spawn() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio("evil", "curl", vec!["http://evil/payload".to_string()]);

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Failed);
    assert!(result.error.unwrap().contains("not in the allowed list"));
}

#[tokio::test]
async fn test_path_prefixed_disallowed_command_is_rejected() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio("evil", "../../bin/rm", vec!["-rf".to_string()]);

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Failed);
    assert!(result.error.unwrap().contains("not in the allowed list"));
}

#[tokio::test]
async fn test_test_server_reports_server_info() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.verify(&test_server("normal")).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    let info = result.server_info.expect("serverInfo should be scraped");
    assert_eq!(info.name, "mcp-test-server");
    assert_eq!(info.version, "0.1.0");
}

#[tokio::test]
async fn test_banner_before_response_still_connects() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.verify(&test_server("banner")).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    assert_eq!(result.server_info.unwrap().name, "mcp-test-server");
}

#[tokio::test]
async fn test_nonzero_exit_is_failed_with_diagnostics() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.verify(&test_server("crash")).await;

    assert_eq!(result.status, ConnectionStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.contains("code 3"), "unexpected error: {error}");
    assert!(error.contains("missing API key"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_clean_exit_without_output_is_pending() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.verify(&test_server("silent")).await;

    assert_eq!(result.status, ConnectionStatus::Pending);
}

#[tokio::test]
async fn test_unresponsive_server_times_out_as_pending() {
    let probe = stdio_probe(Duration::from_millis(500));
    let started = Instant::now();

    let result = probe.verify(&test_server("hang")).await;

    assert_eq!(result.status, ConnectionStatus::Pending);
    assert_eq!(result.error.as_deref(), Some("Connection timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn test_verify_timeout_reaps_server_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("server.pid");
    let probe = stdio_probe(Duration::from_millis(500));
    let server = test_server("hang").with_env(
        "MCP_TEST_SERVER_PID_FILE",
        pid_file.to_string_lossy().to_string(),
    );

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Pending);
    let pid = common::read_pid(&pid_file);
    assert!(
        common::wait_for_process_gone(pid, Duration::from_secs(5)).await,
        "server process {pid} still running after verify returned"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_connected_verify_reaps_server_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("server.pid");
    let probe = stdio_probe(Duration::from_secs(10));
    let server = test_server("normal").with_env(
        "MCP_TEST_SERVER_PID_FILE",
        pid_file.to_string_lossy().to_string(),
    );

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    let pid = common::read_pid(&pid_file);
    assert!(common::wait_for_process_gone(pid, Duration::from_secs(5)).await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_response_after_large_log_output_is_connected() {
    let probe = stdio_probe(Duration::from_secs(5));
    let server = ServerDefinition::stdio(
        "noisy",
        "sh",
        vec![
            "-c".to_string(),
            r#"head -c 1100000 /dev/zero | tr '\0' x; echo; sleep 1; echo '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"noisy","version":"1"}}}'; sleep 10"#
                .to_string(),
        ],
    );

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    assert_eq!(result.server_info.unwrap().name, "noisy");
}

#[tokio::test]
async fn test_spawn_failure_is_failed() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio("missing", "/nonexistent/dir/node", vec![]);

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Failed);
    assert!(result.error.unwrap().contains("Failed to spawn"));
}

#[tokio::test]
async fn test_server_env_is_applied() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio(
        "env",
        "sh",
        vec![
            "-c".to_string(),
            r#"printf '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"%s","version":"1"}}}\n' "$PROBE_NAME""#
                .to_string(),
        ],
    )
    .with_env("PROBE_NAME", "from-env");

    let result = probe.verify(&server).await;

    assert_eq!(result.status, ConnectionStatus::Connected);
    assert_eq!(result.server_info.unwrap().name, "from-env");
}

// ---------------------------------------------------------------------------
// fetch_tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_tools_from_test_server() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.fetch_tools(&test_server("normal")).await;

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    assert_eq!(result.server_type, Some(TransportKind::Stdio));
    let names: Vec<_> = result.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add"]);
    assert_eq!(result.tools[0].description.as_deref(), Some("Echoes input"));
    assert!(result.tools[0].input_schema.is_some());
}

#[tokio::test]
async fn test_fetch_tools_reports_initialize_error() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.fetch_tools(&test_server("reject")).await;

    assert!(result.tools.is_empty());
    let error = result.error.unwrap();
    assert!(error.contains("-32602"), "unexpected error: {error}");
    assert!(error.contains("Unsupported protocol version"));
}

#[tokio::test]
async fn test_fetch_tools_reports_early_exit() {
    let probe = stdio_probe(Duration::from_secs(10));

    let result = probe.fetch_tools(&test_server("crash")).await;

    let error = result.error.unwrap();
    assert!(error.contains("code 3"), "unexpected error: {error}");
    assert!(error.contains("initialize"), "unexpected error: {error}");
}

#[tokio::test]
async fn test_fetch_tools_rejected_command() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio("evil", "curl", vec![]);

    let result = probe.fetch_tools(&server).await;

    assert!(result.tools.is_empty());
    assert!(result.error.unwrap().contains("not in the allowed list"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_fetch_timeout_reaps_server_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let pid_file = dir.path().join("server.pid");
    let probe = stdio_probe_with_timeouts(Duration::from_secs(10), Duration::from_millis(500));
    let server = test_server("hang").with_env(
        "MCP_TEST_SERVER_PID_FILE",
        pid_file.to_string_lossy().to_string(),
    );

    let result = probe.fetch_tools(&server).await;

    assert_eq!(result.error.as_deref(), Some("Connection timeout"));
    let pid = common::read_pid(&pid_file);
    assert!(common::wait_for_process_gone(pid, Duration::from_secs(5)).await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_fetch_fails_on_unbounded_line() {
    let probe = stdio_probe(Duration::from_secs(10));
    let server = ServerDefinition::stdio(
        "flood",
        "sh",
        vec![
            "-c".to_string(),
            r#"head -c 1100000 /dev/zero | tr '\0' x; sleep 10"#.to_string(),
        ],
    );
    let started = Instant::now();

    let result = probe.fetch_tools(&server).await;

    assert!(result.tools.is_empty());
    let error = result.error.unwrap();
    assert!(error.contains("Stream integrity"), "unexpected error: {error}");
    assert!(started.elapsed() < Duration::from_secs(8));
}
