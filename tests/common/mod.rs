use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use mcp_probe::mcp::allowlist::CommandAllowlist;
use mcp_probe::mcp::transport::stdio::StdioProbe;
use mcp_probe::mcp::types::ClientInfo;

/// Returns the path to the `mcp_test_server` binary.
///
/// Cargo sets `CARGO_BIN_EXE_mcp_test_server` when building integration
/// tests of this package.
#[allow(dead_code)]
pub fn test_server_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mcp_test_server"))
}

/// A stdio probe that also allows `echo`, `sh` and the test server.
#[allow(dead_code)]
pub fn stdio_probe(verify_timeout: Duration) -> StdioProbe {
    stdio_probe_with_timeouts(verify_timeout, Duration::from_secs(10))
}

#[allow(dead_code)]
pub fn stdio_probe_with_timeouts(verify_timeout: Duration, fetch_timeout: Duration) -> StdioProbe {
    let allowlist = CommandAllowlist::default()
        .with_command("echo")
        .with_command("sh")
        .with_command("mcp_test_server");
    StdioProbe::new(
        ClientInfo::default(),
        allowlist,
        verify_timeout,
        fetch_timeout,
        Duration::from_millis(200),
    )
}

/// Returns true while a process with `pid` exists (zombies included).
#[cfg(unix)]
#[allow(dead_code)]
pub fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Wait up to `limit` for `pid` to be reaped.
#[cfg(unix)]
#[allow(dead_code)]
pub async fn wait_for_process_gone(pid: i32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        // Yield to the runtime so the supervisor task can reap the child.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_exists(pid)
}

/// Read the pid the test server wrote to `path`.
#[allow(dead_code)]
pub fn read_pid(path: &std::path::Path) -> i32 {
    fs::read_to_string(path)
        .expect("pid file should exist")
        .trim()
        .parse()
        .expect("pid file should hold a number")
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("mcp-probe.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
