//! Stdio probe for MCP child-process servers
//!
//! [`StdioProbe`] validates the launch command against the allow-list,
//! spawns the server through [`ProcessHandle`], and speaks newline-delimited
//! JSON-RPC over its stdin/stdout pipes. Stderr is kept only as a bounded
//! diagnostic tail.
//!
//! # Verification
//!
//! The `initialize` request is written as soon as the process starts. Each
//! stdout chunk is scanned as it arrives, and the first one that looks like
//! JSON-RPC (contains `"jsonrpc"` or `"result"`) settles the probe as
//! `Connected`; `serverInfo` is then scraped from the accumulated output or,
//! once that is full, from the chunk itself. A nonzero exit without such output
//! is `Failed`; a clean exit without output is `Pending`, since slow
//! starters are indistinguishable from silent ones.
//!
//! # Tool fetch
//!
//! Stdout is split into lines and each JSON line is matched against the
//! outstanding request id. The [`FetchStep`] state machine makes sure a line
//! is only ever read as the answer to the request currently in flight.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::{truncate_diagnostic, ProbeError, ProbeResult};
use crate::mcp::allowlist::CommandAllowlist;
use crate::mcp::process::{Completion, ProcessEvent, ProcessHandle, MAX_STDOUT_BYTES};
use crate::mcp::server_info::extract_server_info;
use crate::mcp::transport::{required_command, ServerProbe};
use crate::mcp::types::{
    initialize_request, initialized_notification, into_result, is_response_to, to_line,
    tools_from_result, tools_list_request, ClientInfo, ConnectivityResult, ServerDefinition,
    ToolDescriptor, ToolFetchResult, TransportKind, INITIALIZE_REQUEST_ID, TOOLS_LIST_REQUEST_ID,
};

/// Probe for servers launched as local processes.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use mcp_probe::mcp::allowlist::CommandAllowlist;
/// use mcp_probe::mcp::transport::stdio::StdioProbe;
/// use mcp_probe::mcp::transport::ServerProbe;
/// use mcp_probe::mcp::types::{ClientInfo, ServerDefinition};
///
/// # #[tokio::main]
/// # async fn main() {
/// let probe = StdioProbe::new(
///     ClientInfo::default(),
///     CommandAllowlist::default(),
///     Duration::from_secs(15),
///     Duration::from_secs(30),
///     Duration::from_secs(2),
/// );
/// let server = ServerDefinition::stdio("fs", "npx", vec!["-y".into(), "server-fs".into()]);
/// let result = probe.verify(&server).await;
/// println!("{}: {}", result.name, result.status);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StdioProbe {
    client: ClientInfo,
    allowlist: CommandAllowlist,
    verify_timeout: Duration,
    fetch_timeout: Duration,
    kill_grace: Duration,
}

/// Which request a stdio tool fetch is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    /// Nothing sent yet
    Idle,
    /// `initialize` (id 1) is outstanding
    AwaitingInit,
    /// `initialize` answered; `notifications/initialized` being sent
    Initialized,
    /// `tools/list` (id 2) is outstanding
    AwaitingTools,
}

impl StdioProbe {
    /// Create a stdio probe.
    pub fn new(
        client: ClientInfo,
        allowlist: CommandAllowlist,
        verify_timeout: Duration,
        fetch_timeout: Duration,
        kill_grace: Duration,
    ) -> Self {
        Self {
            client,
            allowlist,
            verify_timeout,
            fetch_timeout,
            kill_grace,
        }
    }

    /// Validate the command and spawn the server process.
    fn launch(&self, server: &ServerDefinition) -> ProbeResult<ProcessHandle> {
        let command = required_command(server)?;
        self.allowlist.validate(command)?;
        ProcessHandle::spawn(command, &server.args, &server.env, self.kill_grace)
    }

    async fn send(process: &mut ProcessHandle, message: &Value) {
        if let Err(e) = process.write_line(&to_line(message)).await {
            // The process may already have exited; its exit event carries
            // the useful diagnostics.
            tracing::debug!("Failed to write to MCP server stdin: {}", e);
        }
    }
}

/// Returns true when `output` contains text that looks like a JSON-RPC
/// message.
pub fn looks_like_mcp_response(output: &str) -> bool {
    output.contains("\"jsonrpc\"") || output.contains("\"result\"")
}

/// Trailing bytes of earlier output kept when scanning the next chunk.
const SNIFF_CARRY_BYTES: usize = 16;

/// Scans stdout chunk by chunk for JSON-RPC text.
///
/// Only a short tail of the previous chunk is kept, so detection keeps
/// working after the diagnostic buffer is full and still sees a marker split
/// across two chunks.
#[derive(Debug, Default)]
struct ResponseSniffer {
    carry: String,
}

impl ResponseSniffer {
    /// Feed a chunk. Returns the scanned window once a response shows up.
    fn feed(&mut self, chunk: &str) -> Option<String> {
        let mut window = std::mem::take(&mut self.carry);
        window.push_str(chunk);
        if looks_like_mcp_response(&window) {
            return Some(window);
        }
        let mut start = window.len().saturating_sub(SNIFF_CARRY_BYTES);
        while !window.is_char_boundary(start) {
            start += 1;
        }
        self.carry = window.split_off(start);
        None
    }
}

/// Message for a process that exited before answering.
fn exit_diagnostic(code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let mut message = match code {
        Some(code) => format!("Process exited with code {}", code),
        None => "Process terminated by signal".to_string(),
    };
    let stdout = truncate_diagnostic(stdout);
    if !stdout.is_empty() {
        message.push_str(&format!("; stdout: {}", stdout));
    }
    let stderr = truncate_diagnostic(stderr);
    if !stderr.is_empty() {
        message.push_str(&format!("; stderr: {}", stderr));
    }
    message
}

/// Appends `chunk` to `buffer` and pops the complete lines.
///
/// Fails once the unterminated remainder exceeds [`MAX_STDOUT_BYTES`].
fn take_lines(buffer: &mut String, chunk: &str) -> ProbeResult<Vec<String>> {
    buffer.push_str(chunk);
    let lines = drain_lines(buffer);
    if buffer.len() > MAX_STDOUT_BYTES {
        return Err(ProbeError::StreamIntegrity(format!(
            "stdout line exceeded {} bytes without a newline",
            MAX_STDOUT_BYTES
        )));
    }
    Ok(lines)
}

/// Pops complete lines off the front of `buffer`.
fn drain_lines(buffer: &mut String) -> Vec<String> {
    let Some(last_newline) = buffer.rfind('\n') else {
        return Vec::new();
    };
    let rest = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, rest);
    complete
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait::async_trait]
impl ServerProbe for StdioProbe {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn verify(&self, server: &ServerDefinition) -> ConnectivityResult {
        let name = server.name.as_str();
        let mut process = match self.launch(server) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(server = name, "Stdio verification failed: {}", e);
                return ConnectivityResult::failed(name, e.to_string());
            }
        };

        Self::send(&mut process, &initialize_request(&self.client)).await;

        let deadline = Instant::now() + self.verify_timeout;
        let mut sniffer = ResponseSniffer::default();
        let (mut done, outcome) = Completion::new();
        while !done.is_complete() {
            tokio::select! {
                event = process.next_event() => match event {
                    Some(ProcessEvent::Stdout(chunk)) => {
                        if let Some(window) = sniffer.feed(&chunk) {
                            let info = extract_server_info(process.stdout())
                                .or_else(|| extract_server_info(&window));
                            done.complete(ConnectivityResult::connected(name, info));
                        }
                    }
                    Some(ProcessEvent::Stderr(_)) => {}
                    Some(ProcessEvent::Exited(code)) => {
                        done.complete(exit_outcome(name, code, &process));
                    }
                    None => {
                        done.complete(exit_outcome(name, process.exit_code().flatten(), &process));
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(server = name, "Stdio verification timed out");
                    done.complete(ConnectivityResult::pending(name, ProbeError::Timeout.to_string()));
                }
            }
        }
        process.terminate();

        outcome
            .await
            .unwrap_or_else(|_| ConnectivityResult::failed(name, "verification aborted"))
    }

    async fn fetch_tools(&self, server: &ServerDefinition) -> ToolFetchResult {
        let name = server.name.as_str();
        let kind = TransportKind::Stdio;
        let mut process = match self.launch(server) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(server = name, "Stdio tool fetch failed: {}", e);
                return ToolFetchResult::err(name, kind, e.to_string());
            }
        };

        let result = tokio::time::timeout(self.fetch_timeout, self.run_fetch(&mut process)).await;
        process.terminate();

        match result {
            Ok(Ok(tools)) => ToolFetchResult::ok(name, kind, tools),
            Ok(Err(e)) => {
                tracing::warn!(server = name, "Stdio tool fetch failed: {}", e);
                ToolFetchResult::err(name, kind, e.to_string())
            }
            Err(_) => ToolFetchResult::err(name, kind, ProbeError::Timeout.to_string()),
        }
    }
}

impl StdioProbe {
    async fn run_fetch(&self, process: &mut ProcessHandle) -> ProbeResult<Vec<ToolDescriptor>> {
        let mut step = FetchStep::Idle;
        let mut line_buffer = String::new();

        Self::send(process, &initialize_request(&self.client)).await;
        step = advance(step, FetchStep::AwaitingInit);

        loop {
            let (lines, exited) = match process.next_event().await {
                Some(ProcessEvent::Stdout(text)) => (take_lines(&mut line_buffer, &text)?, None),
                Some(ProcessEvent::Stderr(_)) => continue,
                Some(ProcessEvent::Exited(code)) => {
                    line_buffer.push('\n');
                    (drain_lines(&mut line_buffer), Some(code))
                }
                None => {
                    line_buffer.push('\n');
                    (drain_lines(&mut line_buffer), Some(None))
                }
            };

            for line in lines {
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    tracing::debug!("Ignoring non-JSON stdout line");
                    continue;
                };
                match step {
                    FetchStep::AwaitingInit if is_response_to(&message, INITIALIZE_REQUEST_ID) => {
                        into_result(message)?;
                        step = advance(step, FetchStep::Initialized);
                        Self::send(process, &initialized_notification()).await;
                        Self::send(process, &tools_list_request()).await;
                        step = advance(step, FetchStep::AwaitingTools);
                    }
                    FetchStep::AwaitingTools if is_response_to(&message, TOOLS_LIST_REQUEST_ID) => {
                        let result = into_result(message)?;
                        return Ok(tools_from_result(&result));
                    }
                    _ => tracing::debug!(?step, "Ignoring unrelated message from MCP server"),
                }
            }

            if let Some(code) = exited {
                let waiting_for = match step {
                    FetchStep::AwaitingTools => "tools/list",
                    _ => "initialize",
                };
                return Err(ProbeError::Transport(format!(
                    "{} before answering {}",
                    exit_diagnostic(code, process.stdout(), process.stderr()),
                    waiting_for
                )));
            }
        }
    }
}

fn advance(from: FetchStep, to: FetchStep) -> FetchStep {
    tracing::debug!(?from, ?to, "Stdio fetch step");
    to
}

/// Outcome of a verification whose process exited before answering.
fn exit_outcome(name: &str, code: Option<i32>, process: &ProcessHandle) -> ConnectivityResult {
    if code == Some(0) {
        ConnectivityResult::pending(name, "Process exited without an MCP response")
    } else {
        ConnectivityResult::failed(name, exit_diagnostic(code, process.stdout(), process.stderr()))
    }
}
