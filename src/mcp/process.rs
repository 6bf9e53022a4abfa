//! Child process supervision for stdio MCP servers
//!
//! [`ProcessHandle`] spawns a server with all three standard streams piped
//! and exclusively owns it for the duration of one probe. Three background
//! Tokio tasks are started immediately: one drains stdout, one drains stderr,
//! and one owns the [`Child`] and waits for it to exit or for a termination
//! request. All of them report through a single ordered event channel; the
//! exit event is only sent after both output pipes have drained (bounded by
//! [`DRAIN_TIMEOUT`]) so the final output always precedes it.
//!
//! Termination goes through [`safe_kill`]: SIGTERM first (Unix), then a hard
//! kill once the grace window lapses. The escalation runs on the detached
//! waiter task, never on the caller's path, and `kill_on_drop` remains as a
//! backstop if the runtime shuts down first.
//!
//! Racing completion signals (output detected, process exit, timeout, spawn
//! error) settle through [`Completion`], a single-assignment cell: only the
//! first `complete` call takes effect.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ProbeError, ProbeResult};

/// Bytes of stderr kept for diagnostics (the most recent ones).
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Upper bound on accumulated stdout.
pub const MAX_STDOUT_BYTES: usize = 1024 * 1024;

/// How long the exit event waits for output pipes to drain.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Parent environment variables passed through so that interpreters and
/// package runners can be located. Server-specific variables from the
/// definition are applied on top.
const INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "LC_ALL",
    "TERM",
    "TMPDIR",
    "TEMP",
    "TMP",
    "SystemRoot",
    "SYSTEMROOT",
    "COMSPEC",
    "PATHEXT",
    "APPDATA",
    "LOCALAPPDATA",
    "USERPROFILE",
    "ProgramFiles",
];

/// Something that happened to a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout text
    Stdout(String),
    /// A chunk of stderr text
    Stderr(String),
    /// The process exited; `None` when killed by a signal or unknown
    Exited(Option<i32>),
}

/// Single-assignment result cell.
///
/// The first [`complete`](Completion::complete) delivers its value to the
/// paired receiver; later calls are no-ops and return `false`.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::process::Completion;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (mut done, rx) = Completion::new();
/// assert!(done.complete("timeout"));
/// assert!(!done.complete("exited"));
/// assert_eq!(rx.await.unwrap(), "timeout");
/// # }
/// ```
#[derive(Debug)]
pub struct Completion<T> {
    slot: Option<oneshot::Sender<T>>,
}

impl<T> Completion<T> {
    /// Create a cell and the receiver of its eventual value.
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { slot: Some(tx) }, rx)
    }

    /// Settle the cell. Returns `true` only for the first call.
    pub fn complete(&mut self, value: T) -> bool {
        match self.slot.take() {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Returns true once a value has been delivered.
    pub fn is_complete(&self) -> bool {
        self.slot.is_none()
    }
}

/// A spawned stdio server and its accumulated output.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    stdout: String,
    stderr: String,
    exit_code: Option<Option<i32>>,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Spawn `command` with `args`, applying `env` over a minimal inherited
    /// environment.
    ///
    /// On Windows, `.cmd`/`.bat` scripts are run through `cmd /C`; elsewhere
    /// the command is executed directly.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] if the process cannot be spawned or
    /// its pipes are unavailable.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        kill_grace: Duration,
    ) -> ProbeResult<Self> {
        let mut cmd = if cfg!(windows) && needs_shell(command) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            Command::new(command)
        };
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(env);

        let mut child = cmd.spawn().map_err(|e| {
            ProbeError::Transport(format!("Failed to spawn '{}': {}", command, e))
        })?;
        let pid = child.id();
        tracing::debug!(command, ?pid, "Spawned MCP server process");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProbeError::Transport("child stdin unavailable after spawn".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbeError::Transport("child stdout unavailable after spawn".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProbeError::Transport("child stderr unavailable after spawn".into()))?;

        let (events_tx, events) = mpsc::unbounded_channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();

        let stdout_task = tokio::spawn(pump_output(stdout, events_tx.clone(), ProcessEvent::Stdout));
        let stderr_task = tokio::spawn(pump_output(stderr, events_tx.clone(), |text| {
            tracing::debug!("mcp server stderr: {}", text.trim_end());
            ProcessEvent::Stderr(text)
        }));

        tokio::spawn(async move {
            let mut terminate_rx = terminate_rx;
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = &mut terminate_rx => None,
            };
            let code = match exited {
                Some(Ok(status)) => status.code(),
                Some(Err(e)) => {
                    tracing::debug!("waiting on MCP server process failed: {}", e);
                    None
                }
                None => {
                    safe_kill(&mut child, kill_grace).await;
                    None
                }
            };
            let drained = async {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
            };
            if tokio::time::timeout(DRAIN_TIMEOUT, drained).await.is_err() {
                tracing::debug!("MCP server output pipes still open after exit");
            }
            let _ = events_tx.send(ProcessEvent::Exited(code));
        });

        Ok(Self {
            pid,
            stdin: Some(stdin),
            events,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            terminate_tx: Some(terminate_tx),
        })
    }

    /// OS process id, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write `line` to the child's stdin and flush.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Transport`] if stdin is closed or the write
    /// fails (e.g. the child already exited).
    pub async fn write_line(&mut self, line: &str) -> ProbeResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProbeError::Transport("child stdin closed".into()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Wait for the next event, folding output into the accumulated buffers.
    ///
    /// Returns `None` once the process has exited and every event has been
    /// delivered.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        let event = self.events.recv().await?;
        match &event {
            ProcessEvent::Stdout(text) => {
                let room = MAX_STDOUT_BYTES.saturating_sub(self.stdout.len());
                self.stdout.push_str(truncate_to_boundary(text, room));
            }
            ProcessEvent::Stderr(text) => {
                self.stderr.push_str(text);
                keep_tail(&mut self.stderr, STDERR_TAIL_BYTES);
            }
            ProcessEvent::Exited(code) => {
                self.stdin = None;
                self.exit_code = Some(*code);
            }
        }
        Some(event)
    }

    /// All stdout received so far (bounded by [`MAX_STDOUT_BYTES`]).
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// The most recent stderr output (bounded by [`STDERR_TAIL_BYTES`]).
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Exit code once the exit event has been observed.
    pub fn exit_code(&self) -> Option<Option<i32>> {
        self.exit_code
    }

    /// Request termination of the process.
    ///
    /// Returns `true` for the first call and `false` afterwards; the kill
    /// sequence is started at most once.
    pub fn terminate(&mut self) -> bool {
        self.stdin = None;
        match self.terminate_tx.take() {
            Some(tx) => {
                if self.exit_code.is_none() {
                    tracing::debug!(pid = ?self.pid, "Terminating MCP server process");
                }
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Terminate `child`, escalating from SIGTERM to a hard kill after `grace`.
///
/// On non-Unix platforms the hard kill is used directly.
pub async fn safe_kill(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is a valid process ID obtained from tokio::process::Child
            // that has not yet been reaped.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
                return;
            }
            tracing::debug!(pid, "MCP server ignored SIGTERM; killing");
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed: {}", e);
    }
    let _ = child.wait().await;
}

/// Returns true for script extensions that need a command interpreter.
fn needs_shell(command: &str) -> bool {
    command
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case("cmd") || ext.eq_ignore_ascii_case("bat"))
        .unwrap_or(false)
}

async fn pump_output<R, F>(mut reader: R, tx: mpsc::UnboundedSender<ProcessEvent>, wrap: F)
where
    R: AsyncRead + Unpin,
    F: Fn(String) -> ProcessEvent,
{
    let mut buf = vec![0u8; 8192];
    let mut carry: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let text = decode_chunk(&mut carry, &buf[..n]);
        if !text.is_empty() && tx.send(wrap(text)).is_err() {
            return;
        }
    }
    if !carry.is_empty() {
        let _ = tx.send(wrap(String::from_utf8_lossy(&carry).into_owned()));
    }
}

/// Decode `chunk` after any bytes carried from the previous chunk, keeping an
/// incomplete trailing UTF-8 sequence for next time.
fn decode_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    let valid = match std::str::from_utf8(carry.as_slice()) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(carry.as_slice()).into_owned();
            carry.clear();
            return text;
        }
    };
    let rest = carry.split_off(valid);
    let text = String::from_utf8_lossy(carry.as_slice()).into_owned();
    *carry = rest;
    text
}

fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn keep_tail(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text.drain(..start);
}
