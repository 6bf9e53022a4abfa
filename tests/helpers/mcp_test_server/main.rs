//! MCP test server binary for integration tests
//!
//! This binary implements a minimal MCP server that communicates over
//! stdin/stdout using newline-delimited JSON (the stdio transport protocol).
//! It is used exclusively by integration tests to exercise the stdio probe
//! without requiring a real external MCP server.
//!
//! # Handled Methods
//!
//! - `initialize` -- responds with protocol version `2024-11-05` and
//!   `serverInfo` `{ name: "mcp-test-server", version: "0.1.0" }`.
//! - `notifications/initialized` -- swallowed silently (no response).
//! - `tools/list` -- returns two tools, `"echo"` and `"add"`.
//! - All other methods -- returns a JSON-RPC `-32601 Method not found` error.
//!
//! # Modes
//!
//! `MCP_TEST_SERVER_MODE` selects a misbehaviour:
//!
//! - `normal` (default) -- behave as described above
//! - `banner` -- print a non-JSON banner line before serving
//! - `crash` -- write to stderr and exit with code 3 before answering
//! - `silent` -- exit with code 0 without writing anything
//! - `hang` -- read requests but never answer
//! - `reject` -- answer `initialize` with a JSON-RPC error
//!
//! When `MCP_TEST_SERVER_PID_FILE` is set, the server writes its pid to
//! that file on startup and keeps running after stdin closes, so it only
//! goes away when it is signalled.

use std::io::{self, BufRead, Write};

fn main() {
    let mode = std::env::var("MCP_TEST_SERVER_MODE").unwrap_or_else(|_| "normal".to_string());
    let pid_file = std::env::var("MCP_TEST_SERVER_PID_FILE").ok();
    if let Some(path) = &pid_file {
        if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
            eprintln!("mcp_test_server: cannot write pid file: {}", e);
            std::process::exit(2);
        }
    }

    match mode.as_str() {
        "crash" => {
            eprintln!("mcp_test_server: fatal: missing API key");
            std::process::exit(3);
        }
        "silent" => return,
        _ => {}
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if mode == "banner" {
        let _ = writeln!(out, "mcp-test-server starting up");
        let _ = out.flush();
    }

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || mode == "hang" {
            continue;
        }

        let request: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                let response = make_error(&serde_json::Value::Null, -32700, "Parse error");
                let _ = writeln!(out, "{}", response);
                let _ = out.flush();
                continue;
            }
        };

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id = request
            .get("id")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        if method == "notifications/initialized" {
            continue;
        }

        let response = match method {
            "initialize" if mode == "reject" => {
                make_error(&id, -32602, "Unsupported protocol version")
            }
            "initialize" => handle_initialize(&id),
            "tools/list" => handle_tools_list(&id),
            _ => make_error(&id, -32601, &format!("Method not found: {}", method)),
        };

        if writeln!(out, "{}", response).is_err() {
            break;
        }
        if out.flush().is_err() {
            break;
        }
    }

    if pid_file.is_some() {
        loop {
            std::thread::sleep(std::time::Duration::from_secs(60));
        }
    }
}

/// Handle the `initialize` request.
fn handle_initialize(id: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "mcp-test-server",
                "version": "0.1.0"
            }
        }
    })
}

/// Handle the `tools/list` request.
fn handle_tools_list(id: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "tools": [
                {
                    "name": "echo",
                    "description": "Echoes input",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string" }
                        }
                    }
                },
                {
                    "name": "add",
                    "description": "Adds two numbers",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "a": { "type": "number" },
                            "b": { "type": "number" }
                        }
                    }
                }
            ]
        }
    })
}

/// Build a JSON-RPC error response.
fn make_error(id: &serde_json::Value, code: i32, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}
