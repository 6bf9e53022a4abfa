//! Extraction of `serverInfo` from raw process output
//!
//! Stdio servers may print banners, logs, or partial lines around their
//! JSON-RPC response. This scanner looks only at lines mentioning
//! `"serverInfo"`, finds the first balanced `{...}` object on such a line with
//! a linear brace scan (string- and escape-aware), and parses it.

use serde_json::Value;

use crate::mcp::types::{server_info_from_result, ServerInfo};

/// Lines longer than this are skipped without being scanned.
pub const MAX_SCAN_LINE_LEN: usize = 64 * 1024;

/// Return the first `result.serverInfo` found in `output`, if any.
///
/// Never fails: malformed JSON, unbalanced braces, and oversized lines all
/// yield `None` for that line.
pub fn extract_server_info(output: &str) -> Option<ServerInfo> {
    output
        .lines()
        .filter(|line| line.len() <= MAX_SCAN_LINE_LEN)
        .filter(|line| line.contains("\"serverInfo\""))
        .find_map(|line| {
            let object = balanced_object(line)?;
            let value: Value = serde_json::from_str(object).ok()?;
            value.get("result").and_then(server_info_from_result)
        })
}

/// Slice from the first `{` to its matching `}`.
fn balanced_object(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in line.as_bytes()[start..].iter().copied().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&line[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
