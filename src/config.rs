//! Configuration management for mcp-probe
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The file lists server definitions as-is; resolving them from host
//! application config files happens upstream.

use crate::error::{ProbeError, Result};
use crate::mcp::allowlist::{CommandAllowlist, DEFAULT_ALLOWED_COMMANDS, DEFAULT_ALLOWED_EXTENSIONS};
use crate::mcp::types::{ClientInfo, ServerDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for mcp-probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Probe behaviour settings
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Servers to probe
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,
}

/// Probe behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Client name announced in `initialize`
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Client version announced in `initialize`
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Commands stdio servers may be launched with
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Executable extensions accepted after an allowed command
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Per-transport deadlines
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Maximum number of servers probed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_allowed_commands() -> Vec<String> {
    DEFAULT_ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_concurrency() -> usize {
    8
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            allowed_commands: default_allowed_commands(),
            allowed_extensions: default_allowed_extensions(),
            timeouts: TimeoutConfig::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl ProbeConfig {
    /// Client identity for the `initialize` handshake.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self.client_name.clone(),
            version: self.client_version.clone(),
        }
    }

    /// Command allow-list built from the configured lists.
    pub fn allowlist(&self) -> CommandAllowlist {
        CommandAllowlist::new(
            self.allowed_commands.iter().cloned(),
            self.allowed_extensions.iter().cloned(),
        )
    }
}

/// Per-transport deadlines, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Stdio connectivity check
    #[serde(default = "default_stdio_verify_ms")]
    pub stdio_verify_ms: u64,
    /// Streamable HTTP connectivity check
    #[serde(default = "default_http_verify_ms")]
    pub http_verify_ms: u64,
    /// Legacy SSE connectivity check
    #[serde(default = "default_sse_verify_ms")]
    pub sse_verify_ms: u64,
    /// Stdio tool fetch
    #[serde(default = "default_stdio_fetch_ms")]
    pub stdio_fetch_ms: u64,
    /// Legacy SSE tool fetch
    #[serde(default = "default_sse_fetch_ms")]
    pub sse_fetch_ms: u64,
    /// Grace window between SIGTERM and a hard kill
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

fn default_stdio_verify_ms() -> u64 {
    15_000
}

fn default_http_verify_ms() -> u64 {
    10_000
}

fn default_sse_verify_ms() -> u64 {
    10_000
}

fn default_stdio_fetch_ms() -> u64 {
    30_000
}

fn default_sse_fetch_ms() -> u64 {
    20_000
}

fn default_kill_grace_ms() -> u64 {
    2_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stdio_verify_ms: default_stdio_verify_ms(),
            http_verify_ms: default_http_verify_ms(),
            sse_verify_ms: default_sse_verify_ms(),
            stdio_fetch_ms: default_stdio_fetch_ms(),
            sse_fetch_ms: default_sse_fetch_ms(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Stdio connectivity deadline.
    pub fn stdio_verify(&self) -> Duration {
        Duration::from_millis(self.stdio_verify_ms)
    }

    /// Streamable HTTP connectivity deadline.
    pub fn http_verify(&self) -> Duration {
        Duration::from_millis(self.http_verify_ms)
    }

    /// Legacy SSE connectivity deadline.
    pub fn sse_verify(&self) -> Duration {
        Duration::from_millis(self.sse_verify_ms)
    }

    /// Stdio tool fetch deadline.
    pub fn stdio_fetch(&self) -> Duration {
        Duration::from_millis(self.stdio_fetch_ms)
    }

    /// Legacy SSE tool fetch deadline.
    pub fn sse_fetch(&self) -> Duration {
        Duration::from_millis(self.sse_fetch_ms)
    }

    /// Kill escalation grace window.
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ProbeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        let timeouts = &mut self.probe.timeouts;
        for (var, slot) in [
            ("MCP_PROBE_STDIO_TIMEOUT_MS", &mut timeouts.stdio_verify_ms),
            ("MCP_PROBE_HTTP_TIMEOUT_MS", &mut timeouts.http_verify_ms),
            ("MCP_PROBE_SSE_TIMEOUT_MS", &mut timeouts.sse_verify_ms),
        ] {
            if let Ok(raw) = std::env::var(var) {
                match raw.parse() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!("Invalid {}: {}", var, raw),
                }
            }
        }

        if let Ok(raw) = std::env::var("MCP_PROBE_CONCURRENCY") {
            match raw.parse() {
                Ok(value) => self.probe.concurrency = value,
                Err(_) => tracing::warn!("Invalid MCP_PROBE_CONCURRENCY: {}", raw),
            }
        }

        if let Ok(raw) = std::env::var("MCP_PROBE_ALLOWED_COMMANDS") {
            let extra: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tracing::debug!(?extra, "Env override: MCP_PROBE_ALLOWED_COMMANDS");
            self.allow_commands(extra);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if !cli.allow.is_empty() {
            self.allow_commands(cli.allow.iter().cloned());
        }
        if let Some(concurrency) = cli.concurrency {
            self.probe.concurrency = concurrency;
        }
    }

    fn allow_commands(&mut self, commands: impl IntoIterator<Item = String>) {
        for command in commands {
            if !self.probe.allowed_commands.contains(&command) {
                self.probe.allowed_commands.push(command);
            }
        }
    }

    /// Servers to probe, optionally narrowed to one name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is given and no server has that name.
    pub fn select_servers(&self, name: Option<&str>) -> Result<Vec<ServerDefinition>> {
        match name {
            None => Ok(self.servers.clone()),
            Some(name) => {
                let selected: Vec<_> = self
                    .servers
                    .iter()
                    .filter(|s| s.name == name)
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    return Err(ProbeError::Config(format!("No server named '{}'", name)).into());
                }
                Ok(selected)
            }
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.probe.client_name.trim().is_empty() {
            return Err(ProbeError::Config("client_name cannot be empty".to_string()).into());
        }

        if self.probe.concurrency == 0 {
            return Err(
                ProbeError::Config("concurrency must be greater than 0".to_string()).into(),
            );
        }

        let t = &self.probe.timeouts;
        for (name, value) in [
            ("timeouts.stdio_verify_ms", t.stdio_verify_ms),
            ("timeouts.http_verify_ms", t.http_verify_ms),
            ("timeouts.sse_verify_ms", t.sse_verify_ms),
            ("timeouts.stdio_fetch_ms", t.stdio_fetch_ms),
            ("timeouts.sse_fetch_ms", t.sse_fetch_ms),
            ("timeouts.kill_grace_ms", t.kill_grace_ms),
        ] {
            if value == 0 {
                return Err(
                    ProbeError::Config(format!("{} must be greater than 0", name)).into(),
                );
            }
        }

        if let Some(ext) = self
            .probe
            .allowed_extensions
            .iter()
            .find(|e| e.trim_start_matches('.').contains('.'))
        {
            return Err(ProbeError::Config(format!(
                "allowed_extensions entry '{}' must be a single extension",
                ext
            ))
            .into());
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(ProbeError::Config("server name cannot be empty".to_string()).into());
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ProbeError::Config(format!(
                    "duplicate server name: {}",
                    server.name
                ))
                .into());
            }
        }

        Ok(())
    }
}
