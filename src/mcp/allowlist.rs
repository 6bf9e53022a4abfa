//! Command allow-list for stdio MCP servers
//!
//! Only executables whose base name is on the allow-list may be spawned.
//! Directory components are stripped before matching, so `../../bin/rm` is
//! judged exactly like `rm`. A trailing extension is accepted only when the
//! extension itself is allowed *and* the stem is an allowed command, so
//! `node.exe` needs both `exe` and `node` on their respective lists.
//!
//! Command names are compared case-sensitively; extensions are compared
//! case-insensitively.

use std::collections::BTreeSet;

use thiserror::Error;

/// Commands commonly used to launch MCP servers.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "node", "npx", "npm", "pnpm", "pnpx", "yarn", "bun", "bunx", "deno", "python", "python3",
    "uv", "uvx", "pipx", "docker", "podman", "java", "dotnet", "go", "ruby", "php",
];

/// Executable extensions accepted after an allowed command name.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["exe", "cmd", "bat"];

/// Why a command was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandRejection {
    /// The command string was empty (or only a directory path).
    #[error("Command is empty")]
    Empty,

    /// The base name carries an extension that is not allowed.
    #[error("Command '{command}' has extension '.{extension}' which is not in the allowed list")]
    UnknownExtension {
        /// Base name as given
        command: String,
        /// Offending extension
        extension: String,
    },

    /// The base name (minus any extension) is not an allowed command.
    #[error("Command '{command}' is not in the allowed list")]
    NotAllowed {
        /// Base name that failed the check
        command: String,
    },
}

/// Allow-list of spawnable commands and their accepted extensions.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::allowlist::CommandAllowlist;
///
/// let allow = CommandAllowlist::default();
/// assert!(allow.validate("/usr/local/bin/npx").is_ok());
/// assert!(allow.validate("node.exe").is_ok());
/// assert!(allow.validate("curl").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAllowlist {
    commands: BTreeSet<String>,
    extensions: BTreeSet<String>,
}

impl Default for CommandAllowlist {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_COMMANDS.iter().copied(),
            DEFAULT_ALLOWED_EXTENSIONS.iter().copied(),
        )
    }
}

impl CommandAllowlist {
    /// Create an allow-list from explicit command and extension sets.
    ///
    /// Extensions may be given with or without a leading dot and are stored
    /// lowercase.
    pub fn new<C, E>(commands: C, extensions: E) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            extensions: extensions
                .into_iter()
                .map(|e| Into::<String>::into(e).trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Add a command to the allow-list, returning `self` for chaining.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.commands.insert(command.into());
        self
    }

    /// Iterate the allowed command names in sorted order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }

    /// Validate a command string (possibly a path).
    ///
    /// # Errors
    ///
    /// Returns a [`CommandRejection`] naming which check failed.
    pub fn validate(&self, command: &str) -> Result<(), CommandRejection> {
        let base = base_name(command);
        if base.is_empty() {
            return Err(CommandRejection::Empty);
        }

        if self.commands.contains(base) {
            return Ok(());
        }

        let Some((stem, extension)) = base.rsplit_once('.') else {
            return Err(CommandRejection::NotAllowed {
                command: base.to_string(),
            });
        };

        if !self.extensions.contains(&extension.to_ascii_lowercase()) {
            return Err(CommandRejection::UnknownExtension {
                command: base.to_string(),
                extension: extension.to_string(),
            });
        }

        if stem.is_empty() || !self.commands.contains(stem) {
            return Err(CommandRejection::NotAllowed {
                command: stem.to_string(),
            });
        }

        Ok(())
    }
}

/// Strip any directory components, accepting both `/` and `\` separators.
fn base_name(command: &str) -> &str {
    let trimmed = command.trim();
    trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
}
