// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script command stream.
//!
//! A token's text is a `||`-separated list of commands. Each command is
//! `**name:args` (the `**` prefix and the first colon delimit the name);
//! bare text with no prefix is shorthand for launching that path. The
//! catalogue kept in-core is the minimum the runtime itself drives —
//! everything else belongs to the platform seam.

pub mod engine;
pub mod mappings;

pub use engine::{ExecOutcome, ScriptEngine};
pub use mappings::{Mapping, MappingKind, MatchKind};

use serde::{Deserialize, Serialize};

/// One parsed script command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCommand {
    /// Lowercased command name, e.g. `launch`, `input.keyboard`.
    pub name: String,
    /// Raw argument text after the first colon (may be empty).
    pub args: String,
}

impl ScriptCommand {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self { name: name.into().to_lowercase(), args: args.into() }
    }

    /// Whether this command starts media playback.
    pub fn is_media_launch(&self) -> bool {
        self.name == "launch" || self.name.starts_with("launch.")
    }
}

/// Result of executing a single command.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub media_changed: bool,
    pub playlist_changed: bool,
    pub playlist: Option<crate::playlist::Playlist>,
    /// Commands to splice into the stream immediately after the current one.
    pub new_commands: Vec<ScriptCommand>,
    /// The command ran outside the sandboxed set.
    pub untrusted: bool,
}

/// Parse script text into its command stream.
///
/// Empty segments (leading/trailing/double separators) and prefixed
/// segments with no command name are skipped, so `"a||"` and `"a"` parse
/// the same.
pub fn parse_script(text: &str) -> Vec<ScriptCommand> {
    text.split("||")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|segment| match segment.strip_prefix("**") {
            Some(rest) => {
                let (name, args) = match rest.split_once(':') {
                    Some((name, args)) => (name.trim(), args),
                    None => (rest.trim(), ""),
                };
                (!name.is_empty()).then(|| ScriptCommand::new(name, args))
            }
            None => Some(ScriptCommand::new("launch", segment)),
        })
        .collect()
}

/// Whether any command in `text` launches media. Hold-mode removal timers
/// use this to tell game cards from command-only cards.
pub fn has_media_command(text: &str) -> bool {
    parse_script(text).iter().any(ScriptCommand::is_media_launch)
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
