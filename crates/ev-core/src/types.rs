use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, EventError};
use crate::value::EventValue;

/// Placeholder left in place of every command line by the tokenizer. Authors
/// may not write it themselves.
pub const COMMAND_SENTINEL: &str = "__EV_COMMAND_SENTINEL__";
pub const COMMAND_SIGIL: char = '$';
pub const EVENT_STATE_SCHEMA: &str = "event-state.v1";

/// One `$command ...` line split into tokens. `tokens[0]` is the command
/// token (for the call form it still carries its parenthesised arguments);
/// the rest are positional argument tokens. Tokens after the first top-level
/// comma are kept apart in `flags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTokenRecord {
    pub tokens: Vec<String>,
    pub token_offsets: Vec<usize>,
    pub flags: Vec<String>,
    pub flag_offsets: Vec<usize>,
    /// Number of argument tokens before the flag boundary; `None` when the
    /// line has no top-level comma.
    pub flag_index: Option<usize>,
    /// Offset of a `#` that ended tokenization early.
    pub eol_offset: Option<usize>,
    pub indent: usize,
    pub line_number: usize,
    pub source: String,
}

impl CommandTokenRecord {
    pub fn command_token(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or("")
    }

    pub fn arguments(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptWithSentinel {
    pub source: String,
    pub records: Vec<CommandTokenRecord>,
}

impl ScriptWithSentinel {
    pub fn placeholder_count(&self) -> usize {
        self.source.matches(COMMAND_SENTINEL).count()
    }

    pub fn check(&self) -> Result<(), EventError> {
        let placeholders = self.placeholder_count();
        if placeholders != self.records.len() {
            return Err(EventError::new(
                ErrorCode::SentinelMismatch,
                format!(
                    "Number of commands ({}) does not match number of sentinels ({}).",
                    self.records.len(),
                    placeholders
                ),
            ));
        }
        Ok(())
    }
}

/// A command bound to concrete values, handed to the game to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCommand {
    pub id: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, EventValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    pub line: usize,
}

impl EventCommand {
    pub fn new(id: impl Into<String>, line: usize) -> Self {
        Self {
            id: id.into(),
            parameters: BTreeMap::new(),
            flags: Vec::new(),
            line,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&EventValue> {
        self.parameters.get(name)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|known| known == flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IteratorState {
    pub nid: String,
    pub line: usize,
    pub items: Vec<String>,
    pub index: usize,
}

impl IteratorState {
    pub fn current(&self) -> Option<&str> {
        self.items.get(self.index).map(String::as_str)
    }
}

/// Persisted position of one running event. For pyev1 events `cursor` is
/// the suspend index of the last delivered command; for legacy events it is
/// the next line to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub schema_version: String,
    pub script_id: String,
    pub source: String,
    pub finished: bool,
    pub cursor: u32,
    #[serde(default = "default_cursor_hits")]
    pub cursor_hits: u32,
    /// pyev1 only: passes over each suspend point before the save.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hits: BTreeMap<u32, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub iterators: BTreeMap<usize, IteratorState>,
    /// Values the event was started with (`arg1`, `arg2`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

fn default_cursor_hits() -> u32 {
    1
}
