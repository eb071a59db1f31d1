use std::collections::BTreeMap;

use ev_core::{ErrorCode, EventCommand, EventValue};
use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "ev-tool-case.v1";

/// A golden case: the events of its directory, the game state they see,
/// and either the commands they produce or the findings the analyzer
/// reports for the entry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_entry_event")]
    pub entry_event: String,
    #[serde(default)]
    pub globals: BTreeMap<String, EventValue>,
    /// Game state changes applied once the given number of commands has
    /// been handed out.
    #[serde(default)]
    pub updates: Vec<StateUpdate>,
    /// Save and restore the whole call stack once, after this many commands.
    #[serde(default)]
    pub save_after: Option<usize>,
    #[serde(default)]
    pub expected_commands: Vec<ExpectedCommand>,
    #[serde(default)]
    pub expected_findings: Vec<ErrorCode>,
    #[serde(default)]
    pub expected_error: Option<ErrorCode>,
}

fn default_entry_event() -> String {
    "main".to_string()
}

impl TestCase {
    pub fn is_check_case(&self) -> bool {
        !self.expected_findings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub after_command: usize,
    pub name: String,
    pub value: EventValue,
}

/// A command as the case expects it. Source lines are not compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedCommand {
    pub id: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, EventValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl From<EventCommand> for ExpectedCommand {
    fn from(command: EventCommand) -> Self {
        Self {
            id: command.id,
            parameters: command.parameters,
            flags: command.flags,
        }
    }
}
