use std::collections::BTreeMap;

use ev_api::RunnerSnapshot;
use ev_core::{EventCommand, EventValue};
use serde::{Deserialize, Serialize};

pub(crate) const AGENT_STATE_SCHEMA: &str = "event-agent-state.v1";

/// Every event found under one directory, keyed by event name.
#[derive(Debug, Clone)]
pub(crate) struct LoadedEvents {
    pub(crate) id: String,
    pub(crate) sources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentState {
    pub(crate) schema_version: String,
    pub(crate) events_ref: String,
    pub(crate) entry_event: String,
    #[serde(default)]
    pub(crate) globals: BTreeMap<String, EventValue>,
    pub(crate) runner: RunnerSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepResult {
    pub(crate) commands: Vec<EventCommand>,
    pub(crate) finished: bool,
}
