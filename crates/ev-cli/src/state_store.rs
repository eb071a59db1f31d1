use std::fs;
use std::path::Path;

use crate::{
    map_cli_state_invalid, map_cli_state_read, map_cli_state_write, AgentState, CliError,
    AGENT_STATE_SCHEMA,
};

pub(crate) fn save_agent_state(path: &Path, state: &AgentState) -> Result<(), CliError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(map_cli_state_write)?;

    let payload = serde_json::to_string_pretty(state)
        .map_err(|error| CliError::new("CLI_STATE_WRITE", error.to_string()))?;
    fs::write(path, payload).map_err(map_cli_state_write)
}

pub(crate) fn load_agent_state(path: &Path) -> Result<AgentState, CliError> {
    if !path.exists() {
        return Err(CliError::new(
            "CLI_STATE_NOT_FOUND",
            format!("State file does not exist: {}", path.display()),
        ));
    }

    let raw = fs::read_to_string(path).map_err(map_cli_state_read)?;
    let state: AgentState = serde_json::from_str(&raw).map_err(map_cli_state_invalid)?;

    if state.schema_version != AGENT_STATE_SCHEMA {
        return Err(CliError::new(
            "CLI_STATE_SCHEMA",
            format!("Unsupported agent state schema: {}", state.schema_version),
        ));
    }

    Ok(state)
}

#[cfg(test)]
mod state_store_tests {
    use super::*;
    use crate::cli_test_support::*;
    use ev_api::RunnerSnapshot;
    use std::collections::BTreeMap;

    fn state() -> AgentState {
        AgentState {
            schema_version: AGENT_STATE_SCHEMA.to_string(),
            events_ref: "events-dir:/tmp/events".to_string(),
            entry_event: "main".to_string(),
            globals: BTreeMap::new(),
            runner: RunnerSnapshot::default(),
        }
    }

    #[test]
    fn saved_state_loads_back() {
        let path = temp_path("state").join("nested").join("state.json");
        save_agent_state(&path, &state()).expect("save should pass");
        let loaded = load_agent_state(&path).expect("load should pass");
        assert_eq!(loaded.entry_event, "main");
        assert!(loaded.runner.calls.is_empty());
    }

    #[test]
    fn load_reports_missing_invalid_and_foreign_states() {
        let missing = temp_path("missing-state.json");
        let error = load_agent_state(&missing).expect_err("missing");
        assert_eq!(error.code(), "CLI_STATE_NOT_FOUND");

        let invalid = temp_path("invalid-state.json");
        write_file(&invalid, "{");
        let error = load_agent_state(&invalid).expect_err("invalid");
        assert_eq!(error.code(), "CLI_STATE_INVALID");

        let foreign = temp_path("foreign-state.json");
        let mut old = state();
        old.schema_version = "event-agent-state.v0".to_string();
        save_agent_state(&foreign, &old).expect("save");
        let error = load_agent_state(&foreign).expect_err("schema");
        assert_eq!(error.code(), "CLI_STATE_SCHEMA");
    }
}
