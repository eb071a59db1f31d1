use std::ffi::OsString;

use clap::Parser;

mod agent;
mod cli_args;
mod error_map;
mod inspect;
mod models;
mod source_loader;
mod state_store;
mod step_runner;

pub(crate) use cli_args::{
    AgentArgs, AgentCommand, CheckArgs, Cli, CompileArgs, Mode, NextArgs, RunArgs, StartArgs,
};
pub(crate) use error_map::{
    emit_error, map_cli_globals_invalid, map_cli_source_path, map_cli_source_read,
    map_cli_source_scan, map_cli_state_invalid, map_cli_state_read, map_cli_state_write, to_json,
    CliError,
};
pub(crate) use models::{AgentState, LoadedEvents, StepResult, AGENT_STATE_SCHEMA};
pub(crate) use source_loader::{
    apply_sets, load_events_by_dir, load_events_by_ref, read_globals,
};
pub(crate) use state_store::{load_agent_state, save_agent_state};
pub(crate) use step_runner::{emit_steps, run_steps, runner_for};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Check(args) => inspect::run_check(args),
        Mode::Compile(args) => inspect::run_compile(args),
        Mode::Run(args) => inspect::run_events(args),
        Mode::Agent(args) => agent::run_agent(args),
    }
}


#[cfg(test)]
mod cli_tests {
    use super::*;
    use crate::cli_test_support::*;

    #[test]
    fn unknown_subcommands_fail_to_parse() {
        assert_ne!(run_cli_from_args(["ev-cli", "dance"]), 0);
    }

    #[test]
    fn agent_steps_through_a_save_and_a_state_change() {
        let root = temp_path("agent");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\n$alert(\"start\")\nif Ready:\n    $alert(\"ready\")\nelse:\n    $alert(\"waiting\")",
        );
        let state = root.join("state.json");
        let events_dir = root.to_string_lossy().to_string();
        let state_path = state.to_string_lossy().to_string();

        let code = run_cli_from_args([
            "ev-cli",
            "agent",
            "start",
            "--events-dir",
            events_dir.as_str(),
            "--set",
            "Ready=false",
            "--state-out",
            state_path.as_str(),
        ]);
        assert_eq!(code, 0);
        let saved = load_agent_state(&state).expect("state should be saved");
        assert_eq!(saved.runner.calls.len(), 1);

        let next_state = root.join("state-2.json");
        let next_path = next_state.to_string_lossy().to_string();
        let code = run_cli_from_args([
            "ev-cli",
            "agent",
            "next",
            "--state-in",
            state_path.as_str(),
            "--set",
            "Ready=true",
            "--steps",
            "5",
            "--state-out",
            next_path.as_str(),
        ]);
        assert_eq!(code, 0);
        assert!(!next_state.exists(), "finished events save nothing");
    }
}
