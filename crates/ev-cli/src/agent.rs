use std::path::Path;

use ev_core::StaticHost;
use log::info;

use crate::{
    apply_sets, emit_steps, load_agent_state, load_events_by_dir, load_events_by_ref,
    read_globals, run_steps, runner_for, save_agent_state, AgentArgs, AgentCommand, AgentState,
    CliError, NextArgs, StartArgs, StepResult, AGENT_STATE_SCHEMA,
};

pub(super) fn run_agent(args: AgentArgs) -> Result<i32, CliError> {
    match args.command {
        AgentCommand::Start(args) => run_start(args),
        AgentCommand::Next(args) => run_next(args),
    }
}

pub(super) fn run_start(args: StartArgs) -> Result<i32, CliError> {
    let events = load_events_by_dir(&args.events_dir)?;
    let entry_event = args.event.unwrap_or_else(|| "main".to_string());
    let globals = read_globals(args.globals.as_deref(), &args.sets)?;

    let mut runner = runner_for(&events);
    runner.start(&entry_event)?;
    let result = run_steps(&mut runner, &StaticHost::new(globals.clone()), args.steps)?;

    let state = AgentState {
        schema_version: AGENT_STATE_SCHEMA.to_string(),
        events_ref: events.id,
        entry_event,
        globals,
        runner: runner.save(),
    };
    finish_step(result, state, &args.state_out)
}

/// Resumes a saved agent, applying game state changes first.
pub(super) fn run_next(args: NextArgs) -> Result<i32, CliError> {
    let mut state = load_agent_state(Path::new(&args.state_in))?;
    let events = load_events_by_ref(&state.events_ref)?;
    apply_sets(&mut state.globals, &args.sets)?;

    let mut runner = runner_for(&events);
    runner.restore(&state.runner)?;
    info!(
        "resumed '{}' with {} running events",
        state.entry_event,
        runner.depth()
    );
    let result = run_steps(
        &mut runner,
        &StaticHost::new(state.globals.clone()),
        args.steps,
    )?;
    state.runner = runner.save();
    finish_step(result, state, &args.state_out)
}

fn finish_step(
    result: StepResult,
    state: AgentState,
    state_out: &str,
) -> Result<i32, CliError> {
    if result.finished {
        emit_steps(result, None)?;
        return Ok(0);
    }
    save_agent_state(Path::new(state_out), &state)?;
    emit_steps(result, Some(state_out.to_string()))?;
    Ok(0)
}
