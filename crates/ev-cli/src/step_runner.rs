use std::sync::Arc;

use ev_api::EventRunner;
use ev_core::ScriptHost;

use crate::{to_json, CliError, LoadedEvents, StepResult};

pub(crate) fn runner_for(events: &LoadedEvents) -> EventRunner {
    EventRunner::new(Arc::new(events.sources.clone()))
}

/// Pulls up to `limit` commands, stopping early when the event ends.
pub(crate) fn run_steps(
    runner: &mut EventRunner,
    host: &dyn ScriptHost,
    limit: usize,
) -> Result<StepResult, CliError> {
    let mut commands = Vec::new();
    while commands.len() < limit {
        match runner.fetch_next_command(host)? {
            Some(command) => commands.push(command),
            None => {
                return Ok(StepResult {
                    commands,
                    finished: true,
                })
            }
        }
    }
    Ok(StepResult {
        commands,
        finished: runner.finished(),
    })
}

pub(crate) fn emit_steps(result: StepResult, state_out: Option<String>) -> Result<(), CliError> {
    println!("RESULT:OK");
    if result.finished {
        println!("EVENT:END");
    } else {
        println!("EVENT:PAUSED");
    }

    for command in &result.commands {
        println!("COMMAND_JSON:{}", to_json(command)?);
    }

    println!(
        "STATE_OUT:{}",
        state_out.unwrap_or_else(|| "NONE".to_string())
    );
    Ok(())
}

#[cfg(test)]
mod step_runner_tests {
    use super::*;
    use crate::cli_test_support::*;
    use crate::load_events_by_dir;
    use ev_core::{EventValue, StaticHost};

    #[test]
    fn run_steps_stops_at_the_limit_or_the_end() {
        let root = temp_path("steps");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\n$alert(\"one\")\n$trigger_script(\"side\")\n$alert(\"three\")",
        );
        write_file(&root.join("side.event"), "alert;two");
        let events = load_events_by_dir(&root.to_string_lossy()).expect("load");

        let mut runner = runner_for(&events);
        runner.start("main").expect("start");
        let host = StaticHost::default();
        let first = run_steps(&mut runner, &host, 2).expect("steps");
        assert!(!first.finished);
        assert_eq!(
            first.commands[1].parameter("Text"),
            Some(&EventValue::from("two"))
        );

        let rest = run_steps(&mut runner, &host, 10).expect("steps");
        assert!(rest.finished);
        assert_eq!(rest.commands.len(), 1);
        emit_steps(rest, None).expect("emit");
    }
}
