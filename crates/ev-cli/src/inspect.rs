use ev_api::verify_event;
use ev_compiler::compile_event;
use ev_core::{CommandRegistry, EventError, StaticHost};

use crate::{
    emit_steps, load_events_by_dir, read_globals, run_steps, runner_for, to_json, CheckArgs,
    CliError, CompileArgs, LoadedEvents, RunArgs,
};

fn event_source<'a>(events: &'a LoadedEvents, name: &str) -> Result<&'a str, CliError> {
    events
        .sources
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| {
            CliError::new(
                "CLI_EVENT_NOT_FOUND",
                format!("Event '{}' is not under {}", name, events.id),
            )
        })
}

fn finding_line(error: &EventError) -> Result<String, CliError> {
    let (event, line) = error
        .innermost()
        .map(|frame| (frame.event.as_str(), frame.line))
        .unwrap_or(("", 0));
    Ok(format!(
        "FINDING:{}|{}:{}|{}",
        error.code,
        event,
        line,
        to_json(&error.message)?
    ))
}

/// Exit code 2 when any event has findings.
pub(crate) fn run_check(args: CheckArgs) -> Result<i32, CliError> {
    let events = load_events_by_dir(&args.events_dir)?;
    let registry = CommandRegistry::shared();
    let names = match &args.event {
        Some(name) => {
            event_source(&events, name)?;
            vec![name.clone()]
        }
        None => events.sources.keys().cloned().collect(),
    };

    let mut lines = Vec::new();
    for name in &names {
        let source = event_source(&events, name)?;
        for finding in verify_event(name, source, &registry, &events.sources) {
            lines.push(finding_line(&finding)?);
        }
    }

    println!(
        "RESULT:{}",
        if lines.is_empty() { "OK" } else { "FINDINGS" }
    );
    println!("CHECKED:{}", names.len());
    for line in &lines {
        println!("{}", line);
    }
    Ok(if lines.is_empty() { 0 } else { 2 })
}

pub(crate) fn run_compile(args: CompileArgs) -> Result<i32, CliError> {
    let events = load_events_by_dir(&args.events_dir)?;
    let source = event_source(&events, &args.event)?;
    let compiled = compile_event(&args.event, source, CommandRegistry::builtin(), 0, 1)?;
    print!("{}", compiled.listing());
    Ok(0)
}

pub(crate) fn run_events(args: RunArgs) -> Result<i32, CliError> {
    let events = load_events_by_dir(&args.events_dir)?;
    let entry_event = args.event.unwrap_or_else(|| "main".to_string());
    let host = StaticHost::new(read_globals(args.globals.as_deref(), &args.sets)?);

    let mut runner = runner_for(&events);
    runner.start(&entry_event)?;
    let result = run_steps(&mut runner, &host, args.limit)?;
    emit_steps(result, None)?;
    Ok(0)
}

#[cfg(test)]
mod inspect_tests {
    use super::*;
    use crate::cli_test_support::*;
    use ev_core::ErrorCode;

    fn events_dir(files: &[(&str, &str)]) -> String {
        let root = temp_path("inspect");
        for (name, content) in files {
            write_file(&root.join(name), content);
        }
        root.to_string_lossy().to_string()
    }

    #[test]
    fn check_reports_findings_with_a_distinct_exit_code() {
        let dir = events_dir(&[
            ("main.pyevent", "#pyev1\n$trigger_script(\"saver\")"),
            ("saver.pyevent", "#pyev1\nfor i in range(2):\n    $battle_save"),
        ]);
        let code = run_check(CheckArgs {
            events_dir: dir.clone(),
            event: Some("main".to_string()),
        })
        .expect("check should run");
        assert_eq!(code, 0);

        let code = run_check(CheckArgs {
            events_dir: dir,
            event: None,
        })
        .expect("check should run");
        assert_eq!(code, 2);
    }

    #[test]
    fn check_rejects_unknown_event_names() {
        let dir = events_dir(&[("main.pyevent", "#pyev1\n$wait 1")]);
        let error = run_check(CheckArgs {
            events_dir: dir,
            event: Some("nope".to_string()),
        })
        .expect_err("unknown event");
        assert_eq!(error.code(), "CLI_EVENT_NOT_FOUND");
    }

    #[test]
    fn compile_needs_a_versioned_event() {
        let dir = events_dir(&[
            ("main.pyevent", "#pyev1\n$wait 1"),
            ("old.event", "wait;1"),
        ]);
        let code = run_compile(CompileArgs {
            events_dir: dir.clone(),
            event: "main".to_string(),
        })
        .expect("compile should pass");
        assert_eq!(code, 0);

        let error = run_compile(CompileArgs {
            events_dir: dir,
            event: "old".to_string(),
        })
        .expect_err("legacy events have no listing");
        assert!(matches!(
            error,
            CliError::Event(EventError {
                code: ErrorCode::InvalidVersion,
                ..
            })
        ));
    }

    #[test]
    fn run_surfaces_runtime_errors() {
        let dir = events_dir(&[("main.pyevent", "#pyev1\n$wait 1\nx = missing_name + 1")]);
        let error = run_events(RunArgs {
            events_dir: dir,
            event: None,
            globals: None,
            sets: Vec::new(),
            limit: 10,
        })
        .expect_err("unbound name");
        assert_eq!(error.code(), "RUNTIME");
    }
}
