use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ev_api::{verify_event, EventRunner, RunnerSnapshot};
use ev_core::{CommandRegistry, ErrorCode, StaticHost};
use log::debug;

use crate::source::{read_events_from_dir, read_test_case};
use crate::{EvToolError, ExpectedCommand, TestCase};

pub const MAX_COMMANDS: usize = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub observed_commands: Vec<ExpectedCommand>,
    pub findings: Vec<ErrorCode>,
    pub error: Option<ErrorCode>,
    pub restored: bool,
}

pub fn run_case(case_dir: &Path, case: &TestCase) -> Result<RunReport, EvToolError> {
    let events = read_events_from_dir(case_dir)?;
    let Some(entry_source) = events.get(&case.entry_event) else {
        return Err(EvToolError::MissingEntry {
            name: case.entry_event.clone(),
        });
    };

    if case.is_check_case() {
        let findings = verify_event(
            &case.entry_event,
            entry_source,
            &CommandRegistry::shared(),
            &events,
        );
        return Ok(RunReport {
            observed_commands: Vec::new(),
            findings: findings.into_iter().map(|finding| finding.code).collect(),
            error: None,
            restored: false,
        });
    }

    let catalog = Arc::new(events);
    let mut runner = EventRunner::new(catalog.clone());
    let mut host = StaticHost::new(case.globals.clone());
    let mut observed_commands = Vec::new();
    let mut restored = false;

    if let Err(error) = runner.start(&case.entry_event) {
        return Ok(RunReport {
            observed_commands,
            findings: Vec::new(),
            error: Some(error.code),
            restored,
        });
    }

    loop {
        let handed_out = observed_commands.len();
        if handed_out > MAX_COMMANDS {
            return Err(EvToolError::GuardExceeded {
                max_commands: MAX_COMMANDS,
            });
        }
        for update in case
            .updates
            .iter()
            .filter(|update| update.after_command == handed_out)
        {
            host.set(&update.name, update.value.clone());
        }
        if !restored && case.save_after == Some(handed_out) {
            runner = reload(runner.save(), Arc::clone(&catalog))?;
            restored = true;
            debug!("case restored after {} commands", handed_out);
        }

        match runner.fetch_next_command(&host) {
            Ok(Some(command)) => observed_commands.push(ExpectedCommand::from(command)),
            Ok(None) => break,
            Err(error) => {
                return Ok(RunReport {
                    observed_commands,
                    findings: Vec::new(),
                    error: Some(error.code),
                    restored,
                })
            }
        }
    }

    Ok(RunReport {
        observed_commands,
        findings: Vec::new(),
        error: None,
        restored,
    })
}

/// Saves through JSON the way a game would persist it, then restores a
/// fresh runner from the text.
fn reload(
    snapshot: RunnerSnapshot,
    catalog: Arc<BTreeMap<String, String>>,
) -> Result<EventRunner, EvToolError> {
    let json = serde_json::to_string(&snapshot).map_err(EvToolError::SnapshotJson)?;
    let parsed: RunnerSnapshot = serde_json::from_str(&json).map_err(EvToolError::SnapshotJson)?;
    let mut runner = EventRunner::new(catalog);
    runner.restore(&parsed)?;
    Ok(runner)
}

pub fn assert_case(case_dir: &Path, case_path: &Path) -> Result<(), EvToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(case_dir, &case)?;

    if case.is_check_case() {
        if report.findings != case.expected_findings {
            return Err(EvToolError::FindingMismatch {
                expected: case.expected_findings,
                actual: report.findings,
            });
        }
        return Ok(());
    }

    if report.error != case.expected_error {
        return Err(EvToolError::ErrorMismatch {
            expected: case.expected_error,
            actual: report.error,
        });
    }

    if report.observed_commands.len() != case.expected_commands.len() {
        let observed = serde_json::to_string_pretty(&report.observed_commands)
            .map_err(EvToolError::CommandSerialize)?;
        return Err(EvToolError::CommandCountMismatch {
            expected: case.expected_commands.len(),
            actual: report.observed_commands.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_commands
        .iter()
        .zip(report.observed_commands.iter())
        .enumerate()
    {
        if expected != actual {
            let expected =
                serde_json::to_string(expected).map_err(EvToolError::CommandSerialize)?;
            let actual = serde_json::to_string(actual).map_err(EvToolError::CommandSerialize)?;
            return Err(EvToolError::CommandMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use crate::tool_test_support::*;
    use crate::{StateUpdate, TESTCASE_SCHEMA_V1};
    use ev_core::EventValue;

    fn case() -> TestCase {
        TestCase {
            schema_version: TESTCASE_SCHEMA_V1.to_string(),
            entry_event: "main".to_string(),
            globals: BTreeMap::new(),
            updates: Vec::new(),
            save_after: None,
            expected_commands: Vec::new(),
            expected_findings: Vec::new(),
            expected_error: None,
        }
    }

    fn texts(report: &RunReport) -> Vec<String> {
        report
            .observed_commands
            .iter()
            .map(|command| {
                command
                    .parameters
                    .get("Text")
                    .map(ToString::to_string)
                    .unwrap_or_else(|| command.id.clone())
            })
            .collect()
    }

    #[test]
    fn run_case_collects_commands_across_calls() {
        let root = temp_dir("calls");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\n$alert(\"one\")\n$trigger_script(\"side\")\n$alert(\"three\")",
        );
        write_file(&root.join("side.event"), "alert;two");

        let report = run_case(&root, &case()).expect("run should pass");
        assert_eq!(texts(&report), vec!["one", "two", "three"]);
        assert!(!report.restored);
    }

    #[test]
    fn updates_and_save_after_apply_between_commands() {
        let root = temp_dir("updates");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\n$alert(\"start\")\nwhile not Done:\n    $alert(\"tick\")\n$alert(\"end\")",
        );
        let mut case = case();
        case.globals.insert("Done".to_string(), EventValue::Bool(false));
        case.updates.push(StateUpdate {
            after_command: 3,
            name: "Done".to_string(),
            value: EventValue::Bool(true),
        });
        case.save_after = Some(2);

        let report = run_case(&root, &case).expect("run should pass");
        assert!(report.restored);
        assert_eq!(texts(&report), vec!["start", "tick", "tick", "end"]);
    }

    #[test]
    fn check_cases_report_findings_for_the_entry() {
        let root = temp_dir("findings");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\nfor i in range(2):\n    $battle_save",
        );
        let mut case = case();
        case.expected_findings = vec![ErrorCode::NoSaveInLoop];
        let report = run_case(&root, &case).expect("run should pass");
        assert_eq!(report.findings, vec![ErrorCode::NoSaveInLoop]);
    }

    #[test]
    fn runtime_errors_end_the_run() {
        let root = temp_dir("runtime");
        write_file(&root.join("main.pyevent"), "#pyev1\n$wait 1\nbreak");
        let report = run_case(&root, &case()).expect("run should pass");
        assert_eq!(report.observed_commands.len(), 1);
        assert_eq!(report.error, Some(ErrorCode::Runtime));

        let missing = temp_dir("missing-entry");
        write_file(&missing.join("other.pyevent"), "#pyev1\n$wait 1");
        let error = run_case(&missing, &case()).expect_err("no main");
        assert!(matches!(error, EvToolError::MissingEntry { .. }));
    }

    #[test]
    fn run_case_reports_guard_exceeded() {
        let root = temp_dir("guard");
        write_file(
            &root.join("main.pyevent"),
            "#pyev1\nwhile True:\n    $alert(\"tick\")",
        );
        let error = run_case(&root, &case()).expect_err("guard should fail");
        assert!(matches!(error, EvToolError::GuardExceeded { .. }));
    }

    #[test]
    fn assert_case_reports_mismatches() {
        let root = temp_dir("assert");
        write_file(&root.join("main.pyevent"), "#pyev1\n$alert(\"Hello\")");

        let count_case = root.join("count.json");
        write_file(&count_case, r#"{"schemaVersion":"ev-tool-case.v1"}"#);
        let error = assert_case(&root, &count_case).expect_err("count mismatch");
        assert!(matches!(error, EvToolError::CommandCountMismatch { .. }));

        let value_case = root.join("value.json");
        write_file(
            &value_case,
            r#"{
  "schemaVersion":"ev-tool-case.v1",
  "expectedCommands":[{"id":"alert","parameters":{"Text":"Wrong"}}]
}"#,
        );
        let error = assert_case(&root, &value_case).expect_err("value mismatch");
        assert!(matches!(error, EvToolError::CommandMismatch { .. }));

        let error_case = root.join("error.json");
        write_file(
            &error_case,
            r#"{"schemaVersion":"ev-tool-case.v1","expectedError":"RUNTIME"}"#,
        );
        let error = assert_case(&root, &error_case).expect_err("no error happened");
        assert!(matches!(error, EvToolError::ErrorMismatch { .. }));

        let findings_case = root.join("findings.json");
        write_file(
            &findings_case,
            r#"{"schemaVersion":"ev-tool-case.v1","expectedFindings":["NO_SAVE_IN_LOOP"]}"#,
        );
        let error = assert_case(&root, &findings_case).expect_err("clean event");
        assert!(matches!(error, EvToolError::FindingMismatch { .. }));
    }

    #[test]
    fn assert_case_passes_with_matching_commands() {
        let root = temp_dir("assert-pass");
        write_file(&root.join("main.pyevent"), "#pyev1\n$alert(\"Hello\")");
        let case_path = root.join("testcase.json");
        write_file(
            &case_path,
            r#"{
  "schemaVersion":"ev-tool-case.v1",
  "expectedCommands":[{"id":"alert","parameters":{"Text":"Hello"}}]
}"#,
        );
        assert_case(&root, &case_path).expect("assert should pass");
    }
}
