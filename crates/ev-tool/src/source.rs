use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::{EvToolError, TestCase, TESTCASE_SCHEMA_V1};

const EVENT_EXTENSIONS: [&str; 2] = [".pyevent", ".event"];

/// Events of a case directory keyed by their path without the extension.
pub fn read_events_from_dir(case_dir: &Path) -> Result<BTreeMap<String, String>, EvToolError> {
    let mut events = BTreeMap::new();

    for entry in WalkDir::new(case_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(case_dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        let Some(name) = EVENT_EXTENSIONS
            .iter()
            .find_map(|extension| relative.strip_suffix(extension))
        else {
            continue;
        };

        let content = fs::read_to_string(path).map_err(|source| EvToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        events.insert(name.to_string(), content);
    }

    if events.is_empty() {
        return Err(EvToolError::SourceEmpty {
            path: case_dir.to_path_buf(),
        });
    }

    Ok(events)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, EvToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| EvToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| EvToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(EvToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod source_tests {
    use super::*;
    use crate::tool_test_support::*;

    #[test]
    fn read_events_from_dir_collects_both_extensions() {
        let root = temp_dir("events");
        write_file(&root.join("main.pyevent"), "#pyev1\n$wait 1");
        write_file(&root.join("legacy/side.event"), "wait;1");
        write_file(&root.join("testcase.json"), "{}");

        let events = read_events_from_dir(&root).expect("scan should pass");
        assert_eq!(events.len(), 2);
        assert!(events.contains_key("main"));
        assert!(events.contains_key("legacy/side"));
    }

    #[test]
    fn read_events_from_dir_fails_without_events() {
        let root = temp_dir("no-events");
        write_file(&root.join("testcase.json"), "{}");
        let error = read_events_from_dir(&root).expect_err("empty source should fail");
        assert!(matches!(error, EvToolError::SourceEmpty { .. }));
    }

    #[test]
    fn read_test_case_parses_valid_json() {
        let root = temp_dir("case-ok");
        let case_path = root.join("testcase.json");
        write_file(
            &case_path,
            r#"{
  "schemaVersion":"ev-tool-case.v1",
  "entryEvent":"main",
  "expectedCommands":[{"id":"wait","parameters":{"Time":1}}]
}"#,
        );

        let parsed = read_test_case(&case_path).expect("case should parse");
        assert_eq!(parsed.entry_event, "main");
        assert_eq!(parsed.expected_commands.len(), 1);
    }

    #[test]
    fn read_test_case_reports_read_parse_and_schema_errors() {
        let root = temp_dir("case-errors");
        let error = read_test_case(&root.join("missing.json")).expect_err("missing");
        assert!(matches!(error, EvToolError::ReadFile { .. }));

        let bad_json_path = root.join("bad.json");
        write_file(&bad_json_path, "{");
        let error = read_test_case(&bad_json_path).expect_err("parse should fail");
        assert!(matches!(error, EvToolError::ParseCase { .. }));

        let bad_schema_path = root.join("bad-schema.json");
        write_file(&bad_schema_path, r#"{"schemaVersion":"sl-tool-case.v1"}"#);
        let error = read_test_case(&bad_schema_path).expect_err("schema should fail");
        assert!(matches!(error, EvToolError::InvalidSchemaVersion { .. }));
    }
}
