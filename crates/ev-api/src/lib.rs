mod runner;

use std::collections::BTreeMap;
use std::sync::Arc;

use ev_compiler::{compile_event, EventAnalyzer};
use ev_core::{
    CommandRegistry, EventCatalog, EventCommand, EventError, EventSnapshot, ScriptHost,
};
use ev_parser::version_tag;
use ev_runtime::{check_snapshot, EventProcessor, LegacyProcessor, ProcessorOptions};
use log::debug;

pub use runner::{EventRunner, RunnerSnapshot, SavedCall, MAX_CALL_DEPTH};

#[derive(Clone)]
pub struct CreateEventOptions {
    pub name: String,
    pub source: String,
    pub registry: Option<Arc<CommandRegistry>>,
    pub max_steps: Option<usize>,
}

#[derive(Clone)]
pub struct RestoreEventOptions {
    pub snapshot: EventSnapshot,
    pub registry: Option<Arc<CommandRegistry>>,
    pub max_steps: Option<usize>,
}

fn processor_options(
    registry: Arc<CommandRegistry>,
    max_steps: Option<usize>,
) -> ProcessorOptions {
    let defaults = ProcessorOptions::default();
    ProcessorOptions {
        registry,
        max_steps: max_steps.unwrap_or(defaults.max_steps),
    }
}

/// A running event of either dialect. Sources that open with a version tag
/// (`#pyev1`) run compiled; everything else runs line by line.
pub enum EventScript {
    Python(EventProcessor),
    Legacy(LegacyProcessor),
}

impl EventScript {
    pub fn name(&self) -> &str {
        match self {
            Self::Python(processor) => processor.name(),
            Self::Legacy(processor) => processor.name(),
        }
    }

    /// Starts the event with named args (`arg1`, `arg2`, ...).
    pub fn with_args(self, args: BTreeMap<String, String>) -> Self {
        match self {
            Self::Python(processor) => Self::Python(processor.with_args(args)),
            Self::Legacy(processor) => Self::Legacy(processor.with_args(args)),
        }
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Python(processor) => processor.args(),
            Self::Legacy(processor) => processor.args(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    pub fn finished(&self) -> bool {
        match self {
            Self::Python(processor) => processor.finished(),
            Self::Legacy(processor) => processor.finished(),
        }
    }

    pub fn fetch_next_command(
        &mut self,
        host: &dyn ScriptHost,
    ) -> Result<Option<EventCommand>, EventError> {
        match self {
            Self::Python(processor) => processor.fetch_next_command(host),
            Self::Legacy(processor) => processor.fetch_next_command(host),
        }
    }

    pub fn save(&self) -> EventSnapshot {
        match self {
            Self::Python(processor) => processor.save(),
            Self::Legacy(processor) => processor.save(),
        }
    }

    pub fn finish(&mut self) {
        match self {
            Self::Python(processor) => processor.finish(),
            Self::Legacy(processor) => processor.finish(),
        }
    }

    /// The author's text for a 1-based line of this event.
    pub fn source_line(&self, line: usize) -> &str {
        match self {
            Self::Python(processor) => processor.compiled().source_line(line),
            Self::Legacy(processor) => processor.source_line(line),
        }
    }
}

pub fn create_event(options: CreateEventOptions) -> Result<EventScript, EventError> {
    let registry = options.registry.unwrap_or_else(CommandRegistry::shared);
    if version_tag(&options.source).is_none() {
        return Ok(EventScript::Legacy(LegacyProcessor::new(
            &options.name,
            &options.source,
            registry,
        )));
    }
    let compiled = compile_event(&options.name, &options.source, &registry, 0, 1)?;
    Ok(EventScript::Python(EventProcessor::new(
        compiled,
        processor_options(registry, options.max_steps),
    )))
}

/// Rebuilds an event from its saved state. A pyev1 event is recompiled
/// with the saved cursor and replays silently up to it.
pub fn restore_event(options: RestoreEventOptions) -> Result<EventScript, EventError> {
    let registry = options.registry.unwrap_or_else(CommandRegistry::shared);
    let snapshot = options.snapshot;
    check_snapshot(&snapshot)?;
    if version_tag(&snapshot.source).is_none() {
        return LegacyProcessor::restore(&snapshot, registry).map(EventScript::Legacy);
    }

    let (pointer, hits) = if snapshot.finished {
        (0, 1)
    } else {
        (snapshot.cursor, snapshot.cursor_hits)
    };
    let compiled = compile_event(
        &snapshot.script_id,
        &snapshot.source,
        &registry,
        pointer,
        hits,
    )?
    .with_history(snapshot.hits.clone());
    debug!(
        "restoring event '{}' at pointer {} (hits {})",
        snapshot.script_id, pointer, hits
    );
    let mut processor = EventProcessor::new(compiled, processor_options(registry, options.max_steps))
        .with_args(snapshot.args.clone());
    if snapshot.finished {
        processor.finish();
    }
    Ok(EventScript::Python(processor))
}

/// Static findings for an event of either dialect. pyev1 sources go through
/// the analyzer; legacy sources only have their blocks matched.
pub fn verify_event(
    name: &str,
    source: &str,
    registry: &Arc<CommandRegistry>,
    catalog: &dyn EventCatalog,
) -> Vec<EventError> {
    if version_tag(source).is_some() {
        return EventAnalyzer::new(registry, catalog).verify_event(name, source);
    }
    let processor = LegacyProcessor::new(name, source, Arc::clone(registry));
    processor
        .lines()
        .iter()
        .enumerate()
        .filter(|(_, line)| matches!(line.command_id(), Some("if") | Some("for")))
        .filter_map(|(index, _)| processor.find_end(index).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use ev_core::{ErrorCode, EventValue, StaticHost};

    fn create(name: &str, source: &str) -> EventScript {
        create_event(CreateEventOptions {
            name: name.to_string(),
            source: source.to_string(),
            registry: None,
            max_steps: None,
        })
        .expect("event should load")
    }

    fn restore(snapshot: EventSnapshot) -> EventScript {
        restore_event(RestoreEventOptions {
            snapshot,
            registry: None,
            max_steps: None,
        })
        .expect("event should restore")
    }

    fn texts(script: &mut EventScript, host: &StaticHost) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(command) = script.fetch_next_command(host).expect("fetch should pass") {
            texts.push(
                command
                    .parameter("Text")
                    .map(ToString::to_string)
                    .unwrap_or(command.id),
            );
        }
        texts
    }

    #[test]
    fn create_event_dispatches_on_the_version_tag() {
        let python = create("intro", "#pyev1\n$speak(\"Seth\", \"Hi\")");
        assert!(!python.is_legacy());
        let legacy = create("intro", "speak;Seth;Hi");
        assert!(legacy.is_legacy());
        assert_eq!(legacy.name(), "intro");
    }

    #[test]
    fn create_event_surfaces_compile_errors() {
        let error = create_event(CreateEventOptions {
            name: "broken".to_string(),
            source: "#pyev9\n$wait 1".to_string(),
            registry: None,
            max_steps: None,
        })
        .err()
        .expect("unknown version");
        assert_eq!(error.code, ErrorCode::InvalidVersion);
    }

    #[test]
    fn both_dialects_resume_where_they_were_saved() {
        let host = StaticHost::default();
        for source in [
            "#pyev1\n$alert(\"one\")\n$alert(\"two\")\n$alert(\"three\")",
            "alert;one\nalert;two\nalert;three",
        ] {
            let mut script = create("story", source);
            script.fetch_next_command(&host).expect("fetch");
            let snapshot = script.save();
            let json = serde_json::to_string(&snapshot).expect("snapshot should serialize");
            let parsed: EventSnapshot = serde_json::from_str(&json).expect("snapshot should parse");
            let mut restored = restore(parsed);
            assert_eq!(texts(&mut restored, &host), vec!["two", "three"], "{}", source);
        }
    }

    #[test]
    fn saved_pass_history_survives_json() {
        let host = StaticHost::default();
        let source = "#pyev1\nfor i in range(3):\n    if i == 1:\n        $alert(\"a\")\n    else:\n        $alert(\"b\")";
        let mut script = create("loop", source);
        script.fetch_next_command(&host).expect("fetch");
        script.fetch_next_command(&host).expect("fetch");
        let json = serde_json::to_string(&script.save()).expect("snapshot should serialize");
        assert!(json.contains("\"hits\""));
        let parsed: EventSnapshot = serde_json::from_str(&json).expect("snapshot should parse");
        let mut restored = restore(parsed);
        assert_eq!(texts(&mut restored, &host), vec!["b"]);
    }

    #[test]
    fn finished_events_restore_as_finished() {
        let host = StaticHost::default();
        let mut script = create("done", "#pyev1\n$wait 1");
        texts(&mut script, &host);
        assert!(script.finished());
        let mut restored = restore(script.save());
        assert!(restored.finished());
        assert!(restored
            .fetch_next_command(&host)
            .expect("fetch")
            .is_none());
    }

    #[test]
    fn foreign_snapshots_are_rejected() {
        let mut snapshot = create("story", "alert;one").save();
        snapshot.schema_version = "other".to_string();
        let error = restore_event(RestoreEventOptions {
            snapshot,
            registry: None,
            max_steps: None,
        })
        .err()
        .expect("schema mismatch");
        assert_eq!(error.code, ErrorCode::Snapshot);
    }

    #[test]
    fn max_steps_reaches_the_processor() {
        let mut script = create_event(CreateEventOptions {
            name: "spin".to_string(),
            source: "#pyev1\nwhile True:\n    pass".to_string(),
            registry: None,
            max_steps: Some(50),
        })
        .expect("event should load");
        let error = script
            .fetch_next_command(&StaticHost::default())
            .expect_err("loop never yields");
        assert_eq!(error.code, ErrorCode::GuardExceeded);
    }

    #[test]
    fn verify_event_covers_both_dialects() {
        let catalog = BTreeMap::new();
        let registry = CommandRegistry::shared();
        assert!(verify_event("ok", "#pyev1\n$wait 1", &registry, &catalog).is_empty());
        let findings = verify_event(
            "loop",
            "#pyev1\nfor i in range(2):\n    $battle_save",
            &registry,
            &catalog,
        );
        assert_eq!(findings[0].code, ErrorCode::NoSaveInLoop);

        let findings = verify_event("legacy", "if;True\nfor;x;[1]\nendf", &registry, &catalog);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, ErrorCode::BlockMismatch);
        assert_eq!(findings[0].line(), Some(1));
    }

    #[test]
    fn legacy_substitutions_read_host_state() {
        let host = StaticHost::default().with("Lord", "Eirika");
        let mut script = create("legacy", "speak;MU;Hello {v:Lord}");
        let command = script
            .fetch_next_command(&host)
            .expect("fetch")
            .expect("speak");
        assert_eq!(
            command.parameter("Text"),
            Some(&EventValue::from("Hello Eirika"))
        );
    }
}
