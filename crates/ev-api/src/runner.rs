use std::collections::BTreeMap;
use std::sync::Arc;

use ev_core::{
    CommandRegistry, ErrorCode, EventCatalog, EventCommand, EventError, EventSnapshot, ScriptHost,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{create_event, restore_event, CreateEventOptions, EventScript, RestoreEventOptions};

/// Deepest chain of `trigger_script` calls a runner follows.
pub const MAX_CALL_DEPTH: usize = 32;

/// One running event of a saved call stack. `call_line` is set on every
/// event except the innermost: the line of the call it is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCall {
    pub state: EventSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_line: Option<usize>,
}

/// Call stack of a runner, outermost event first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSnapshot {
    pub calls: Vec<SavedCall>,
}

struct RunningEvent {
    script: EventScript,
    call_line: Option<usize>,
}

/// Runs an event together with every event it starts. Event-call commands
/// never reach the host: the callee is looked up in the catalog and runs to
/// its end before the caller continues.
pub struct EventRunner {
    catalog: Arc<dyn EventCatalog>,
    registry: Arc<CommandRegistry>,
    max_steps: Option<usize>,
    stack: Vec<RunningEvent>,
}

impl EventRunner {
    pub fn new(catalog: Arc<dyn EventCatalog>) -> Self {
        Self {
            catalog,
            registry: CommandRegistry::shared(),
            max_steps: None,
            stack: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn start(&mut self, name: &str) -> Result<(), EventError> {
        self.stack.clear();
        let script = self.load(name)?;
        info!("started event '{}'", name);
        self.stack.push(RunningEvent {
            script,
            call_line: None,
        });
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Names of the running events, outermost first.
    pub fn call_stack(&self) -> Vec<&str> {
        self.stack.iter().map(|running| running.script.name()).collect()
    }

    pub fn fetch_next_command(
        &mut self,
        host: &dyn ScriptHost,
    ) -> Result<Option<EventCommand>, EventError> {
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Ok(None);
            };
            let command = match top.script.fetch_next_command(host) {
                Ok(Some(command)) => command,
                Ok(None) => {
                    let done = self.stack.pop();
                    if let Some(caller) = self.stack.last_mut() {
                        caller.call_line = None;
                    }
                    if let Some(done) = done {
                        debug!("event '{}' returned", done.script.name());
                    }
                    continue;
                }
                Err(error) => return Err(self.with_callers(error)),
            };

            if !self.registry.is_event_call(&command.id) {
                return Ok(Some(command));
            }
            top.call_line = Some(command.line);
            if let Err(error) = self.enter(&command) {
                let error = self.with_callers(error);
                if let Some(top) = self.stack.last_mut() {
                    top.call_line = None;
                }
                return Err(error);
            }
        }
    }

    pub fn save(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            calls: self
                .stack
                .iter()
                .map(|running| SavedCall {
                    state: running.script.save(),
                    call_line: running.call_line,
                })
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &RunnerSnapshot) -> Result<(), EventError> {
        let mut stack = Vec::with_capacity(snapshot.calls.len());
        for call in &snapshot.calls {
            let script = restore_event(RestoreEventOptions {
                snapshot: call.state.clone(),
                registry: Some(Arc::clone(&self.registry)),
                max_steps: self.max_steps,
            })?;
            stack.push(RunningEvent {
                script,
                call_line: call.call_line,
            });
        }
        self.stack = stack;
        Ok(())
    }

    fn load(&self, name: &str) -> Result<EventScript, EventError> {
        let Some(source) = self.catalog.event_source(name) else {
            return Err(EventError::new(
                ErrorCode::UnknownEvent,
                format!("Event '{}' does not exist", name),
            ));
        };
        create_event(CreateEventOptions {
            name: name.to_string(),
            source,
            registry: Some(Arc::clone(&self.registry)),
            max_steps: self.max_steps,
        })
    }

    /// Starts the callee named by an event-call command, handing it the
    /// call's args.
    fn enter(&mut self, command: &EventCommand) -> Result<(), EventError> {
        if self.stack.len() >= MAX_CALL_DEPTH {
            return Err(EventError::new(
                ErrorCode::GuardExceeded,
                format!("event calls nest deeper than {}", MAX_CALL_DEPTH),
            ));
        }
        let Some(target) = command.parameter("Event") else {
            return Err(EventError::new(
                ErrorCode::MalformedTriggerScriptCall,
                format!("'{}' names no event", command.id),
            ));
        };
        let args = self.call_args(command);
        let script = self.load(&target.to_string())?.with_args(args);
        debug!("'{}' calls event '{}'", command.id, script.name());
        self.stack.push(RunningEvent {
            script,
            call_line: None,
        });
        Ok(())
    }

    /// `trigger_script_with_args` passes its optional values as `arg1`,
    /// `arg2`, ... by position; `trigger_script` passes on the caller's own.
    fn call_args(&self, command: &EventCommand) -> BTreeMap<String, String> {
        let descriptor = match self.registry.get(&command.id) {
            Some(descriptor) if command.id == "trigger_script_with_args" => descriptor,
            _ => {
                return self
                    .stack
                    .last()
                    .map(|caller| caller.script.args().clone())
                    .unwrap_or_default()
            }
        };
        descriptor
            .parameter_slots()
            .iter()
            .skip(descriptor.keywords.len())
            .enumerate()
            .filter_map(|(position, slot)| {
                command
                    .parameter(slot)
                    .map(|value| (format!("arg{}", position + 1), value.to_string()))
            })
            .collect()
    }

    /// Adds a frame for every caller waiting below the failing event.
    fn with_callers(&self, error: EventError) -> EventError {
        self.stack
            .iter()
            .rev()
            .filter_map(|running| running.call_line.map(|line| (running, line)))
            .fold(error, |error, (running, line)| {
                error.called_from(
                    running.script.name(),
                    line,
                    running.script.source_line(line),
                )
            })
    }
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    use ev_core::StaticHost;

    fn catalog(entries: &[(&str, &str)]) -> Arc<dyn EventCatalog> {
        Arc::new(
            entries
                .iter()
                .map(|(name, source)| (name.to_string(), source.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn texts(runner: &mut EventRunner, host: &StaticHost) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(command) = runner.fetch_next_command(host).expect("fetch should pass") {
            texts.push(
                command
                    .parameter("Text")
                    .map(ToString::to_string)
                    .unwrap_or(command.id),
            );
        }
        texts
    }

    fn story() -> Arc<dyn EventCatalog> {
        catalog(&[
            (
                "main",
                "#pyev1\n$alert(\"before\")\n$trigger_script(\"side\")\n$alert(\"after\")",
            ),
            ("side", "alert;side one\ntrigger_script;inner\nalert;side two"),
            ("inner", "#pyev1\nfor i in range(2):\n    $alert(\"inner \" + str(i))"),
        ])
    }

    #[test]
    fn callees_run_inside_their_caller() {
        let mut runner = EventRunner::new(story());
        runner.start("main").expect("start");
        assert_eq!(
            texts(&mut runner, &StaticHost::default()),
            vec![
                "before",
                "side one",
                "inner 0",
                "inner 1",
                "side two",
                "after"
            ]
        );
        assert!(runner.finished());
    }

    #[test]
    fn the_whole_stack_saves_and_restores() {
        let host = StaticHost::default();
        let mut runner = EventRunner::new(story());
        runner.start("main").expect("start");
        for _ in 0..3 {
            runner.fetch_next_command(&host).expect("fetch");
        }
        assert_eq!(runner.call_stack(), vec!["main", "side", "inner"]);
        let snapshot = runner.save();
        assert_eq!(snapshot.calls[0].call_line, Some(3));
        assert_eq!(snapshot.calls[1].call_line, Some(2));
        assert_eq!(snapshot.calls[2].call_line, None);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let parsed: RunnerSnapshot = serde_json::from_str(&json).expect("parse");
        let mut restored = EventRunner::new(story());
        restored.restore(&parsed).expect("restore");
        assert_eq!(restored.depth(), 3);
        assert_eq!(
            texts(&mut restored, &host),
            vec!["inner 1", "side two", "after"]
        );
    }

    #[test]
    fn callee_errors_carry_the_callers() {
        let events = catalog(&[
            ("main", "#pyev1\n$trigger_script(\"broken\")"),
            ("broken", "#pyev1\n$wait 1\nx = missing_name + 1"),
        ]);
        let mut runner = EventRunner::new(events);
        runner.start("main").expect("start");
        let host = StaticHost::default();
        runner.fetch_next_command(&host).expect("wait");
        let error = runner.fetch_next_command(&host).expect_err("runtime error");
        assert_eq!(error.code, ErrorCode::Runtime);
        let chain = error
            .frames
            .iter()
            .map(|frame| (frame.event.as_str(), frame.line))
            .collect::<Vec<_>>();
        assert_eq!(chain, vec![("main", 2), ("broken", 3)]);
        assert_eq!(error.frames[0].source_line, "$trigger_script(\"broken\")");
    }

    #[test]
    fn callees_read_the_values_they_were_called_with() {
        let events = catalog(&[
            (
                "main",
                "#pyev1\n$trigger_script_with_args(\"greet\", \"Seth\", \"dawn\")\n$alert(\"back\")",
            ),
            (
                "greet",
                "#pyev1\n$alert(\"hello \" + arg1)\nif arg2 == \"dawn\":\n    $alert(\"early\")\n$trigger_script(\"echo\")",
            ),
            ("echo", "alert;{1} again\nif;arg2 == 'dawn'\nalert;{v:arg2} again\nend"),
        ]);
        let host = StaticHost::default();
        let mut runner = EventRunner::new(events);
        runner.start("main").expect("start");
        assert_eq!(
            texts(&mut runner, &host),
            vec!["hello Seth", "early", "Seth again", "dawn again", "back"]
        );

        let mut runner = EventRunner::new(catalog(&[
            ("main", "trigger_script_with_args;greet;Eirika"),
            ("greet", "#pyev1\n$alert(\"one\")\n$alert(arg1)"),
        ]));
        runner.start("main").expect("start");
        runner.fetch_next_command(&host).expect("fetch");
        let json = serde_json::to_string(&runner.save()).expect("snapshot should serialize");
        let parsed: RunnerSnapshot = serde_json::from_str(&json).expect("snapshot should parse");
        let mut restored = EventRunner::new(catalog(&[]));
        restored.restore(&parsed).expect("restore");
        assert_eq!(texts(&mut restored, &host), vec!["Eirika"]);
    }

    #[test]
    fn unknown_callees_are_reported_at_the_call() {
        let events = catalog(&[("main", "trigger_script;nowhere")]);
        let mut runner = EventRunner::new(events);
        runner.start("main").expect("start");
        let error = runner
            .fetch_next_command(&StaticHost::default())
            .expect_err("missing event");
        assert_eq!(error.code, ErrorCode::UnknownEvent);
        assert_eq!(error.line(), Some(1));
        assert_eq!(error.frames[0].event, "main");

        let error = EventRunner::new(catalog(&[]))
            .start("main")
            .expect_err("nothing to start");
        assert_eq!(error.code, ErrorCode::UnknownEvent);
    }

    #[test]
    fn self_calls_stop_at_the_depth_limit() {
        let events = catalog(&[("main", "trigger_script;main")]);
        let mut runner = EventRunner::new(events);
        runner.start("main").expect("start");
        let error = runner
            .fetch_next_command(&StaticHost::default())
            .expect_err("unbounded recursion");
        assert_eq!(error.code, ErrorCode::GuardExceeded);
        assert_eq!(error.frames.len(), MAX_CALL_DEPTH);
    }
}
