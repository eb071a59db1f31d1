mod binding;
mod control_flow;
mod eval;
mod lifecycle;
mod snapshot;
mod step;

pub use lifecycle::{EventProcessor, ProcessorOptions, DEFAULT_MAX_STEPS};
pub use snapshot::check_snapshot;

#[cfg(test)]
pub(super) mod runtime_test_support {
    use super::*;
    use ev_compiler::compile_event;
    use ev_core::{CommandRegistry, EventCommand, EventSnapshot, ScriptHost};

    pub(super) fn processor_from_source(source: &str) -> EventProcessor {
        processor_at(source, 0, 1)
    }

    pub(super) fn processor_at(source: &str, pointer: u32, hits: u32) -> EventProcessor {
        let compiled = compile_event("test", source, CommandRegistry::builtin(), pointer, hits)
            .expect("compile should pass");
        EventProcessor::new(compiled, ProcessorOptions::default())
    }

    /// Resumes the way a restored game does, with the saved pass history.
    pub(super) fn processor_from_snapshot(snapshot: &EventSnapshot) -> EventProcessor {
        let compiled = compile_event(
            &snapshot.script_id,
            &snapshot.source,
            CommandRegistry::builtin(),
            snapshot.cursor,
            snapshot.cursor_hits,
        )
        .expect("compile should pass")
        .with_history(snapshot.hits.clone());
        EventProcessor::new(compiled, ProcessorOptions::default())
    }

    pub(super) fn drive_to_end(
        processor: &mut EventProcessor,
        host: &dyn ScriptHost,
    ) -> Vec<EventCommand> {
        let mut commands = Vec::new();
        for _ in 0..1_000usize {
            match processor.fetch_next_command(host).expect("fetch should pass") {
                Some(command) => commands.push(command),
                None => return commands,
            }
        }
        panic!("event did not finish");
    }

    /// `id:Text` per command, or just the id for commands without text.
    pub(super) fn summary(commands: &[EventCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|command| match command.parameter("Text") {
                Some(text) => format!("{}:{}", command.id, text),
                None => command.id.clone(),
            })
            .collect()
    }
}
