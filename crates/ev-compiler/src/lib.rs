mod analyzer;
mod call_args;
mod postcomp;
mod version;

use ev_core::{CommandRegistry, CompiledEvent, ErrorCode, EventError, COMMAND_SENTINEL};
use ev_parser::{SwsCompiler, RAW_NEWLINE};
use log::debug;

pub use analyzer::EventAnalyzer;
pub use call_args::build_call;
pub use postcomp::postcompile;
pub use version::{check_version, is_known_version, KNOWN_VERSIONS};

/// Compiles a pyev1 event. A non-zero `command_pointer` produces an event
/// that replays silently up to that suspend point (its `hits`-th pass) before
/// handing out commands again.
pub fn compile_event(
    name: &str,
    source: &str,
    registry: &CommandRegistry,
    command_pointer: u32,
    hits: u32,
) -> Result<CompiledEvent, EventError> {
    let source = source.replace(RAW_NEWLINE, "\n");
    check_version(name, &source)?;
    if let Some((index, line)) = source
        .split('\n')
        .enumerate()
        .find(|(_, line)| line.contains(COMMAND_SENTINEL))
    {
        return Err(EventError::new(
            ErrorCode::ForbiddenSymbol,
            format!("{} invalid symbol. Do not use this string in events.", COMMAND_SENTINEL),
        )
        .at(name, index + 1, line));
    }

    let script = SwsCompiler::new(&source).compile_sws();
    let program = postcompile(&script, registry).map_err(|error| relocate(error, name, &source))?;
    debug!(
        "compiled event '{}' ({} commands, pointer {})",
        name, program.suspend_count, command_pointer
    );
    Ok(CompiledEvent::new(name, source, program).with_pointer(command_pointer, hits))
}

/// Fills in the event name of unnamed frames and swaps the text of the
/// placeholder script for the author's own line.
pub(crate) fn relocate(error: EventError, name: &str, source: &str) -> EventError {
    let lines = source.split('\n').collect::<Vec<_>>();
    let mut error = error;
    for frame in &mut error.frames {
        if frame.event.is_empty() {
            frame.event = name.to_string();
            if let Some(line) = frame.line.checked_sub(1).and_then(|index| lines.get(index)) {
                frame.source_line = line.to_string();
            }
        }
    }
    error
}

#[cfg(test)]
mod compile_tests {
    use super::*;
    use ev_core::Node;

    #[test]
    fn compiles_the_three_command_scenario() {
        let compiled = compile_event(
            "intro",
            "#pyev1\n$speak(eirika,\"Hello\")\nfor i in range(2):\n    $speak(seth,\"Hi\")",
            CommandRegistry::builtin(),
            0,
            1,
        )
        .expect("event should compile");
        assert_eq!(compiled.name, "intro");
        assert_eq!(compiled.program.suspend_count, 2);
        assert!(compiled.resume.is_none());
        assert_eq!(compiled.line_offset, 4);
    }

    #[test]
    fn pointer_seeds_resume_state() {
        let compiled = compile_event("intro", "#pyev1\n$wait 1\n$wait 2", CommandRegistry::builtin(), 1, 1)
            .expect("event should compile");
        let resume = compiled.resume.expect("resume state");
        assert_eq!((resume.target, resume.target_hits, resume.catching_up), (1, 1, true));
    }

    #[test]
    fn errors_name_the_event_and_author_line() {
        let error = compile_event(
            "intro",
            "#pyev1\n$speak(a, b) extra",
            CommandRegistry::builtin(),
            0,
            1,
        )
        .expect_err("malformed call");
        assert_eq!(error.code, ErrorCode::InvalidSyntax);
        let frame = error.innermost().expect("frame");
        assert_eq!(frame.event, "intro");
        assert_eq!(frame.source_line, "$speak(a, b) extra");

        let error = compile_event("intro", "#pyev1\nif x:\n$wait 1", CommandRegistry::builtin(), 0, 1)
            .expect_err("bad block");
        assert_eq!(error.innermost().map(|frame| frame.event.as_str()), Some("intro"));

        let error = compile_event("intro", "$wait 1", CommandRegistry::builtin(), 0, 1)
            .expect_err("no version");
        assert_eq!(error.code, ErrorCode::InvalidVersion);
    }

    #[test]
    fn listing_maps_back_to_author_lines() {
        let compiled = compile_event(
            "intro",
            "#pyev1\nif flag:\n    $speak(eirika, \"Hi\"), no_block",
            CommandRegistry::builtin(),
            0,
            1,
        )
        .expect("event should compile");
        let listing = compiled.listing();
        let lines = listing.split('\n').collect::<Vec<_>>();
        let yield_line = lines
            .iter()
            .position(|line| line.contains("yield (1,"))
            .expect("suspend point in listing")
            + 1;
        assert_eq!(compiled.original_line(yield_line), Some(3));
        assert!(matches!(
            &compiled.program.block(0).nodes[0],
            Node::If { branches, .. } if branches[0].guard.contains(&1)
        ));
    }
}
