use std::collections::BTreeMap;
use std::sync::Arc;

use ev_core::{
    BlockId, CommandRegistry, CompiledEvent, EventError, EventValue, Program, ResumeCheck,
};
use log::debug;
use rhai::Engine;

use crate::helpers::rhai_bridge::build_engine;

pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub registry: Arc<CommandRegistry>,
    /// Statements one fetch may execute without reaching a command.
    pub max_steps: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            registry: CommandRegistry::shared(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum FrameKind {
    Root,
    Branch,
    WhileBody,
    ForBody {
        targets: Vec<String>,
        items: Vec<EventValue>,
        position: usize,
    },
}

#[derive(Debug, Clone)]
pub(super) struct RuntimeFrame {
    pub(super) block: BlockId,
    pub(super) node_index: usize,
    pub(super) kind: FrameKind,
}

/// One running pyev1 event. Commands are pulled one at a time; between two
/// fetches the processor holds its whole position in `frames`.
pub struct EventProcessor {
    pub(super) compiled: CompiledEvent,
    pub(super) options: ProcessorOptions,
    pub(super) engine: Engine,
    pub(super) frames: Vec<RuntimeFrame>,
    pub(super) locals: BTreeMap<String, EventValue>,
    pub(super) args: BTreeMap<String, String>,
    pub(super) resume: Option<ResumeCheck>,
    /// Passes over each suspend point since the start of the run, skipped
    /// ones included.
    pub(super) hits: BTreeMap<u32, u32>,
    pub(super) cursor: u32,
    pub(super) cursor_hits: u32,
    pub(super) finished: bool,
}

impl EventProcessor {
    pub fn new(compiled: CompiledEvent, options: ProcessorOptions) -> Self {
        let resume = compiled.resume.clone();
        let cursor = compiled.command_pointer;
        let cursor_hits = resume.as_ref().map(|check| check.target_hits).unwrap_or(0);
        debug!(
            "starting event '{}' at pointer {} (hits {})",
            compiled.name, cursor, cursor_hits
        );
        Self {
            compiled,
            options,
            engine: build_engine(),
            frames: vec![RuntimeFrame {
                block: Program::ROOT,
                node_index: 0,
                kind: FrameKind::Root,
            }],
            locals: BTreeMap::new(),
            args: BTreeMap::new(),
            resume,
            hits: BTreeMap::new(),
            cursor,
            cursor_hits,
            finished: false,
        }
    }

    /// Starts the event with `args` bound as locals.
    pub fn with_args(mut self, args: BTreeMap<String, String>) -> Self {
        for (name, value) in &args {
            self.locals
                .insert(name.clone(), EventValue::String(value.clone()));
        }
        self.args = args;
        self
    }

    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn compiled(&self) -> &CompiledEvent {
        &self.compiled
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Suspend index of the last command handed out, and how many times that
    /// point had been reached when it was.
    pub fn cursor(&self) -> (u32, u32) {
        (self.cursor, self.cursor_hits)
    }

    pub fn is_catching_up(&self) -> bool {
        self.resume.as_ref().is_some_and(|check| check.catching_up)
    }

    pub fn local(&self, name: &str) -> Option<&EventValue> {
        self.locals.get(name)
    }

    /// Ends the event without running the rest of it.
    pub fn finish(&mut self) {
        if !self.finished {
            debug!("event '{}' finished", self.compiled.name);
        }
        self.frames.clear();
        self.finished = true;
    }

    pub(super) fn push_frame(&mut self, block: BlockId, kind: FrameKind) {
        self.frames.push(RuntimeFrame {
            block,
            node_index: 0,
            kind,
        });
    }

    pub(super) fn bump_top_node_index(&mut self, amount: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.node_index += amount;
        }
    }

    /// Attaches the failing line to errors raised without one.
    pub(super) fn locate(&self, error: EventError, line: usize) -> EventError {
        if !error.frames.is_empty() {
            return error;
        }
        error.at(
            self.compiled.name.as_str(),
            line,
            self.compiled.source_line(line),
        )
    }
}
