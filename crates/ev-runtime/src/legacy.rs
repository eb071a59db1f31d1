use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use ev_core::{
    CommandRegistry, ErrorCode, EventCommand, EventError, EventSnapshot, EventValue,
    IteratorState, ScriptHost, EVENT_STATE_SCHEMA,
};
use ev_parser::pyexpr::to_rhai;
use ev_parser::{
    find_block_end, next_sibling_branch, parse_text_to_command, LegacyCommand, LegacyLine,
    ParseMode,
};
use log::{debug, trace, warn};
use regex::{Captures, Regex};
use rhai::{Dynamic, Engine, Scope};

use crate::engine::check_snapshot;
use crate::helpers::rhai_bridge::{
    build_engine, dynamic_to_value, iteration_items, value_to_dynamic,
};

/// Text shown in place of a substitution that could not be resolved.
const UNRESOLVED: &str = "??";

fn tagged_substitution() -> &'static Regex {
    static TAGGED: OnceLock<Regex> = OnceLock::new();
    TAGGED.get_or_init(|| {
        Regex::new(r"\{(e|eval|v|var):([^{}]*)\}").expect("substitution regex must compile")
    })
}

/// Runs a `command;arg;arg` event. The program counter is a line index, and
/// every live `for` loop keeps its materialized items so a save inside the
/// loop resumes on the same item.
pub struct LegacyProcessor {
    name: String,
    source: String,
    registry: Arc<CommandRegistry>,
    lines: Vec<LegacyLine>,
    engine: Engine,
    pointer: usize,
    iterators: BTreeMap<usize, IteratorState>,
    args: BTreeMap<String, String>,
    finished: bool,
}

impl LegacyProcessor {
    pub fn new(name: &str, source: &str, registry: Arc<CommandRegistry>) -> Self {
        let lines = source
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .map(|line| {
                parse_text_to_command(&registry, line, ParseMode::Lenient)
                    .unwrap_or_else(|| LegacyLine::Comment(line.to_string()))
            })
            .collect::<Vec<_>>();
        debug!("loaded legacy event '{}' ({} lines)", name, lines.len());
        Self {
            name: name.to_string(),
            source: source.to_string(),
            registry,
            lines,
            engine: build_engine(),
            pointer: 0,
            iterators: BTreeMap::new(),
            args: BTreeMap::new(),
            finished: false,
        }
    }

    /// Starts the event with `args` readable by conditions and substitutions.
    pub fn with_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.args = args;
        self
    }

    pub fn restore(
        snapshot: &EventSnapshot,
        registry: Arc<CommandRegistry>,
    ) -> Result<Self, EventError> {
        check_snapshot(snapshot)?;
        let mut processor = Self::new(&snapshot.script_id, &snapshot.source, registry);
        let pointer = snapshot.cursor as usize;
        if pointer > processor.lines.len() {
            return Err(EventError::new(
                ErrorCode::Snapshot,
                format!(
                    "saved line {} is past the end of event '{}'",
                    pointer, snapshot.script_id
                ),
            ));
        }
        processor.pointer = pointer;
        processor.iterators = snapshot.iterators.clone();
        processor.args = snapshot.args.clone();
        processor.finished = snapshot.finished;
        Ok(processor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Index of the next line to run.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn lines(&self) -> &[LegacyLine] {
        &self.lines
    }

    pub fn iterators(&self) -> &BTreeMap<usize, IteratorState> {
        &self.iterators
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn finish(&mut self) {
        self.finished = true;
        self.iterators.clear();
    }

    pub fn save(&self) -> EventSnapshot {
        EventSnapshot {
            schema_version: EVENT_STATE_SCHEMA.to_string(),
            script_id: self.name.clone(),
            source: self.source.clone(),
            finished: self.finished,
            cursor: self.pointer as u32,
            cursor_hits: 1,
            hits: BTreeMap::new(),
            iterators: self.iterators.clone(),
            args: self.args.clone(),
        }
    }

    /// Text of the 1-based `line`, or an empty string past the end.
    pub fn source_line(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|index| self.source.split('\n').nth(index))
            .unwrap_or("")
    }

    fn block_error(&self, index: usize, message: impl Into<String>) -> EventError {
        EventError::new(ErrorCode::BlockMismatch, message).at(
            self.name.as_str(),
            index + 1,
            self.source_line(index + 1),
        )
    }

    /// Matching `end` (or `endf`) of the block opened at `index`.
    pub fn find_end(&self, index: usize) -> Result<usize, EventError> {
        find_block_end(&self.lines, index)
            .ok_or_else(|| self.block_error(index, "block is never closed"))
    }

    /// Where execution goes from the `if`/`elif` at `index`: the next line
    /// when its condition holds, otherwise the next `elif`, `else` or `end`
    /// of the same chain.
    pub fn jump_conditional(
        &self,
        index: usize,
        host: &dyn ScriptHost,
    ) -> Result<usize, EventError> {
        self.jump_with(index, &self.scope(host)).map(|(next, _)| next)
    }

    /// Game state with the event's own args on top.
    fn scope(&self, host: &dyn ScriptHost) -> BTreeMap<String, EventValue> {
        let mut globals = host.globals();
        for (name, value) in &self.args {
            globals.insert(name.clone(), EventValue::String(value.clone()));
        }
        globals
    }

    /// Like [`LegacyProcessor::jump_conditional`], also telling whether the
    /// condition held. An empty branch makes both outcomes land on the same
    /// line.
    fn jump_with(
        &self,
        index: usize,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<(usize, bool), EventError> {
        let condition = match self.lines.get(index) {
            Some(LegacyLine::Command(command)) if matches!(command.id.as_str(), "if" | "elif") => {
                command.values.first().cloned().unwrap_or_default()
            }
            _ => return Err(self.block_error(index, "not a conditional line")),
        };
        if self.condition_holds(&condition, globals) {
            return Ok((index + 1, true));
        }
        next_sibling_branch(&self.lines, index)
            .map(|next| (next, false))
            .ok_or_else(|| self.block_error(index, "conditional has no matching 'end'"))
    }

    /// Runs up to the next non-block line and hands it out bound to its
    /// command's parameters. `None` means the event has ended.
    pub fn fetch_next_command(
        &mut self,
        host: &dyn ScriptHost,
    ) -> Result<Option<EventCommand>, EventError> {
        if self.finished {
            return Ok(None);
        }
        let globals = self.scope(host);

        while let Some(line) = self.lines.get(self.pointer) {
            let index = self.pointer;
            let LegacyLine::Command(command) = line.clone() else {
                self.pointer += 1;
                continue;
            };
            match command.id.as_str() {
                "if" => {
                    let mut header = index;
                    self.pointer = loop {
                        let (next, taken) = self.jump_with(header, &globals)?;
                        if taken {
                            break next;
                        }
                        match self.lines[next].command_id() {
                            Some("elif") => header = next,
                            _ => break next + 1,
                        }
                    };
                }
                // Reached only after the previous branch ran to completion.
                "elif" | "else" => self.pointer = self.find_end(index)? + 1,
                "end" | "comment" => self.pointer += 1,
                "for" => self.enter_for(index, &command, &globals)?,
                "endf" => self.advance_for(index)?,
                _ => {
                    self.pointer += 1;
                    let bound = self.bind(&command, index + 1, &globals).map_err(|error| {
                        error.at(self.name.as_str(), index + 1, self.source_line(index + 1))
                    })?;
                    trace!(
                        "legacy event '{}' yielded '{}' at line {}",
                        self.name,
                        bound.id,
                        index + 1
                    );
                    return Ok(Some(bound));
                }
            }
        }

        debug!("legacy event '{}' finished", self.name);
        self.finish();
        Ok(None)
    }

    fn enter_for(
        &mut self,
        index: usize,
        command: &LegacyCommand,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<(), EventError> {
        let end = self.find_end(index)?;
        let nid = command.values.first().cloned().unwrap_or_default();
        let expression = command.values.get(1).cloned().unwrap_or_default();
        let items = self.loop_items(&expression, globals);
        if items.is_empty() {
            self.iterators.remove(&index);
            self.pointer = end + 1;
            return Ok(());
        }
        self.iterators.insert(
            index,
            IteratorState {
                nid,
                line: index,
                items,
                index: 0,
            },
        );
        self.pointer = index + 1;
        Ok(())
    }

    fn advance_for(&mut self, index: usize) -> Result<(), EventError> {
        let opener = self.find_for(index)?;
        let Some(state) = self.iterators.get_mut(&opener) else {
            return Err(self.block_error(index, "'endf' without a running 'for'"));
        };
        state.index += 1;
        if state.index < state.items.len() {
            self.pointer = opener + 1;
        } else {
            self.iterators.remove(&opener);
            self.pointer = index + 1;
        }
        Ok(())
    }

    /// The `for` line that the `endf` at `index` closes.
    fn find_for(&self, index: usize) -> Result<usize, EventError> {
        let mut depth = 0usize;
        for cursor in (0..index).rev() {
            match self.lines[cursor].command_id() {
                Some("endf") => depth += 1,
                Some("for") if depth == 0 => return Ok(cursor),
                Some("for") => depth -= 1,
                _ => {}
            }
        }
        Err(self.block_error(index, "'endf' without a matching 'for'"))
    }

    fn bind(
        &self,
        command: &LegacyCommand,
        line: usize,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<EventCommand, EventError> {
        let Some(descriptor) = self.registry.get(&command.id) else {
            return Err(EventError::new(
                ErrorCode::InvalidCommand,
                format!("Unknown event command '{}'", command.id),
            ));
        };
        let (values, flags) = command.bind(descriptor);
        let mut bound = EventCommand::new(descriptor.id.as_str(), line);
        for (name, value) in values {
            let text = self.substitute(&value, globals);
            bound.parameters.insert(name, EventValue::String(text));
        }
        if let Some(missing) = descriptor
            .keywords
            .iter()
            .find(|keyword| !bound.parameters.contains_key(keyword.as_str()))
        {
            return Err(EventError::new(
                ErrorCode::BadArguments,
                format!(
                    "'{}' is missing required parameter '{}'",
                    descriptor.id, missing
                ),
            ));
        }
        bound.flags = flags;
        Ok(bound)
    }

    /// Fills `{NID}` with the current item of a running loop and `{1}` with
    /// `arg1`, then resolves `{v:name}` from game state and `{e:expr}` by
    /// evaluation.
    fn substitute(&self, text: &str, globals: &BTreeMap<String, EventValue>) -> String {
        let mut text = text.to_string();
        for state in self.iterators.values() {
            if let Some(item) = state.current() {
                text = text.replace(&format!("{{{}}}", state.nid), item);
            }
        }
        for (name, value) in &self.args {
            if let Some(position) = name.strip_prefix("arg") {
                text = text.replace(&format!("{{{}}}", position), value);
            }
        }
        if !text.contains('{') {
            return text;
        }
        tagged_substitution()
            .replace_all(&text, |captures: &Captures<'_>| {
                let body = &captures[2];
                let resolved = match &captures[1] {
                    "v" | "var" => globals.get(body).map(|value| value.to_string()),
                    _ => self.evaluate(body, globals).ok().map(|value| value.to_string()),
                };
                resolved.unwrap_or_else(|| {
                    warn!(
                        "legacy event '{}' could not resolve '{}'",
                        self.name, &captures[0]
                    );
                    UNRESOLVED.to_string()
                })
            })
            .into_owned()
    }

    fn eval_dynamic(
        &self,
        expression: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<Dynamic, EventError> {
        let source =
            to_rhai(expression).map_err(|message| EventError::new(ErrorCode::Runtime, message))?;
        let mut scope = Scope::new();
        for (name, value) in globals {
            scope.push_dynamic(name.as_str(), value_to_dynamic(value));
        }
        self.engine
            .eval_with_scope::<Dynamic>(&mut scope, &format!("({})", source))
            .map_err(|error| {
                EventError::new(ErrorCode::Runtime, format!("Expression eval failed: {}", error))
            })
    }

    fn evaluate(
        &self,
        expression: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<EventValue, EventError> {
        dynamic_to_value(self.eval_dynamic(expression, globals)?)
    }

    /// Conditions that fail to evaluate count as false.
    fn condition_holds(&self, condition: &str, globals: &BTreeMap<String, EventValue>) -> bool {
        let condition = self.substitute(condition, globals);
        match self.evaluate(&condition, globals) {
            Ok(value) => value.truthy(),
            Err(error) => {
                warn!(
                    "legacy event '{}' condition '{}' failed: {}",
                    self.name, condition, error
                );
                false
            }
        }
    }

    /// Materializes a loop's items as text; an expression that fails to
    /// evaluate gives an empty loop.
    fn loop_items(&self, expression: &str, globals: &BTreeMap<String, EventValue>) -> Vec<String> {
        let expression = self.substitute(expression, globals);
        let items = self
            .eval_dynamic(&expression, globals)
            .and_then(iteration_items);
        match items {
            Ok(items) => items.iter().map(ToString::to_string).collect(),
            Err(error) => {
                warn!(
                    "legacy event '{}' loop over '{}' failed: {}",
                    self.name, expression, error
                );
                Vec::new()
            }
        }
    }
}
