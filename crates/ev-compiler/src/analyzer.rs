use std::collections::BTreeSet;

use ev_core::{
    ArgValue, CommandCall, CommandRegistry, ErrorCode, ErrorFrame, EventCatalog, EventError,
    EventValue, ScriptWithSentinel, COMMAND_SENTINEL,
};
use ev_parser::pyexpr::{command_refs, expand_command_refs, mentions_word, to_rhai};
use ev_parser::{
    parse_script, parse_text_to_command, version_tag, walk_statements, LegacyLine, ParseMode,
    Stmt, StmtKind, SwsCompiler, RAW_NEWLINE,
};
use rhai::Engine;

use crate::call_args::build_call;
use crate::relocate;
use crate::version::check_version;

/// Static checks run before an event is allowed to execute. Findings are
/// returned, never raised.
pub struct EventAnalyzer<'a> {
    registry: &'a CommandRegistry,
    catalog: &'a dyn EventCatalog,
    engine: Engine,
}

/// A command as seen by the no-save-in-loop walk, for either dialect.
#[derive(Debug, Clone, PartialEq)]
struct CommandSite {
    line: usize,
    command: Option<String>,
    target: CallTarget,
    in_for: bool,
    source_line: String,
}

#[derive(Debug, Clone, PartialEq)]
enum CallTarget {
    None,
    Named(String),
    Unresolved,
}

impl<'a> EventAnalyzer<'a> {
    pub fn new(registry: &'a CommandRegistry, catalog: &'a dyn EventCatalog) -> Self {
        Self {
            registry,
            catalog,
            engine: Engine::new_raw(),
        }
    }

    pub fn verify_event(&self, name: &str, source: &str) -> Vec<EventError> {
        let source = source.replace(RAW_NEWLINE, "\n");
        if let Err(error) = check_version(name, &source) {
            return vec![error];
        }
        let forbidden = forbidden_symbols(name, &source);
        if !forbidden.is_empty() {
            return forbidden;
        }
        let script = SwsCompiler::new(&source).compile_sws();
        let statements = match self.verify_syntax(name, &source, &script) {
            Ok(statements) => statements,
            Err(error) => return vec![error],
        };

        let mut errors = Vec::new();
        self.verify_event_calls(name, &script, &statements, &mut errors);
        self.verify_no_loop_save(name, &source, &mut errors);
        verify_no_yields(name, &source, &statements, &mut errors);
        errors
    }

    fn verify_syntax(
        &self,
        name: &str,
        source: &str,
        script: &ScriptWithSentinel,
    ) -> Result<Vec<Stmt>, EventError> {
        script.check().map_err(|error| error.at(name, 1, ""))?;
        let statements =
            parse_script(&script.source).map_err(|error| relocate(error, name, source))?;

        let mut failures: Vec<(usize, String)> = Vec::new();
        walk_statements(&statements, &mut |stmt, _| {
            if let Err(failure) = self.check_statement(stmt) {
                failures.push(failure);
            }
        });
        for record in &script.records {
            match build_call(record, self.registry) {
                Ok(call) => {
                    for arg in &call.args {
                        if let ArgValue::Expr { source } = &arg.value {
                            if let Err(message) = self.compile_code(source, true) {
                                failures.push((record.line_number, message));
                            }
                        }
                    }
                }
                Err(error) => return Err(relocate(error, name, source)),
            }
        }

        match failures.into_iter().min_by_key(|(line, _)| *line) {
            Some((line, message)) => Err(EventError::new(ErrorCode::InvalidSyntax, message)
                .at(name, line, source_line(source, line))),
            None => Ok(statements),
        }
    }

    fn check_statement(&self, stmt: &Stmt) -> Result<(), (usize, String)> {
        let fail = |message| (stmt.line, message);
        match &stmt.kind {
            StmtKind::Assign { target, value } => self
                .check_code(&format!("{} = {}", target, value), false)
                .map_err(fail),
            StmtKind::AugAssign { target, op, value } => self
                .check_code(&format!("{} {}= {}", target, op, value), false)
                .map_err(fail),
            _ => {
                for (expr, line) in stmt.expressions().into_iter().zip(stmt.expression_lines()) {
                    self.check_code(expr, true).map_err(|message| (line, message))?;
                }
                Ok(())
            }
        }
    }

    /// `yield` is left for the yield check to report.
    fn check_code(&self, code: &str, expression: bool) -> Result<(), String> {
        if mentions_word(code, "yield") {
            return Ok(());
        }
        let rewritten = to_rhai(&expand_command_refs(code))?;
        self.compile_code(&rewritten, expression)
    }

    fn compile_code(&self, rhai_source: &str, expression: bool) -> Result<(), String> {
        let rhai_source = expand_command_refs(rhai_source);
        let compiled = if expression {
            self.engine.compile_expression(&rhai_source)
        } else {
            self.engine.compile(&rhai_source)
        };
        compiled.map(|_| ()).map_err(|error| error.to_string())
    }

    fn verify_event_calls(
        &self,
        name: &str,
        script: &ScriptWithSentinel,
        statements: &[Stmt],
        errors: &mut Vec<EventError>,
    ) {
        walk_statements(statements, &mut |stmt, context| match &stmt.kind {
            StmtKind::Command { ordinal } => {
                let Some(record) = script.records.get(*ordinal) else {
                    return;
                };
                let line = record.line_number;
                if context.in_def {
                    errors.push(
                        EventError::new(
                            ErrorCode::NestedEvent,
                            "Event commands cannot be used inside a function definition.",
                        )
                        .at(name, line, &record.source),
                    );
                }
                for nested in command_refs(&record.source).iter().skip(1) {
                    errors.push(
                        EventError::new(
                            ErrorCode::NestedEvent,
                            format!("Event command '{}' cannot be an argument of another command.", nested),
                        )
                        .at(name, line, &record.source),
                    );
                }
                if let Ok(call) = build_call(record, self.registry) {
                    if !self.registry.is_python_callable(&call.name) {
                        errors.push(
                            EventError::new(
                                ErrorCode::InvalidCommand,
                                format!("Unknown event command '{}'.", call.name),
                            )
                            .at(name, line, &record.source),
                        );
                    }
                }
            }
            _ => {
                for (expr, line) in stmt.expressions().into_iter().zip(stmt.expression_lines()) {
                    for nested in command_refs(expr) {
                        errors.push(
                            EventError::new(
                                ErrorCode::NestedEvent,
                                format!(
                                    "Event command '{}' must be a statement of its own, not part of an expression.",
                                    nested
                                ),
                            )
                            .at(name, line, source_line(&script.source, line)),
                        );
                    }
                }
            }
        });
    }

    fn verify_no_loop_save(&self, name: &str, source: &str, errors: &mut Vec<EventError>) {
        let sites = self.command_sites(source);
        let mut chain = Vec::new();
        let mut walked = BTreeSet::new();
        self.check_sites(name, &sites, &mut chain, &mut walked, errors);
    }

    /// Walks the command sites of one event. At the top level only commands
    /// inside a `for` count; once inside a called event every save counts.
    /// Each called event is walked once, through the first chain reaching it.
    fn check_sites(
        &self,
        event: &str,
        sites: &[CommandSite],
        chain: &mut Vec<ErrorFrame>,
        walked: &mut BTreeSet<String>,
        errors: &mut Vec<EventError>,
    ) {
        let nested = !chain.is_empty();
        for site in sites {
            if !(nested || site.in_for) {
                continue;
            }
            let Some(command) = site.command.as_deref() else {
                continue;
            };
            let frame = ErrorFrame {
                event: event.to_string(),
                line: site.line,
                source_line: site.source_line.clone(),
            };
            if self.registry.is_save_point(command) {
                errors.push(chained(
                    EventError::new(
                        ErrorCode::NoSaveInLoop,
                        format!(
                            "Save command '{}' cannot run inside a for loop or an event called from one.",
                            command
                        ),
                    ),
                    chain,
                    frame,
                ));
                continue;
            }
            if !self.registry.is_event_call(command) {
                continue;
            }
            let callee = match &site.target {
                CallTarget::Named(target) => self
                    .catalog
                    .event_source(target)
                    .map(|callee_source| (target.clone(), callee_source)),
                CallTarget::None | CallTarget::Unresolved => None,
            };
            let Some((target, callee_source)) = callee else {
                errors.push(chained(
                    EventError::new(
                        ErrorCode::MalformedTriggerScriptCall,
                        "Event calls inside a loop must name an existing event with a string literal.",
                    ),
                    chain,
                    frame,
                ));
                continue;
            };
            if !walked.insert(target.clone()) {
                continue;
            }
            let callee_sites = self.command_sites(&callee_source.replace(RAW_NEWLINE, "\n"));
            chain.push(frame);
            self.check_sites(&target, &callee_sites, chain, walked, errors);
            chain.pop();
        }
    }

    fn command_sites(&self, source: &str) -> Vec<CommandSite> {
        if version_tag(source).is_some() {
            self.pyev_command_sites(source)
        } else {
            self.legacy_command_sites(source)
        }
    }

    fn pyev_command_sites(&self, source: &str) -> Vec<CommandSite> {
        let script = SwsCompiler::new(source).compile_sws();
        let Ok(statements) = parse_script(&script.source) else {
            return Vec::new();
        };
        let mut sites = Vec::new();
        walk_statements(&statements, &mut |stmt, context| {
            let StmtKind::Command { ordinal } = stmt.kind else {
                return;
            };
            let Some(record) = script.records.get(ordinal) else {
                return;
            };
            let Ok(call) = build_call(record, self.registry) else {
                return;
            };
            sites.push(CommandSite {
                line: record.line_number,
                target: call_target(self.registry, &call),
                command: call.command,
                in_for: context.for_depth > 0,
                source_line: record.source.clone(),
            });
        });
        sites
    }

    fn legacy_command_sites(&self, source: &str) -> Vec<CommandSite> {
        let mut sites = Vec::new();
        let mut for_depth = 0usize;
        for (index, text) in source.split('\n').enumerate() {
            let Some(LegacyLine::Command(command)) =
                parse_text_to_command(self.registry, text, ParseMode::Strict)
            else {
                continue;
            };
            match command.id.as_str() {
                "for" => {
                    for_depth += 1;
                    continue;
                }
                "endf" => {
                    for_depth = for_depth.saturating_sub(1);
                    continue;
                }
                _ => {}
            }
            let target = if self.registry.is_event_call(&command.id) {
                match command.values.first() {
                    Some(value) if !value.contains('{') && !value.is_empty() => {
                        CallTarget::Named(value.clone())
                    }
                    _ => CallTarget::Unresolved,
                }
            } else {
                CallTarget::None
            };
            sites.push(CommandSite {
                line: index + 1,
                command: Some(command.id),
                target,
                in_for: for_depth > 0,
                source_line: text.to_string(),
            });
        }
        sites
    }
}

/// The called event's name when it is written as a string literal.
fn call_target(registry: &CommandRegistry, call: &CommandCall) -> CallTarget {
    if !registry.is_event_call(&call.name) {
        return CallTarget::None;
    }
    let argument = call
        .args
        .iter()
        .find(|arg| {
            arg.keyword
                .as_deref()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("Event"))
        })
        .or_else(|| call.args.iter().find(|arg| arg.keyword.is_none()));
    match argument.map(|arg| &arg.value) {
        Some(ArgValue::Literal {
            value: EventValue::String(target),
        }) => CallTarget::Named(target.clone()),
        _ => CallTarget::Unresolved,
    }
}

fn chained(error: EventError, chain: &[ErrorFrame], frame: ErrorFrame) -> EventError {
    let mut error = error;
    error.frames = chain.to_vec();
    error.frames.push(frame);
    error
}

fn source_line(source: &str, line: usize) -> &str {
    source
        .split('\n')
        .nth(line.saturating_sub(1))
        .unwrap_or("")
}

fn forbidden_symbols(name: &str, source: &str) -> Vec<EventError> {
    source
        .split('\n')
        .enumerate()
        .filter(|(_, line)| line.contains(COMMAND_SENTINEL))
        .map(|(index, line)| {
            EventError::new(
                ErrorCode::ForbiddenSymbol,
                format!("{} invalid symbol. Do not use this string in events.", COMMAND_SENTINEL),
            )
            .at(name, index + 1, line)
        })
        .collect()
}

fn verify_no_yields(name: &str, source: &str, statements: &[Stmt], errors: &mut Vec<EventError>) {
    walk_statements(statements, &mut |stmt, _| {
        let uses_yield = matches!(stmt.kind, StmtKind::Yield)
            || stmt
                .expressions()
                .iter()
                .any(|expr| mentions_word(expr, "yield"));
        if uses_yield {
            errors.push(
                EventError::new(ErrorCode::CannotUseYield, "Cannot use 'yield' in events.")
                    .at(name, stmt.line, source_line(source, stmt.line)),
            );
        }
    });
}
