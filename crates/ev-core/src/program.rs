use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::COMMAND_SENTINEL;
use crate::value::EventValue;

pub type BlockId = usize;

/// Suspend indices lexically inside one branch or loop body.
pub type GuardSet = BTreeSet<u32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ArgValue {
    Literal { value: EventValue },
    /// Bare identifier in the call form: the bound variable if there is one,
    /// the word itself otherwise.
    Word { name: String },
    /// Already rewritten into the evaluator's syntax.
    Expr { source: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArg {
    pub keyword: Option<String>,
    pub value: ArgValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandCall {
    /// Command token as written (id or alias).
    pub name: String,
    /// Canonical id, `None` when the registry does not know the name.
    pub command: Option<String>,
    pub args: Vec<CallArg>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardedBranch {
    pub test: String,
    pub body: BlockId,
    pub guard: GuardSet,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElseBranch {
    pub body: BlockId,
    pub guard: GuardSet,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    Command {
        suspend: u32,
        call: CommandCall,
        line: usize,
    },
    If {
        branches: Vec<GuardedBranch>,
        else_branch: Option<ElseBranch>,
        line: usize,
    },
    While {
        test: String,
        body: BlockId,
        guard: GuardSet,
        line: usize,
    },
    For {
        targets: Vec<String>,
        iter: String,
        body: BlockId,
        line: usize,
    },
    Assign {
        target: String,
        value: String,
        line: usize,
    },
    AugAssign {
        target: String,
        op: String,
        value: String,
        line: usize,
    },
    Expr {
        expr: String,
        line: usize,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
    Pass {
        line: usize,
    },
    Return {
        line: usize,
    },
    /// Parsed but not executable (`def`); reaching it is a runtime error.
    Unsupported {
        construct: String,
        line: usize,
    },
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Self::Command { line, .. }
            | Self::If { line, .. }
            | Self::While { line, .. }
            | Self::For { line, .. }
            | Self::Assign { line, .. }
            | Self::AugAssign { line, .. }
            | Self::Expr { line, .. }
            | Self::Break { line }
            | Self::Continue { line }
            | Self::Pass { line }
            | Self::Return { line }
            | Self::Unsupported { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub blocks: Vec<Block>,
    pub suspend_count: u32,
}

impl Program {
    pub const ROOT: BlockId = 0;

    pub fn empty() -> Self {
        Self {
            blocks: vec![Block::default()],
            suspend_count: 0,
        }
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Every suspend index reachable from `id`, nested bodies included.
    pub fn suspends_in(&self, id: BlockId) -> GuardSet {
        let mut found = GuardSet::new();
        self.collect_suspends(id, &mut found);
        found
    }

    fn collect_suspends(&self, id: BlockId, found: &mut GuardSet) {
        for node in &self.blocks[id].nodes {
            match node {
                Node::Command { suspend, .. } => {
                    found.insert(*suspend);
                }
                Node::If {
                    branches,
                    else_branch,
                    ..
                } => {
                    for branch in branches {
                        self.collect_suspends(branch.body, found);
                    }
                    if let Some(else_branch) = else_branch {
                        self.collect_suspends(else_branch.body, found);
                    }
                }
                Node::While { body, .. } | Node::For { body, .. } => {
                    self.collect_suspends(*body, found);
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    /// Replayed during catch-up; the command must not reach the game.
    Skip,
    Live(u32),
}

/// Catch-up state of a restored event. Each suspend point owes the passes
/// it made before the save; `catching_up` turns false exactly once, when the
/// saved point makes its last owed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeCheck {
    pub target: u32,
    pub target_hits: u32,
    /// Passes per suspend point at save time. Empty when only the cursor is
    /// known.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<u32, u32>,
    pub owed: BTreeMap<u32, u32>,
    pub catching_up: bool,
}

impl ResumeCheck {
    pub fn new(target: u32, target_hits: u32) -> Self {
        let target_hits = target_hits.max(1);
        Self {
            target,
            target_hits,
            history: BTreeMap::new(),
            owed: BTreeMap::from([(target, target_hits)]),
            catching_up: true,
        }
    }

    /// Replays exactly the passes recorded at save time.
    pub fn with_history(mut self, history: BTreeMap<u32, u32>) -> Self {
        if history.is_empty() {
            return self;
        }
        let mut history = history;
        history.insert(self.target, self.target_hits);
        self.owed = history.clone();
        self.history = history;
        self
    }

    pub fn owes(&self, index: u32) -> u32 {
        self.owed.get(&index).copied().unwrap_or(0)
    }

    pub fn control(&mut self, index: u32) -> ControlToken {
        if !self.catching_up {
            return ControlToken::Live(index);
        }
        let remaining = match self.owed.get_mut(&index) {
            Some(owed) if *owed > 0 => {
                *owed -= 1;
                Some(*owed)
            }
            _ => None,
        };
        if let Some(remaining) = remaining {
            if index == self.target && remaining == 0 {
                self.catching_up = false;
            }
            return ControlToken::Skip;
        }
        // Without a history, a point met before the target is either earlier
        // in the source or part of an earlier loop iteration.
        if self.history.is_empty() && (index < self.target || self.target_hits > 1) {
            return ControlToken::Skip;
        }
        self.catching_up = false;
        ControlToken::Live(index)
    }

    /// Which alternative of a branch point catch-up must take, given the
    /// suspend points inside each alternative. `None` leaves the choice to
    /// the real test.
    pub fn choose(&self, alternatives: &[&GuardSet]) -> Option<usize> {
        if !self.catching_up {
            return None;
        }
        if !alternatives.iter().any(|guard| self.owes_any(guard)) {
            return None;
        }
        alternatives
            .iter()
            .position(|guard| self.leads_on(guard))
            .or_else(|| alternatives.iter().position(|guard| !self.owes_any(guard)))
    }

    fn owes_any(&self, guard: &GuardSet) -> bool {
        guard.iter().any(|index| self.owes(*index) > 0)
    }

    /// The last pass of the saved point may only be taken once no other
    /// point outside the alternative still owes one.
    fn leads_on(&self, guard: &GuardSet) -> bool {
        if !self.owes_any(guard) {
            return false;
        }
        if !guard.contains(&self.target) || self.owes(self.target) > 1 {
            return true;
        }
        self.owed
            .iter()
            .all(|(index, owed)| *owed == 0 || guard.contains(index))
    }
}

pub const LISTING_HEADER: [&str; 4] = [
    "# bindings: range str int float bool len enumerate append",
    "# commands: registry namespace",
    "# sentinel: ",
    "# resume: ",
];

/// A pyev1 event ready to run: the program plus the entry resume state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledEvent {
    pub name: String,
    pub source: String,
    pub program: Program,
    pub command_pointer: u32,
    pub resume: Option<ResumeCheck>,
    pub line_offset: usize,
}

impl CompiledEvent {
    pub fn new(name: impl Into<String>, source: impl Into<String>, program: Program) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            program,
            command_pointer: 0,
            resume: None,
            line_offset: LISTING_HEADER.len(),
        }
    }

    /// Pointer 0 means a fresh start and never builds catch-up state.
    pub fn with_pointer(mut self, command_pointer: u32, hits: u32) -> Self {
        self.command_pointer = command_pointer;
        self.resume = (command_pointer != 0).then(|| ResumeCheck::new(command_pointer, hits));
        self
    }

    /// Seeds catch-up with the passes each suspend point made before the save.
    pub fn with_history(mut self, history: BTreeMap<u32, u32>) -> Self {
        self.resume = self.resume.map(|check| check.with_history(history));
        self
    }

    pub fn source_line(&self, line: usize) -> &str {
        line.checked_sub(1)
            .and_then(|index| self.source.split('\n').nth(index))
            .unwrap_or("")
    }

    /// Maps a line of [`CompiledEvent::listing`] back to the author's line.
    pub fn original_line(&self, listing_line: usize) -> Option<usize> {
        listing_line
            .checked_sub(self.line_offset)
            .filter(|line| *line >= 1)
    }

    /// Debug rendering: a fixed header, then one line per source line with
    /// statements shown the way the interpreter sees them.
    pub fn listing(&self) -> String {
        let mut lines = self
            .source
            .split('\n')
            .map(str::to_string)
            .collect::<Vec<_>>();
        self.render_block(Program::ROOT, &mut lines);

        let resume = match &self.resume {
            Some(check) => format!("pointer={} hits={}", check.target, check.target_hits),
            None => "fresh".to_string(),
        };
        let mut out = vec![
            LISTING_HEADER[0].to_string(),
            LISTING_HEADER[1].to_string(),
            format!("{}{}", LISTING_HEADER[2], COMMAND_SENTINEL),
            format!("{}{}", LISTING_HEADER[3], resume),
        ];
        out.extend(lines);
        out.join("\n")
    }

    fn render_block(&self, id: BlockId, lines: &mut [String]) {
        for node in &self.program.block(id).nodes {
            match node {
                Node::Command {
                    suspend,
                    call,
                    line,
                } => self.put(lines, *line, format!("yield ({}, {})", suspend, render_call(call))),
                Node::If {
                    branches,
                    else_branch,
                    ..
                } => {
                    for (index, branch) in branches.iter().enumerate() {
                        let keyword = if index == 0 { "if" } else { "elif" };
                        self.put(
                            lines,
                            branch.line,
                            format!(
                                "{} _PTR in {} or ({}):",
                                keyword,
                                render_guard(&branch.guard),
                                branch.test
                            ),
                        );
                        self.render_block(branch.body, lines);
                    }
                    if let Some(else_branch) = else_branch {
                        self.put(
                            lines,
                            else_branch.line,
                            format!("else:  # _PTR in {}", render_guard(&else_branch.guard)),
                        );
                        self.render_block(else_branch.body, lines);
                    }
                }
                Node::While {
                    test,
                    body,
                    guard,
                    line,
                } => {
                    self.put(
                        lines,
                        *line,
                        format!(
                            "while (_PTR in {} and catching_up) or ({}):",
                            render_guard(guard),
                            test
                        ),
                    );
                    self.render_block(*body, lines);
                }
                Node::For {
                    targets,
                    iter,
                    body,
                    line,
                } => {
                    self.put(lines, *line, format!("for {} in {}:", targets.join(", "), iter));
                    self.render_block(*body, lines);
                }
                Node::Assign {
                    target,
                    value,
                    line,
                } => self.put(lines, *line, format!("{} = {}", target, value)),
                Node::AugAssign {
                    target,
                    op,
                    value,
                    line,
                } => self.put(lines, *line, format!("{} {}= {}", target, op, value)),
                Node::Expr { expr, line } => self.put(lines, *line, expr.clone()),
                Node::Break { line } => self.put(lines, *line, "break".to_string()),
                Node::Continue { line } => self.put(lines, *line, "continue".to_string()),
                Node::Pass { line } => self.put(lines, *line, "pass".to_string()),
                Node::Return { line } => self.put(lines, *line, "return".to_string()),
                Node::Unsupported { construct, line } => {
                    self.put(lines, *line, format!("raise Unsupported({})", construct))
                }
            }
        }
    }

    fn put(&self, lines: &mut [String], line: usize, text: String) {
        let Some(slot) = line.checked_sub(1).and_then(|index| lines.get_mut(index)) else {
            return;
        };
        let indent = slot.len() - slot.trim_start().len();
        *slot = format!("{}{}", &slot[..indent], text);
    }
}

fn render_guard(guard: &GuardSet) -> String {
    let items = guard
        .iter()
        .map(|index| index.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", items)
}

fn render_call(call: &CommandCall) -> String {
    let mut parts = call
        .args
        .iter()
        .map(|arg| {
            let value = match &arg.value {
                ArgValue::Literal {
                    value: EventValue::String(text),
                } => format!("{:?}", text),
                ArgValue::Literal { value } => value.to_string(),
                ArgValue::Word { name } => name.clone(),
                ArgValue::Expr { source } => source.clone(),
            };
            match &arg.keyword {
                Some(keyword) => format!("{}={}", keyword, value),
                None => value,
            }
        })
        .collect::<Vec<_>>();
    if !call.flags.is_empty() {
        parts.push(format!("flags={:?}", call.flags));
    }
    let name = call.command.as_deref().unwrap_or(&call.name);
    format!("{}({})", name, parts.join(", "))
}
