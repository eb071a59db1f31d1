use ev_core::{
    Block, BlockId, CommandRegistry, ElseBranch, ErrorCode, EventError, GuardedBranch, Node,
    Program, ScriptWithSentinel,
};
use ev_parser::pyexpr::to_rhai;
use ev_parser::{parse_script, Stmt, StmtKind};
use log::debug;

use crate::call_args::build_call;

/// Turns a sentinel script into a resumable program: every placeholder
/// becomes a numbered suspend point (1-based, document order) and every
/// branch or `while` records the suspend points inside its own body.
pub fn postcompile(
    script: &ScriptWithSentinel,
    registry: &CommandRegistry,
) -> Result<Program, EventError> {
    script.check()?;
    let statements = parse_script(&script.source)?;
    let mut lowering = Lowering {
        script,
        registry,
        program: Program {
            blocks: Vec::new(),
            suspend_count: 0,
        },
    };
    let root = lowering.lower_block(&statements)?;
    debug_assert_eq!(root, Program::ROOT);
    lowering.program.suspend_count = u32::try_from(script.records.len()).map_err(|_| {
        EventError::new(ErrorCode::SentinelMismatch, "too many commands in one event")
    })?;
    debug!(
        "postcompiled {} blocks with {} suspend points",
        lowering.program.blocks.len(),
        lowering.program.suspend_count
    );
    Ok(lowering.program)
}

struct Lowering<'a> {
    script: &'a ScriptWithSentinel,
    registry: &'a CommandRegistry,
    program: Program,
}

impl Lowering<'_> {
    fn lower_block(&mut self, statements: &[Stmt]) -> Result<BlockId, EventError> {
        let id = self.program.blocks.len();
        self.program.blocks.push(Block::default());
        let mut nodes = Vec::with_capacity(statements.len());
        for statement in statements {
            nodes.push(self.lower(statement)?);
        }
        self.program.blocks[id].nodes = nodes;
        Ok(id)
    }

    fn rewrite(&self, line: usize, source: &str) -> Result<String, EventError> {
        to_rhai(source).map_err(|message| {
            EventError::new(ErrorCode::InvalidSyntax, message).at(
                "",
                line,
                self.script.source.split('\n').nth(line.saturating_sub(1)).unwrap_or(""),
            )
        })
    }

    fn lower(&mut self, statement: &Stmt) -> Result<Node, EventError> {
        let line = statement.line;
        let node = match &statement.kind {
            StmtKind::Command { ordinal } => {
                let Some(record) = self.script.records.get(*ordinal) else {
                    return Err(EventError::new(
                        ErrorCode::SentinelMismatch,
                        format!("no command recorded for placeholder {}", ordinal + 1),
                    ));
                };
                Node::Command {
                    suspend: *ordinal as u32 + 1,
                    call: build_call(record, self.registry)?,
                    line: record.line_number,
                }
            }
            StmtKind::If { branches, orelse } => {
                let mut lowered = Vec::with_capacity(branches.len());
                for branch in branches {
                    let test = self.rewrite(branch.line, &branch.test)?;
                    let body = self.lower_block(&branch.body)?;
                    lowered.push(GuardedBranch {
                        test,
                        body,
                        guard: self.program.suspends_in(body),
                        line: branch.line,
                    });
                }
                let else_branch = match orelse {
                    Some(orelse) => {
                        let body = self.lower_block(&orelse.body)?;
                        Some(ElseBranch {
                            body,
                            guard: self.program.suspends_in(body),
                            line: orelse.line,
                        })
                    }
                    None => None,
                };
                Node::If {
                    branches: lowered,
                    else_branch,
                    line,
                }
            }
            StmtKind::While { test, body } => {
                let test = self.rewrite(line, test)?;
                let body = self.lower_block(body)?;
                Node::While {
                    test,
                    body,
                    guard: self.program.suspends_in(body),
                    line,
                }
            }
            StmtKind::For {
                targets,
                iter,
                body,
            } => Node::For {
                targets: targets.clone(),
                iter: self.rewrite(line, iter)?,
                body: self.lower_block(body)?,
                line,
            },
            StmtKind::Def { .. } => Node::Unsupported {
                construct: "def".to_string(),
                line,
            },
            StmtKind::Yield => Node::Unsupported {
                construct: "yield".to_string(),
                line,
            },
            StmtKind::Assign { target, value } => Node::Assign {
                target: self.rewrite(line, target)?,
                value: self.rewrite(line, value)?,
                line,
            },
            StmtKind::AugAssign { target, op, value } => Node::AugAssign {
                target: self.rewrite(line, target)?,
                op: if op == "//" { "/".to_string() } else { op.clone() },
                value: self.rewrite(line, value)?,
                line,
            },
            StmtKind::Expr { expr } => Node::Expr {
                expr: self.rewrite(line, expr)?,
                line,
            },
            StmtKind::Return { .. } => Node::Return { line },
            StmtKind::Break => Node::Break { line },
            StmtKind::Continue => Node::Continue { line },
            StmtKind::Pass => Node::Pass { line },
        };
        Ok(node)
    }
}

#[cfg(test)]
mod postcomp_tests {
    use super::*;
    use ev_parser::SwsCompiler;

    fn program(source: &str) -> Program {
        let script = SwsCompiler::new(source).compile_sws();
        postcompile(&script, CommandRegistry::builtin()).expect("postcompile should pass")
    }

    #[test]
    fn empty_script_is_an_empty_program() {
        let program = program("#pyev1\n");
        assert_eq!(program.blocks.len(), 1);
        assert!(program.block(Program::ROOT).nodes.is_empty());
        assert_eq!(program.suspend_count, 0);
    }

    #[test]
    fn suspend_points_number_commands_in_document_order() {
        let program = program("#pyev1\n$speak(eirika,\"Hello\")\nfor i in range(2):\n    $speak(seth,\"Hi\")");
        assert_eq!(program.suspend_count, 2);
        let root = &program.block(Program::ROOT).nodes;
        assert!(matches!(&root[0], Node::Command { suspend: 1, line: 2, .. }));
        let Node::For { body, iter, .. } = &root[1] else {
            panic!("expected a for loop");
        };
        assert_eq!(iter, "range(2)");
        assert!(matches!(
            &program.block(*body).nodes[0],
            Node::Command { suspend: 2, line: 4, call, .. } if call.command.as_deref() == Some("speak")
        ));
    }

    #[test]
    fn guards_cover_only_their_own_body() {
        let source = [
            "#pyev1",
            "if a:",
            "    $wait 1",
            "    while b:",
            "        $wait 2",
            "elif c and not d:",
            "    $wait 3",
            "else:",
            "    if e:",
            "        $wait 4",
            "$wait 5",
        ]
        .join("\n");
        let program = program(&source);
        let root = &program.block(Program::ROOT).nodes;
        let Node::If {
            branches,
            else_branch,
            ..
        } = &root[0]
        else {
            panic!("expected an if chain");
        };
        assert_eq!(branches[0].guard.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(branches[1].guard.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(branches[1].test, "c && ! d");
        let else_branch = else_branch.as_ref().expect("else branch");
        assert_eq!(else_branch.guard.iter().copied().collect::<Vec<_>>(), vec![4]);

        let Node::While { guard, .. } = &program.block(branches[0].body).nodes[1] else {
            panic!("expected a while loop");
        };
        assert_eq!(guard.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(matches!(&root[1], Node::Command { suspend: 5, .. }));
    }

    #[test]
    fn def_is_kept_as_unsupported() {
        let program = program("#pyev1\ndef helper():\n    $wait 1\nx //= 2");
        let root = &program.block(Program::ROOT).nodes;
        assert!(matches!(&root[0], Node::Unsupported { construct, line: 2 } if construct == "def"));
        assert!(matches!(&root[1], Node::AugAssign { op, .. } if op == "/"));
    }

    #[test]
    fn syntax_errors_carry_the_line() {
        let script = SwsCompiler::new("#pyev1\nif x:\n$wait 1").compile_sws();
        let error = postcompile(&script, CommandRegistry::builtin()).expect_err("bad indent");
        assert_eq!(error.code, ErrorCode::InvalidSyntax);
        assert_eq!(error.line(), Some(2));
    }
}
