use ev_core::{ErrorCode, EventError, COMMAND_SENTINEL};

use crate::pyexpr::{
    bracket_depth, find_top_level_char, find_top_level_word, is_identifier, split_assignment,
    split_top_level, strip_comment,
};

const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondBranch {
    pub line: usize,
    pub test: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseClause {
    pub line: usize,
    pub body: Vec<Stmt>,
}

/// Statements of the sentinel script. Expressions stay in author syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `ordinal` is the zero-based position of the placeholder in the script.
    Command {
        ordinal: usize,
    },
    If {
        branches: Vec<CondBranch>,
        orelse: Option<ElseClause>,
    },
    While {
        test: String,
        body: Vec<Stmt>,
    },
    For {
        targets: Vec<String>,
        iter: String,
        body: Vec<Stmt>,
    },
    Def {
        name: String,
        body: Vec<Stmt>,
    },
    Assign {
        target: String,
        value: String,
    },
    AugAssign {
        target: String,
        op: String,
        value: String,
    },
    Expr {
        expr: String,
    },
    Return {
        value: Option<String>,
    },
    Yield,
    Break,
    Continue,
    Pass,
}

impl Stmt {
    /// Every expression the statement evaluates itself (bodies excluded).
    pub fn expressions(&self) -> Vec<&str> {
        match &self.kind {
            StmtKind::If { branches, .. } => {
                branches.iter().map(|branch| branch.test.as_str()).collect()
            }
            StmtKind::While { test, .. } => vec![test.as_str()],
            StmtKind::For { iter, .. } => vec![iter.as_str()],
            StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
                vec![target.as_str(), value.as_str()]
            }
            StmtKind::Expr { expr } => vec![expr.as_str()],
            StmtKind::Return { value: Some(value) } => vec![value.as_str()],
            _ => Vec::new(),
        }
    }

    /// Line of each expression returned by [`Stmt::expressions`].
    pub fn expression_lines(&self) -> Vec<usize> {
        match &self.kind {
            StmtKind::If { branches, .. } => branches.iter().map(|branch| branch.line).collect(),
            _ => vec![self.line; self.expressions().len()],
        }
    }
}

#[derive(Debug, Clone)]
struct LogicalLine {
    line: usize,
    indent: usize,
    text: String,
}

fn indent_width(line: &str) -> usize {
    let mut width = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
            _ => break,
        }
    }
    width
}

fn syntax_error(line: usize, source_line: &str, message: impl Into<String>) -> EventError {
    EventError::new(ErrorCode::InvalidSyntax, message).at("", line, source_line)
}

/// Parses a sentinel script (the tokenizer's output) into statements. Errors
/// carry the line but leave the event name blank for the caller to fill.
pub fn parse_script(source: &str) -> Result<Vec<Stmt>, EventError> {
    ScriptParser::new(source)?.parse()
}

struct ScriptParser<'a> {
    raw_lines: Vec<&'a str>,
    lines: Vec<LogicalLine>,
    pos: usize,
    next_ordinal: usize,
}

impl<'a> ScriptParser<'a> {
    fn new(source: &'a str) -> Result<Self, EventError> {
        let raw_lines = source.split('\n').collect::<Vec<_>>();
        let mut lines = Vec::new();
        let mut index = 0usize;
        while index < raw_lines.len() {
            let raw = raw_lines[index];
            let start = index;
            let mut text = strip_comment(raw).trim().to_string();
            let mut depth = bracket_depth(raw);
            while (depth > 0 || text.ends_with('\\')) && index + 1 < raw_lines.len() {
                if let Some(stripped) = text.strip_suffix('\\') {
                    text = stripped.trim_end().to_string();
                }
                index += 1;
                let next = raw_lines[index];
                depth += bracket_depth(next);
                text.push(' ');
                text.push_str(strip_comment(next).trim());
            }
            if depth > 0 {
                return Err(syntax_error(start + 1, raw, "unclosed bracket"));
            }
            if !text.is_empty() {
                lines.push(LogicalLine {
                    line: start + 1,
                    indent: indent_width(raw),
                    text,
                });
            }
            index += 1;
        }
        Ok(Self {
            raw_lines,
            lines,
            pos: 0,
            next_ordinal: 0,
        })
    }

    fn raw(&self, line: usize) -> &str {
        self.raw_lines.get(line.wrapping_sub(1)).copied().unwrap_or("")
    }

    fn error(&self, line: usize, message: impl Into<String>) -> EventError {
        syntax_error(line, self.raw(line), message)
    }

    fn parse(mut self) -> Result<Vec<Stmt>, EventError> {
        let Some(first) = self.lines.first() else {
            return Ok(Vec::new());
        };
        if first.indent != 0 {
            return Err(self.error(first.line, "unexpected indent"));
        }
        self.parse_block(0)
    }

    fn parse_block(&mut self, indent: usize) -> Result<Vec<Stmt>, EventError> {
        let mut body = Vec::new();
        while let Some(current) = self.lines.get(self.pos).cloned() {
            if current.indent < indent {
                break;
            }
            if current.indent > indent {
                return Err(self.error(current.line, "unexpected indent"));
            }
            self.pos += 1;
            body.push(self.parse_statement(&current)?);
        }
        Ok(body)
    }

    /// Body of a compound statement: an inline simple statement after the
    /// colon, or the following deeper-indented lines.
    fn parse_suite(&mut self, header: &LogicalLine, inline: &str) -> Result<Vec<Stmt>, EventError> {
        if !inline.is_empty() {
            let inline_line = LogicalLine {
                line: header.line,
                indent: header.indent,
                text: inline.to_string(),
            };
            let stmt = self.parse_simple(&inline_line)?;
            return Ok(vec![stmt]);
        }
        match self.lines.get(self.pos).map(|next| next.indent) {
            Some(indent) if indent > header.indent => self.parse_block(indent),
            _ => Err(self.error(header.line, "expected an indented block")),
        }
    }

    fn split_header<'t>(&self, line: &LogicalLine, text: &'t str) -> Result<(&'t str, &'t str), EventError> {
        let Some(colon) = find_top_level_char(text, ':') else {
            return Err(self.error(line.line, "expected ':'"));
        };
        Ok((text[..colon].trim(), text[colon + 1..].trim()))
    }

    fn parse_statement(&mut self, line: &LogicalLine) -> Result<Stmt, EventError> {
        let text = line.text.as_str();
        let keyword = leading_keyword(text);
        match keyword {
            "if" => {
                let mut branches = Vec::new();
                let (test, inline) = self.split_header(line, &text[2..])?;
                let body = self.parse_suite(line, inline)?;
                branches.push(self.branch(line, test, body)?);

                let mut orelse = None;
                while let Some(next) = self.lines.get(self.pos).cloned() {
                    if next.indent != line.indent {
                        break;
                    }
                    match leading_keyword(&next.text) {
                        "elif" => {
                            self.pos += 1;
                            let (test, inline) = self.split_header(&next, &next.text[4..])?;
                            let body = self.parse_suite(&next, inline)?;
                            branches.push(self.branch(&next, test, body)?);
                        }
                        "else" => {
                            self.pos += 1;
                            let (rest, inline) = self.split_header(&next, &next.text[4..])?;
                            if !rest.is_empty() {
                                return Err(self.error(next.line, "invalid syntax after 'else'"));
                            }
                            let body = self.parse_suite(&next, inline)?;
                            orelse = Some(ElseClause {
                                line: next.line,
                                body,
                            });
                            break;
                        }
                        _ => break,
                    }
                }
                Ok(Stmt {
                    line: line.line,
                    kind: StmtKind::If { branches, orelse },
                })
            }
            "elif" | "else" => Err(self.error(
                line.line,
                format!("'{}' without a matching 'if'", keyword),
            )),
            "while" => {
                let (test, inline) = self.split_header(line, &text[5..])?;
                if test.is_empty() {
                    return Err(self.error(line.line, "missing loop condition"));
                }
                let body = self.parse_suite(line, inline)?;
                Ok(Stmt {
                    line: line.line,
                    kind: StmtKind::While {
                        test: test.to_string(),
                        body,
                    },
                })
            }
            "for" => {
                let (header, inline) = self.split_header(line, &text[3..])?;
                let Some(in_pos) = find_top_level_word(header, "in") else {
                    return Err(self.error(line.line, "expected 'in' in for statement"));
                };
                let targets_text = header[..in_pos]
                    .trim()
                    .trim_start_matches('(')
                    .trim_end_matches(')');
                let targets = split_top_level(targets_text, ',');
                if targets.is_empty() || !targets.iter().all(|target| is_identifier(target)) {
                    return Err(self.error(line.line, "for loop targets must be names"));
                }
                let iter = header[in_pos + 2..].trim();
                if iter.is_empty() {
                    return Err(self.error(line.line, "missing loop iterable"));
                }
                let body = self.parse_suite(line, inline)?;
                Ok(Stmt {
                    line: line.line,
                    kind: StmtKind::For {
                        targets,
                        iter: iter.to_string(),
                        body,
                    },
                })
            }
            "def" => {
                let (signature, inline) = self.split_header(line, &text[3..])?;
                let name = signature
                    .split('(')
                    .next()
                    .map(str::trim)
                    .unwrap_or_default();
                if !is_identifier(name) || !signature.ends_with(')') {
                    return Err(self.error(line.line, "invalid function definition"));
                }
                let body = self.parse_suite(line, inline)?;
                Ok(Stmt {
                    line: line.line,
                    kind: StmtKind::Def {
                        name: name.to_string(),
                        body,
                    },
                })
            }
            "class" | "try" | "except" | "finally" | "with" | "import" | "from" | "global"
            | "nonlocal" | "del" | "assert" | "raise" | "async" | "lambda" | "match" => Err(
                self.error(line.line, format!("'{}' is not supported in events", keyword)),
            ),
            _ => self.parse_simple(line),
        }
    }

    fn branch(&self, line: &LogicalLine, test: &str, body: Vec<Stmt>) -> Result<CondBranch, EventError> {
        if test.is_empty() {
            return Err(self.error(line.line, "missing condition"));
        }
        Ok(CondBranch {
            line: line.line,
            test: test.to_string(),
            body,
        })
    }

    fn parse_simple(&mut self, line: &LogicalLine) -> Result<Stmt, EventError> {
        let text = line.text.trim();
        let kind = if text == COMMAND_SENTINEL {
            let ordinal = self.next_ordinal;
            self.next_ordinal += 1;
            StmtKind::Command { ordinal }
        } else {
            match leading_keyword(text) {
                "pass" if text == "pass" => StmtKind::Pass,
                "break" if text == "break" => StmtKind::Break,
                "continue" if text == "continue" => StmtKind::Continue,
                "return" => {
                    let value = text[6..].trim();
                    StmtKind::Return {
                        value: (!value.is_empty()).then(|| value.to_string()),
                    }
                }
                "yield" => StmtKind::Yield,
                "if" | "elif" | "else" | "while" | "for" | "def" => {
                    return Err(self.error(line.line, "compound statement cannot follow ':'"));
                }
                _ => match split_assignment(text) {
                    Some(assignment) => match assignment.op {
                        Some(op) => StmtKind::AugAssign {
                            target: assignment.target,
                            op,
                            value: assignment.value,
                        },
                        None => StmtKind::Assign {
                            target: assignment.target,
                            value: assignment.value,
                        },
                    },
                    None => StmtKind::Expr {
                        expr: text.to_string(),
                    },
                },
            }
        };
        if text.contains(COMMAND_SENTINEL) && !matches!(kind, StmtKind::Command { .. }) {
            return Err(self.error(line.line, "command line cannot be joined with other code"));
        }
        Ok(Stmt {
            line: line.line,
            kind,
        })
    }
}

/// First identifier-like word, as long as it stands alone (`if x`, `if(`).
fn leading_keyword(text: &str) -> &str {
    let end = text
        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Walks statements depth-first, handing each to `visit` with the number of
/// enclosing `for` loops and whether it sits inside a `def`.
pub fn walk_statements<'s>(
    stmts: &'s [Stmt],
    visit: &mut dyn FnMut(&'s Stmt, WalkContext),
) {
    walk_inner(stmts, WalkContext::default(), visit);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkContext {
    pub for_depth: usize,
    pub in_def: bool,
}

fn walk_inner<'s>(stmts: &'s [Stmt], context: WalkContext, visit: &mut dyn FnMut(&'s Stmt, WalkContext)) {
    for stmt in stmts {
        visit(stmt, context);
        match &stmt.kind {
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    walk_inner(&branch.body, context, visit);
                }
                if let Some(orelse) = orelse {
                    walk_inner(&orelse.body, context, visit);
                }
            }
            StmtKind::While { body, .. } => walk_inner(body, context, visit),
            StmtKind::For { body, .. } => walk_inner(
                body,
                WalkContext {
                    for_depth: context.for_depth + 1,
                    ..context
                },
                visit,
            ),
            StmtKind::Def { body, .. } => walk_inner(
                body,
                WalkContext {
                    in_def: true,
                    ..context
                },
                visit,
            ),
            _ => {}
        }
    }
}

#[cfg(test)]
mod script_tests {
    use super::*;

    fn sentinel_source(lines: &[&str]) -> String {
        lines
            .iter()
            .map(|line| line.replace("CMD", COMMAND_SENTINEL))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn parses_nested_blocks_with_ordinals() {
        let source = sentinel_source(&[
            "#pyev1",
            "CMD",
            "for i in range(2):",
            "    if i == 0:",
            "        CMD",
            "    elif i == 1: pass",
            "    else:",
            "        CMD",
            "",
            "    # trailing comment",
            "count += 1",
        ]);
        let stmts = parse_script(&source).expect("script should parse");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0].kind, StmtKind::Command { ordinal: 0 }));
        let StmtKind::For { targets, iter, body } = &stmts[1].kind else {
            panic!("expected for loop");
        };
        assert_eq!(targets, &vec!["i".to_string()]);
        assert_eq!(iter, "range(2)");
        let StmtKind::If { branches, orelse } = &body[0].kind else {
            panic!("expected if chain");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].line, 6);
        assert!(matches!(branches[1].body[0].kind, StmtKind::Pass));
        let orelse = orelse.as_ref().expect("else clause");
        assert!(matches!(orelse.body[0].kind, StmtKind::Command { ordinal: 2 }));
        assert!(matches!(
            &stmts[2].kind,
            StmtKind::AugAssign { target, op, .. } if target == "count" && op == "+"
        ));
        assert_eq!(stmts[2].line, 11);
    }

    #[test]
    fn joins_bracket_continuations() {
        let source = "names = [\n    'Eirika',\n    'Seth',\n]\nwhile len(names) > 0 and \\\n        ok:\n    names.pop()";
        let stmts = parse_script(source).expect("script should parse");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign { target, value } if target == "names" && value.contains("'Seth'")
        ));
        assert!(matches!(
            &stmts[1].kind,
            StmtKind::While { test, .. } if test == "len(names) > 0 and ok"
        ));
        assert_eq!(stmts[1].line, 5);
    }

    #[test]
    fn reports_indentation_problems_with_lines() {
        let error = parse_script("if x:\ny = 1").expect_err("missing body");
        assert_eq!(error.code, ErrorCode::InvalidSyntax);
        assert_eq!(error.line(), Some(1));

        let error = parse_script("x = 1\n    y = 2").expect_err("unexpected indent");
        assert_eq!(error.line(), Some(2));
        assert_eq!(error.frames[0].source_line, "    y = 2");

        let error = parse_script("else:\n    pass").expect_err("dangling else");
        assert!(error.message.contains("else"));
    }

    #[test]
    fn tabs_count_to_the_next_multiple_of_eight() {
        assert_eq!(indent_width("\tx"), 8);
        assert_eq!(indent_width("   \tx"), 8);
        assert_eq!(indent_width("        \t x"), 17);
        let stmts = parse_script("while a:\n\tpass\n        pass").expect("tabs equal spaces");
        let StmtKind::While { body, .. } = &stmts[0].kind else {
            panic!("expected while");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn def_yield_and_return_are_recognised() {
        let source = sentinel_source(&["def helper():", "    CMD", "yield 3", "return"]);
        let stmts = parse_script(&source).expect("script should parse");
        let mut seen = Vec::new();
        walk_statements(&stmts, &mut |stmt, context| {
            seen.push((stmt.line, context.in_def));
        });
        assert_eq!(seen, vec![(1, false), (2, true), (3, false), (4, false)]);
        assert!(matches!(stmts[1].kind, StmtKind::Yield));
        assert!(matches!(stmts[2].kind, StmtKind::Return { value: None }));
    }

    #[test]
    fn for_targets_may_be_tuples() {
        let stmts = parse_script("for (index, name) in enumerate(names):\n    pass")
            .expect("script should parse");
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::For { targets, .. } if targets == &vec!["index".to_string(), "name".to_string()]
        ));
        let error = parse_script("for 1 in x:\n    pass").expect_err("bad target");
        assert_eq!(error.code, ErrorCode::InvalidSyntax);
    }
}
