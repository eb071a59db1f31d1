use ev_core::{ControlToken, ErrorCode, EventCommand, EventError, GuardSet, Node, ScriptHost};
use log::{debug, trace};

use super::lifecycle::{EventProcessor, FrameKind};

impl EventProcessor {
    /// Runs the event up to its next live command. Suspend points replayed
    /// during catch-up are passed over without evaluating their arguments;
    /// `None` means the event has ended.
    pub fn fetch_next_command(
        &mut self,
        host: &dyn ScriptHost,
    ) -> Result<Option<EventCommand>, EventError> {
        if self.finished {
            return Ok(None);
        }

        let globals = host.globals();
        let mut guard = 0usize;
        let mut last_line = 0usize;
        while guard < self.options.max_steps {
            guard += 1;

            let Some(top_frame) = self.frames.last() else {
                self.finish();
                return Ok(None);
            };
            let block = self.compiled.program.block(top_frame.block);
            if top_frame.node_index >= block.nodes.len() {
                self.finish_frame().map_err(|error| self.locate(error, last_line))?;
                continue;
            }

            let node = block.nodes[top_frame.node_index].clone();
            let line = node.line();
            last_line = line;
            match node {
                Node::Command { suspend, call, .. } => {
                    self.bump_top_node_index(1);
                    let hits = self.hits.entry(suspend).or_insert(0);
                    *hits += 1;
                    let hits = *hits;

                    let was_catching_up = self.is_catching_up();
                    let token = match &mut self.resume {
                        Some(check) => check.control(suspend),
                        None => ControlToken::Live(suspend),
                    };
                    let ControlToken::Live(index) = token else {
                        trace!(
                            "event '{}' replayed suspend point {} (pass {})",
                            self.compiled.name,
                            suspend,
                            hits
                        );
                        if was_catching_up && !self.is_catching_up() {
                            debug!(
                                "event '{}' caught up at suspend point {}",
                                self.compiled.name, suspend
                            );
                        }
                        continue;
                    };

                    let command = self
                        .bind_command(&call, line, &globals)
                        .map_err(|error| self.locate(error, line))?;
                    self.cursor = index;
                    self.cursor_hits = hits;
                    trace!(
                        "event '{}' yielded '{}' at line {} (suspend point {})",
                        self.compiled.name,
                        command.id,
                        line,
                        index
                    );
                    return Ok(Some(command));
                }
                Node::If {
                    branches,
                    else_branch,
                    ..
                } => {
                    self.bump_top_node_index(1);
                    let fallthrough = GuardSet::new();
                    let steered = self.resume.as_ref().and_then(|check| {
                        let mut alternatives =
                            branches.iter().map(|branch| &branch.guard).collect::<Vec<_>>();
                        alternatives.push(
                            else_branch
                                .as_ref()
                                .map(|branch| &branch.guard)
                                .unwrap_or(&fallthrough),
                        );
                        check.choose(&alternatives)
                    });
                    let chosen = match steered {
                        Some(index) => branches
                            .get(index)
                            .map(|branch| branch.body)
                            .or_else(|| else_branch.as_ref().map(|branch| branch.body)),
                        None => {
                            let mut chosen = None;
                            for branch in &branches {
                                let taken = self
                                    .eval_truthy(&branch.test, &globals)
                                    .map_err(|error| self.locate(error, branch.line))?;
                                if taken {
                                    chosen = Some(branch.body);
                                    break;
                                }
                            }
                            chosen.or(else_branch.as_ref().map(|branch| branch.body))
                        }
                    };
                    if let Some(body) = chosen {
                        self.push_frame(body, FrameKind::Branch);
                    }
                }
                Node::While {
                    test, body, guard: suspends, ..
                } => {
                    let exit = GuardSet::new();
                    let steered = self
                        .resume
                        .as_ref()
                        .and_then(|check| check.choose(&[&suspends, &exit]));
                    let enter = match steered {
                        Some(index) => index == 0,
                        None => self
                            .eval_truthy(&test, &globals)
                            .map_err(|error| self.locate(error, line))?,
                    };
                    if enter {
                        self.push_frame(body, FrameKind::WhileBody);
                    } else {
                        self.bump_top_node_index(1);
                    }
                }
                Node::For {
                    targets,
                    iter,
                    body,
                    ..
                } => {
                    let items = self
                        .eval_iterable(&iter, &globals)
                        .map_err(|error| self.locate(error, line))?;
                    let Some(first) = items.first() else {
                        self.bump_top_node_index(1);
                        continue;
                    };
                    self.bind_targets(&targets, first)
                        .map_err(|error| self.locate(error, line))?;
                    self.push_frame(
                        body,
                        FrameKind::ForBody {
                            targets,
                            items,
                            position: 0,
                        },
                    );
                }
                Node::Assign { target, value, .. } => {
                    self.bump_top_node_index(1);
                    self.execute_assign(&target, &value, &globals)
                        .map_err(|error| self.locate(error, line))?;
                }
                Node::AugAssign {
                    target, op, value, ..
                } => {
                    self.bump_top_node_index(1);
                    self.execute_rhai(&format!("{} {}= {};", target, op, value), false, &globals)
                        .map_err(|error| self.locate(error, line))?;
                }
                Node::Expr { expr, .. } => {
                    self.bump_top_node_index(1);
                    self.execute_rhai(&expr, false, &globals)
                        .map_err(|error| self.locate(error, line))?;
                }
                Node::Break { .. } => {
                    self.execute_break()
                        .map_err(|error| self.locate(error, line))?;
                }
                Node::Continue { .. } => {
                    self.execute_continue()
                        .map_err(|error| self.locate(error, line))?;
                }
                Node::Pass { .. } => self.bump_top_node_index(1),
                Node::Return { .. } => {
                    self.finish();
                    return Ok(None);
                }
                Node::Unsupported { construct, .. } => {
                    return Err(self.locate(
                        EventError::new(
                            ErrorCode::Runtime,
                            format!("'{}' is not supported in events", construct),
                        ),
                        line,
                    ));
                }
            }
        }

        Err(self.locate(
            EventError::new(
                ErrorCode::GuardExceeded,
                format!(
                    "event '{}' ran {} steps without reaching a command",
                    self.compiled.name, self.options.max_steps
                ),
            ),
            last_line,
        ))
    }
}

#[cfg(test)]
mod step_tests {
    use crate::engine::runtime_test_support::*;
    use ev_core::{ErrorCode, EventValue, StaticHost};

    #[test]
    fn runs_the_three_command_scenario() {
        let mut processor = processor_from_source(
            "#pyev1\n$speak(eirika,\"Hello\")\nfor i in range(2):\n    $speak(seth,\"Hi\")",
        );
        let commands = drive_to_end(&mut processor, &StaticHost::default());
        assert_eq!(
            summary(&commands),
            vec!["speak:Hello", "speak:Hi", "speak:Hi"]
        );
        assert_eq!(
            commands[0].parameter("Speaker"),
            Some(&EventValue::from("eirika"))
        );
        assert_eq!(
            commands[2].parameter("Speaker"),
            Some(&EventValue::from("seth"))
        );
        assert_eq!(commands[2].line, 4);
        assert!(processor.finished());
        assert_eq!(processor.cursor(), (2, 2));
    }

    #[test]
    fn conditions_and_loops_read_host_state() {
        let source = [
            "#pyev1",
            "if TimesRescued > 5 and not SomeState:",
            "    $alert(\"many\")",
            "elif TimesRescued > 0:",
            "    $alert(\"some\")",
            "else:",
            "    $alert(\"none\")",
            "count = 0",
            "while count < 3:",
            "    count += 1",
            "    if count == 2:",
            "        continue",
            "    $alert(str(count))",
            "for name in Party:",
            "    if name == \"Franz\":",
            "        break",
            "    $alert(name)",
        ]
        .join("\n");
        let host = StaticHost::default()
            .with("TimesRescued", 10i64)
            .with("SomeState", false)
            .with(
                "Party",
                EventValue::List(vec!["Seth".into(), "Franz".into(), "Gilliam".into()]),
            );
        let mut processor = processor_from_source(&source);
        let commands = drive_to_end(&mut processor, &host);
        assert_eq!(
            summary(&commands),
            vec!["alert:many", "alert:1", "alert:3", "alert:Seth"]
        );
        assert_eq!(processor.local("count"), Some(&EventValue::Int(3)));
    }

    #[test]
    fn locals_shadow_globals_and_unpack_tuples() {
        let source = [
            "#pyev1",
            "SomeState = \"local\"",
            "a, b = 1, 2",
            "for i, unit in enumerate([\"Ross\", \"Garcia\"]):",
            "    $alert(str(i + a + b) + unit)",
            "$alert(SomeState)",
            "return",
            "$alert(\"unreachable\")",
        ]
        .join("\n");
        let host = StaticHost::default().with("SomeState", true);
        let mut processor = processor_from_source(&source);
        let commands = drive_to_end(&mut processor, &host);
        assert_eq!(
            summary(&commands),
            vec!["alert:3Ross", "alert:4Garcia", "alert:local"]
        );
    }

    #[test]
    fn runtime_errors_point_at_the_author_line() {
        let mut processor = processor_from_source("#pyev1\n$wait 1\nx = missing + 1");
        let host = StaticHost::default();
        processor
            .fetch_next_command(&host)
            .expect("first command")
            .expect("wait");
        let error = processor
            .fetch_next_command(&host)
            .expect_err("undefined name");
        assert_eq!(error.code, ErrorCode::Runtime);
        let frame = error.innermost().expect("frame");
        assert_eq!((frame.event.as_str(), frame.line), ("test", 3));
        assert_eq!(frame.source_line, "x = missing + 1");
    }

    #[test]
    fn game_state_is_read_only() {
        let mut processor = processor_from_source("#pyev1\nTimesRescued += 1\n$wait 1");
        let host = StaticHost::default().with("TimesRescued", 1i64);
        let error = processor
            .fetch_next_command(&host)
            .expect_err("globals are read-only");
        assert_eq!(error.code, ErrorCode::Runtime);
        assert!(error.message.contains("read-only"));
        assert_eq!(error.line(), Some(2));
    }

    #[test]
    fn endless_loops_hit_the_step_guard() {
        let mut processor = processor_from_source("#pyev1\nwhile True:\n    pass");
        let error = processor
            .fetch_next_command(&StaticHost::default())
            .expect_err("no command is ever reached");
        assert_eq!(error.code, ErrorCode::GuardExceeded);
    }

    #[test]
    fn def_fails_when_reached() {
        let mut processor = processor_from_source("#pyev1\n$wait 1\ndef helper():\n    pass");
        let host = StaticHost::default();
        assert!(processor.fetch_next_command(&host).expect("wait").is_some());
        let error = processor.fetch_next_command(&host).expect_err("def");
        assert_eq!(error.code, ErrorCode::Runtime);
        assert_eq!(error.line(), Some(3));
    }
}
