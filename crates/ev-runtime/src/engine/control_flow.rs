use ev_core::{ErrorCode, EventError};

use super::lifecycle::{EventProcessor, FrameKind};

impl EventProcessor {
    /// Pops the finished top frame. A `for` body loops back for its next
    /// item; a `while` body leaves its owner in place so the test runs again.
    pub(super) fn finish_frame(&mut self) -> Result<(), EventError> {
        let Some(mut frame) = self.frames.pop() else {
            return Ok(());
        };
        if let FrameKind::ForBody {
            targets,
            items,
            position,
        } = &mut frame.kind
        {
            let next = *position + 1;
            if let Some(item) = items.get(next) {
                let item = item.clone();
                let targets = targets.clone();
                *position = next;
                frame.node_index = 0;
                self.bind_targets(&targets, &item)?;
                self.frames.push(frame);
            } else {
                self.bump_top_node_index(1);
            }
        }
        Ok(())
    }

    pub(super) fn execute_break(&mut self) -> Result<(), EventError> {
        let body_index = self.find_nearest_loop_body_frame_index()?;
        self.frames.truncate(body_index);
        self.bump_top_node_index(1);
        Ok(())
    }

    pub(super) fn execute_continue(&mut self) -> Result<(), EventError> {
        let body_index = self.find_nearest_loop_body_frame_index()?;
        if matches!(self.frames[body_index].kind, FrameKind::ForBody { .. }) {
            self.frames.truncate(body_index + 1);
            let block = self.frames[body_index].block;
            self.frames[body_index].node_index = self.compiled.program.block(block).nodes.len();
        } else {
            self.frames.truncate(body_index);
        }
        Ok(())
    }

    fn find_nearest_loop_body_frame_index(&self) -> Result<usize, EventError> {
        self.frames
            .iter()
            .rposition(|frame| {
                matches!(frame.kind, FrameKind::WhileBody | FrameKind::ForBody { .. })
            })
            .filter(|index| *index > 0)
            .ok_or_else(|| {
                EventError::new(ErrorCode::Runtime, "'break' or 'continue' outside a loop")
            })
    }
}

#[cfg(test)]
mod control_flow_tests {
    use crate::engine::runtime_test_support::*;
    use ev_core::{ErrorCode, StaticHost};

    #[test]
    fn nested_loops_break_only_the_inner_loop() {
        let source = [
            "#pyev1",
            "for row in range(2):",
            "    for col in range(3):",
            "        if col == 1:",
            "            break",
            "        $alert(str(row) + str(col))",
            "    $alert(\"row done\")",
        ]
        .join("\n");
        let mut processor = processor_from_source(&source);
        let commands = drive_to_end(&mut processor, &StaticHost::default());
        assert_eq!(
            summary(&commands),
            vec!["alert:00", "alert:row done", "alert:10", "alert:row done"]
        );
    }

    #[test]
    fn continue_in_for_moves_to_the_next_item() {
        let source = [
            "#pyev1",
            "for i in range(4):",
            "    if i % 2 == 0:",
            "        continue",
            "    $alert(str(i))",
        ]
        .join("\n");
        let mut processor = processor_from_source(&source);
        let commands = drive_to_end(&mut processor, &StaticHost::default());
        assert_eq!(summary(&commands), vec!["alert:1", "alert:3"]);
    }

    #[test]
    fn empty_iterables_skip_the_body() {
        let source = "#pyev1\nfor unit in []:\n    $alert(unit)\n$alert(\"after\")";
        let mut processor = processor_from_source(source);
        let commands = drive_to_end(&mut processor, &StaticHost::default());
        assert_eq!(summary(&commands), vec!["alert:after"]);
    }

    #[test]
    fn break_outside_a_loop_is_a_runtime_error() {
        let mut processor = processor_from_source("#pyev1\nbreak\n$wait 1");
        let error = processor
            .fetch_next_command(&StaticHost::default())
            .expect_err("nothing to break out of");
        assert_eq!(error.code, ErrorCode::Runtime);
        assert_eq!(error.line(), Some(2));
    }
}
