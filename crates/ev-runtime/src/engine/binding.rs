use std::collections::BTreeMap;
use std::sync::Arc;

use ev_core::{ArgValue, CommandCall, ErrorCode, EventCommand, EventError, EventValue};

use super::lifecycle::EventProcessor;

fn bad_arguments(message: String) -> EventError {
    EventError::new(ErrorCode::BadArguments, message)
}

impl EventProcessor {
    /// Resolves a call's arguments against its descriptor: positionals fill
    /// the parameter slots in order, keywords match a slot by name ignoring
    /// case.
    pub(super) fn bind_command(
        &mut self,
        call: &CommandCall,
        line: usize,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<EventCommand, EventError> {
        let registry = Arc::clone(&self.options.registry);
        let Some(descriptor) = call.command.as_deref().and_then(|id| registry.get(id)) else {
            return Err(EventError::new(
                ErrorCode::InvalidCommand,
                format!("Unknown event command '{}'", call.name),
            ));
        };

        let slots = descriptor.parameter_slots();
        let mut command = EventCommand::new(descriptor.id.as_str(), line);
        let mut next_positional = 0usize;
        for arg in &call.args {
            let slot = match &arg.keyword {
                Some(keyword) => slots
                    .iter()
                    .find(|slot| slot.eq_ignore_ascii_case(keyword))
                    .ok_or_else(|| {
                        bad_arguments(format!(
                            "'{}' has no parameter named '{}'",
                            descriptor.id, keyword
                        ))
                    })?,
                None => {
                    let slot = slots.get(next_positional).ok_or_else(|| {
                        bad_arguments(format!(
                            "'{}' takes at most {} arguments",
                            descriptor.id,
                            slots.len()
                        ))
                    })?;
                    next_positional += 1;
                    slot
                }
            };
            if command.parameters.contains_key(slot) {
                return Err(bad_arguments(format!(
                    "'{}' got multiple values for '{}'",
                    descriptor.id, slot
                )));
            }
            let value = self.arg_value(&arg.value, globals)?;
            command.parameters.insert(slot.clone(), value);
        }

        if let Some(missing) = descriptor
            .keywords
            .iter()
            .find(|keyword| !command.parameters.contains_key(keyword.as_str()))
        {
            return Err(bad_arguments(format!(
                "'{}' is missing required parameter '{}'",
                descriptor.id, missing
            )));
        }

        for flag in &call.flags {
            if !descriptor.accepts_flag(flag) {
                return Err(bad_arguments(format!(
                    "'{}' does not accept flag '{}'",
                    descriptor.id, flag
                )));
            }
            if !command.has_flag(flag) {
                command.flags.push(flag.clone());
            }
        }
        Ok(command)
    }

    /// Bare words read a local, then a global, and otherwise stand for
    /// themselves.
    fn arg_value(
        &mut self,
        value: &ArgValue,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<EventValue, EventError> {
        match value {
            ArgValue::Literal { value } => Ok(value.clone()),
            ArgValue::Word { name } => Ok(self
                .locals
                .get(name)
                .or_else(|| globals.get(name))
                .cloned()
                .unwrap_or_else(|| EventValue::String(name.clone()))),
            ArgValue::Expr { source } => self.eval_value(source, globals),
        }
    }
}
