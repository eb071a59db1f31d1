use std::collections::BTreeMap;

use ev_core::{ErrorCode, EventError, EventValue};
use ev_parser::pyexpr::{is_identifier, split_top_level};
use rhai::{Dynamic, Scope};

use super::lifecycle::EventProcessor;
use crate::helpers::rhai_bridge::{dynamic_to_value, iteration_items, truthy, value_to_dynamic};

impl EventProcessor {
    /// Evaluates `script` with the event's locals in scope on top of the
    /// host's globals. Locals are written back afterwards; a global that
    /// changed fails the statement.
    pub(super) fn execute_rhai(
        &mut self,
        script: &str,
        is_expression: bool,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<Dynamic, EventError> {
        let mut scope = Scope::new();
        let mut visible_globals = Vec::new();
        for (name, value) in globals {
            if self.locals.contains_key(name) || !is_identifier(name) {
                continue;
            }
            scope.push_dynamic(name.as_str(), value_to_dynamic(value));
            visible_globals.push(name);
        }
        for (name, value) in &self.locals {
            scope.push_dynamic(name.as_str(), value_to_dynamic(value));
        }

        let run_result = if is_expression {
            self.engine
                .eval_with_scope::<Dynamic>(&mut scope, &format!("({})", script))
        } else {
            self.engine
                .run_with_scope(&mut scope, script)
                .map(|_| Dynamic::UNIT)
        };
        let value = run_result.map_err(|error| {
            EventError::new(ErrorCode::Runtime, format!("Expression eval failed: {}", error))
        })?;

        for name in visible_globals {
            let after = scope
                .get_value::<Dynamic>(name)
                .map(dynamic_to_value)
                .transpose()?;
            if after.as_ref() != globals.get(name) {
                return Err(EventError::new(
                    ErrorCode::Runtime,
                    format!("Game state '{}' is read-only in events.", name),
                ));
            }
        }

        let local_names = self.locals.keys().cloned().collect::<Vec<_>>();
        for name in local_names {
            if let Some(after) = scope.get_value::<Dynamic>(&name) {
                self.locals.insert(name, dynamic_to_value(after)?);
            }
        }

        Ok(value)
    }

    pub(super) fn eval_value(
        &mut self,
        expr: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<EventValue, EventError> {
        dynamic_to_value(self.execute_rhai(expr, true, globals)?)
    }

    pub(super) fn eval_truthy(
        &mut self,
        expr: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<bool, EventError> {
        Ok(truthy(self.execute_rhai(expr, true, globals)?))
    }

    pub(super) fn eval_iterable(
        &mut self,
        expr: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<Vec<EventValue>, EventError> {
        iteration_items(self.execute_rhai(expr, true, globals)?)
    }

    /// Plain names (and name tuples) bind locals directly; anything else, an
    /// index or a field, runs as a statement against existing values.
    pub(super) fn execute_assign(
        &mut self,
        target: &str,
        value: &str,
        globals: &BTreeMap<String, EventValue>,
    ) -> Result<(), EventError> {
        if is_identifier(target) {
            let value = self.eval_value(value, globals)?;
            self.locals.insert(target.to_string(), value);
            return Ok(());
        }

        let targets = split_top_level(target, ',');
        if targets.len() > 1 && targets.iter().all(|name| is_identifier(name)) {
            let value = if split_top_level(value, ',').len() > 1 {
                self.eval_value(&format!("[{}]", value), globals)?
            } else {
                self.eval_value(value, globals)?
            };
            return self.bind_targets(&targets, &value);
        }

        self.execute_rhai(&format!("{} = {};", target, value), false, globals)
            .map(|_| ())
    }

    pub(super) fn bind_targets(
        &mut self,
        targets: &[String],
        value: &EventValue,
    ) -> Result<(), EventError> {
        if let [target] = targets {
            self.locals.insert(target.clone(), value.clone());
            return Ok(());
        }
        match value {
            EventValue::List(items) if items.len() == targets.len() => {
                for (target, item) in targets.iter().zip(items) {
                    self.locals.insert(target.clone(), item.clone());
                }
                Ok(())
            }
            other => Err(EventError::new(
                ErrorCode::Runtime,
                format!(
                    "cannot unpack {} '{}' into {} names",
                    other.type_name(),
                    other,
                    targets.len()
                ),
            )),
        }
    }
}
