use std::collections::BTreeMap;

use ev_core::{ErrorCode, EventError, EventValue};
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, FLOAT, INT,
};

// Mirrors rhai's crate-private range aliases.
type ExclusiveRange = std::ops::Range<INT>;
type InclusiveRange = std::ops::RangeInclusive<INT>;

pub(crate) fn value_to_dynamic(value: &EventValue) -> Dynamic {
    match value {
        EventValue::None => Dynamic::UNIT,
        EventValue::Bool(value) => Dynamic::from_bool(*value),
        EventValue::Int(value) => Dynamic::from_int(*value),
        EventValue::Float(value) => Dynamic::from_float(*value),
        EventValue::String(value) => Dynamic::from(value.clone()),
        EventValue::List(values) => {
            Dynamic::from_array(values.iter().map(value_to_dynamic).collect::<Array>())
        }
        EventValue::Map(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<EventValue, EventError> {
    if value.is_unit() {
        return Ok(EventValue::None);
    }
    if value.is::<bool>() {
        return Ok(EventValue::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(EventValue::Int(value.cast::<INT>()));
    }
    if value.is::<FLOAT>() {
        return Ok(EventValue::Float(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(EventValue::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(EventValue::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_value(item)?);
        }
        return Ok(EventValue::List(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_value(value)?);
        }
        return Ok(EventValue::Map(out));
    }
    if value.is::<ExclusiveRange>() {
        return Ok(EventValue::List(
            value.cast::<ExclusiveRange>().map(EventValue::Int).collect(),
        ));
    }
    if value.is::<InclusiveRange>() {
        return Ok(EventValue::List(
            value.cast::<InclusiveRange>().map(EventValue::Int).collect(),
        ));
    }

    Err(EventError::new(
        ErrorCode::Runtime,
        format!("unsupported script value of type '{}'", value.type_name()),
    ))
}

/// Values a `for` loop walks: list items, range numbers, string characters
/// or map keys.
pub(crate) fn iteration_items(value: Dynamic) -> Result<Vec<EventValue>, EventError> {
    if value.is::<ImmutableString>() {
        return Ok(value
            .cast::<ImmutableString>()
            .chars()
            .map(|ch| EventValue::String(ch.to_string()))
            .collect());
    }
    if value.is::<Map>() {
        return Ok(value
            .cast::<Map>()
            .keys()
            .map(|key| EventValue::String(key.to_string()))
            .collect());
    }
    let type_name = value.type_name();
    match dynamic_to_value(value)? {
        EventValue::List(items) => Ok(items),
        _ => Err(EventError::new(
            ErrorCode::Runtime,
            format!("'{}' object is not iterable", type_name),
        )),
    }
}

/// Truthiness of a condition result; values with no script counterpart count
/// as true.
pub(crate) fn truthy(value: Dynamic) -> bool {
    dynamic_to_value(value)
        .map(|value| value.truthy())
        .unwrap_or(true)
}

fn runtime_error(message: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message),
        Position::NONE,
    ))
}

fn python_text(value: Dynamic) -> String {
    let fallback = value.to_string();
    dynamic_to_value(value)
        .map(|value| value.to_string())
        .unwrap_or(fallback)
}

fn range_array(start: INT, end: INT, step: INT) -> Result<Array, Box<EvalAltResult>> {
    if step == 0 {
        return Err(runtime_error("range() arg 3 must not be zero".to_string()));
    }
    let mut out = Array::new();
    let mut current = start;
    while (step > 0 && current < end) || (step < 0 && current > end) {
        out.push(Dynamic::from_int(current));
        current += step;
    }
    Ok(out)
}

fn to_int(value: Dynamic) -> Result<INT, Box<EvalAltResult>> {
    let type_name = value.type_name();
    if value.is::<INT>() {
        return Ok(value.cast::<INT>());
    }
    if value.is::<FLOAT>() {
        return Ok(value.cast::<FLOAT>().trunc() as INT);
    }
    if value.is::<bool>() {
        return Ok(INT::from(value.cast::<bool>()));
    }
    if value.is::<ImmutableString>() {
        let text = value.cast::<ImmutableString>();
        return text
            .trim()
            .parse::<INT>()
            .map_err(|_| runtime_error(format!("invalid literal for int(): '{}'", text)));
    }
    Err(runtime_error(format!(
        "int() argument must be a string or a number, not '{}'",
        type_name
    )))
}

fn to_float(value: Dynamic) -> Result<FLOAT, Box<EvalAltResult>> {
    let type_name = value.type_name();
    if value.is::<FLOAT>() {
        return Ok(value.cast::<FLOAT>());
    }
    if value.is::<INT>() {
        return Ok(value.cast::<INT>() as FLOAT);
    }
    if value.is::<bool>() {
        return Ok(if value.cast::<bool>() { 1.0 } else { 0.0 });
    }
    if value.is::<ImmutableString>() {
        let text = value.cast::<ImmutableString>();
        return text
            .trim()
            .parse::<FLOAT>()
            .map_err(|_| runtime_error(format!("could not convert string to float: '{}'", text)));
    }
    Err(runtime_error(format!(
        "float() argument must be a string or a number, not '{}'",
        type_name
    )))
}

/// Expression engine shared by every evaluation of one processor. Undeclared
/// names are errors, and the handful of Python builtins events rely on are
/// registered up front.
pub(crate) fn build_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_strict_variables(true);

    engine.register_fn("range", |end: INT| range_array(0, end, 1));
    engine.register_fn("range", |start: INT, end: INT| range_array(start, end, 1));
    engine.register_fn("range", range_array);
    engine.register_fn("str", python_text);
    engine.register_fn("int", to_int);
    engine.register_fn("float", to_float);
    engine.register_fn("bool", truthy);
    engine.register_fn("enumerate", |items: Array| -> Array {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Dynamic::from_array(vec![Dynamic::from_int(index as INT), item]))
            .collect()
    });
    engine.register_fn("append", |items: &mut Array, item: Dynamic| items.push(item));
    engine
}
