use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Values flowing between scripts, commands and the host. Integers stay
/// distinct from floats so `-1` in a script arrives as `-1`, not `-1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EventValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<EventValue>),
    Map(BTreeMap<String, EventValue>),
}

impl EventValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Python truthiness: empty containers, zero and `None` are false.
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
            Self::List(values) => !values.is_empty(),
            Self::Map(values) => !values.is_empty(),
        }
    }

    /// Parses a bare script literal: numbers, `True`/`False`/`None`.
    pub fn parse_literal(text: &str) -> Option<Self> {
        match text {
            "True" | "true" => return Some(Self::Bool(true)),
            "False" | "false" => return Some(Self::Bool(false)),
            "None" => return Some(Self::None),
            _ => {}
        }
        if let Ok(value) = text.parse::<i64>() {
            return Some(Self::Int(value));
        }
        let looks_numeric = text
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E'))
            && text.chars().any(|ch| ch.is_ascii_digit());
        if looks_numeric {
            if let Ok(value) = text.parse::<f64>() {
                return Some(Self::Float(value));
            }
        }
        None
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Self::String(value) => {
                out.push('\'');
                out.push_str(value);
                out.push('\'');
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{:.1}", value)
                } else {
                    write!(f, "{}", value)
                }
            }
            Self::String(value) => f.write_str(value),
            Self::List(values) => {
                let mut out = String::from("[");
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    value.write_repr(&mut out);
                }
                out.push(']');
                f.write_str(&out)
            }
            Self::Map(values) => {
                let mut out = String::from("{");
                for (index, (key, value)) in values.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push('\'');
                    out.push_str(key);
                    out.push_str("': ");
                    value.write_repr(&mut out);
                }
                out.push('}');
                f.write_str(&out)
            }
        }
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn untagged_json_keeps_ints_and_floats_apart() {
        let parsed: Vec<EventValue> =
            serde_json::from_str(r#"[null, true, 3, 2.5, "x", [1], {"a": 1}]"#)
                .expect("values should parse");
        assert_eq!(parsed[0], EventValue::None);
        assert_eq!(parsed[2], EventValue::Int(3));
        assert_eq!(parsed[3], EventValue::Float(2.5));
        assert!(matches!(parsed[5], EventValue::List(_)));
        assert!(matches!(parsed[6], EventValue::Map(_)));
        let json = serde_json::to_string(&parsed[0]).expect("none should serialize");
        assert_eq!(json, "null");
    }

    #[test]
    fn display_follows_script_conventions() {
        assert_eq!(EventValue::Bool(true).to_string(), "True");
        assert_eq!(EventValue::Float(2.0).to_string(), "2.0");
        assert_eq!(EventValue::None.to_string(), "None");
        let list = EventValue::List(vec!["Seth".into(), EventValue::Int(1)]);
        assert_eq!(list.to_string(), "['Seth', 1]");
    }

    #[test]
    fn literals_and_truthiness() {
        assert_eq!(EventValue::parse_literal("-1"), Some(EventValue::Int(-1)));
        assert_eq!(EventValue::parse_literal("0.5"), Some(EventValue::Float(0.5)));
        assert_eq!(EventValue::parse_literal("False"), Some(EventValue::Bool(false)));
        assert_eq!(EventValue::parse_literal("eirika"), None);
        assert_eq!(EventValue::parse_literal("inf"), None);
        assert!(!EventValue::String(String::new()).truthy());
        assert!(EventValue::Int(2).truthy());
        assert!(!EventValue::List(Vec::new()).truthy());
    }
}
