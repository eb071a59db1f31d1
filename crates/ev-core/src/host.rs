use std::collections::BTreeMap;

use crate::value::EventValue;

/// Read-only game state visible to script expressions. The game applies
/// command side effects itself; scripts never write through this trait.
pub trait ScriptHost {
    fn globals(&self) -> BTreeMap<String, EventValue>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticHost {
    globals: BTreeMap<String, EventValue>,
}

impl StaticHost {
    pub fn new(globals: BTreeMap<String, EventValue>) -> Self {
        Self { globals }
    }

    pub fn with(mut self, name: &str, value: impl Into<EventValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<EventValue>) {
        self.globals.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&EventValue> {
        self.globals.get(name)
    }
}

impl ScriptHost for StaticHost {
    fn globals(&self) -> BTreeMap<String, EventValue> {
        self.globals.clone()
    }
}

/// Source lookup for events started by name (`trigger_script`).
pub trait EventCatalog {
    fn event_source(&self, name: &str) -> Option<String>;
}

impl EventCatalog for BTreeMap<String, String> {
    fn event_source(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod host_tests {
    use super::*;

    #[test]
    fn static_host_exposes_globals() {
        let mut host = StaticHost::default().with("TimesRescued", 10i64);
        host.set("SomeState", true);
        let globals = host.globals();
        assert_eq!(globals.get("TimesRescued"), Some(&EventValue::Int(10)));
        assert_eq!(host.get("SomeState"), Some(&EventValue::Bool(true)));
    }

    #[test]
    fn map_catalog_finds_sources() {
        let mut catalog = BTreeMap::new();
        catalog.insert("intro".to_string(), "#pyev1".to_string());
        assert_eq!(catalog.event_source("intro").as_deref(), Some("#pyev1"));
        assert!(catalog.event_source("missing").is_none());
    }
}
