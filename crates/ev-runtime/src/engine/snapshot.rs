use std::collections::BTreeMap;

use ev_core::{ErrorCode, EventError, EventSnapshot, EVENT_STATE_SCHEMA};

use super::lifecycle::EventProcessor;

impl EventProcessor {
    /// Locals and loop positions are not stored: a restored event rebuilds
    /// them by replaying up to the cursor.
    pub fn save(&self) -> EventSnapshot {
        let hits = match &self.resume {
            Some(check) if check.catching_up => check.history.clone(),
            _ => self.hits.clone(),
        };
        EventSnapshot {
            schema_version: EVENT_STATE_SCHEMA.to_string(),
            script_id: self.compiled.name.clone(),
            source: self.compiled.source.clone(),
            finished: self.finished,
            cursor: self.cursor,
            cursor_hits: self.cursor_hits,
            hits,
            iterators: BTreeMap::new(),
            args: self.args.clone(),
        }
    }
}

pub fn check_snapshot(snapshot: &EventSnapshot) -> Result<(), EventError> {
    if snapshot.schema_version != EVENT_STATE_SCHEMA {
        return Err(EventError::new(
            ErrorCode::Snapshot,
            format!(
                "unsupported event state schema '{}' (expected '{}')",
                snapshot.schema_version, EVENT_STATE_SCHEMA
            ),
        ));
    }
    if snapshot.script_id.is_empty() {
        return Err(EventError::new(
            ErrorCode::Snapshot,
            "event state has no script id",
        ));
    }
    Ok(())
}
