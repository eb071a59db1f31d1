use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ev_core::EventValue;
use walkdir::WalkDir;

use crate::{
    map_cli_globals_invalid, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
    CliError, LoadedEvents,
};

/// File extensions holding event sources. Both dialects may use either.
pub(crate) const EVENT_EXTENSIONS: [&str; 2] = [".pyevent", ".event"];

const EVENTS_REF_PREFIX: &str = "events-dir:";

pub(crate) fn load_events_by_dir(events_dir: &str) -> Result<LoadedEvents, CliError> {
    let root = resolve_events_dir(events_dir)?;
    let sources = read_events_from_dir(&root)?;
    Ok(LoadedEvents {
        id: make_events_ref(&root),
        sources,
    })
}

pub(crate) fn load_events_by_ref(events_ref: &str) -> Result<LoadedEvents, CliError> {
    let Some(raw) = events_ref.strip_prefix(EVENTS_REF_PREFIX) else {
        return Err(CliError::new(
            "CLI_SOURCE_REF_INVALID",
            format!("Unsupported events ref: {}", events_ref),
        ));
    };
    load_events_by_dir(raw)
}

pub(crate) fn resolve_events_dir(events_dir: &str) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(events_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(CliError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("events-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(CliError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("events-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Event name of a file: its path under the events directory without the
/// extension, so `chapter1/intro.pyevent` is `chapter1/intro`.
pub(crate) fn event_name(relative: &str) -> Option<&str> {
    EVENT_EXTENSIONS
        .iter()
        .find_map(|extension| relative.strip_suffix(extension))
        .filter(|name| !name.is_empty())
}

pub(crate) fn read_events_from_dir(
    events_dir: &Path,
) -> Result<BTreeMap<String, String>, CliError> {
    let mut events = BTreeMap::new();

    for entry in WalkDir::new(events_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(events_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");
        let Some(name) = event_name(&relative) else {
            continue;
        };

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        if events.insert(name.to_string(), content).is_some() {
            return Err(CliError::new(
                "CLI_SOURCE_DUPLICATE",
                format!("Event '{}' is defined by more than one file", name),
            ));
        }
    }

    if events.is_empty() {
        return Err(CliError::new(
            "CLI_SOURCE_EMPTY",
            format!("No .pyevent/.event files under {}", events_dir.display()),
        ));
    }

    Ok(events)
}

pub(crate) fn make_events_ref(events_dir: &Path) -> String {
    format!("{}{}", EVENTS_REF_PREFIX, events_dir.display())
}

/// Game state from an optional JSON object file, then `NAME=JSON`
/// overrides. A value that is not valid JSON is taken as a string.
pub(crate) fn read_globals(
    path: Option<&str>,
    sets: &[String],
) -> Result<BTreeMap<String, EventValue>, CliError> {
    let mut globals = match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(map_cli_source_read)?;
            serde_json::from_str::<BTreeMap<String, EventValue>>(&raw)
                .map_err(map_cli_globals_invalid)?
        }
        None => BTreeMap::new(),
    };
    apply_sets(&mut globals, sets)?;
    Ok(globals)
}

pub(crate) fn apply_sets(
    globals: &mut BTreeMap<String, EventValue>,
    sets: &[String],
) -> Result<(), CliError> {
    for set in sets {
        let Some((name, raw)) = set.split_once('=') else {
            return Err(CliError::new(
                "CLI_SET_INVALID",
                format!("Expected NAME=JSON, got '{}'", set),
            ));
        };
        let value = serde_json::from_str::<EventValue>(raw)
            .unwrap_or_else(|_| EventValue::String(raw.to_string()));
        globals.insert(name.trim().to_string(), value);
    }
    Ok(())
}
