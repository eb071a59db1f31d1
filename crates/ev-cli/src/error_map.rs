use std::fmt::Display;

use ev_core::EventError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("{message}")]
    Cli { code: &'static str, message: String },
}

impl CliError {
    pub(crate) fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self::Cli {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn code(&self) -> String {
        match self {
            Self::Event(error) => error.code.to_string(),
            Self::Cli { code, .. } => code.to_string(),
        }
    }

    pub(crate) fn message(&self) -> &str {
        match self {
            Self::Event(error) => &error.message,
            Self::Cli { message, .. } => message,
        }
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string(value).map_err(|error| map_error("CLI_OUTPUT", error))
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code());
    println!(
        "ERROR_MSG_JSON:{}",
        to_json(&error.message()).unwrap_or_else(|_| "\"\"".to_string())
    );
    if let CliError::Event(event_error) = &error {
        for frame in &event_error.frames {
            println!(
                "ERROR_AT:{}:{}|{}",
                frame.event,
                frame.line,
                to_json(&frame.source_line).unwrap_or_else(|_| "\"\"".to_string())
            );
        }
    }
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> CliError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> CliError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> CliError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_globals_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_GLOBALS_INVALID", error)
}

pub(crate) fn map_cli_state_write(error: std::io::Error) -> CliError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_read(error: std::io::Error) -> CliError {
    map_error("CLI_STATE_READ", error)
}

pub(crate) fn map_cli_state_invalid(error: serde_json::Error) -> CliError {
    map_error("CLI_STATE_INVALID", error)
}
