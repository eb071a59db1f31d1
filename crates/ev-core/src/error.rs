use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidVersion,
    ForbiddenSymbol,
    InvalidSyntax,
    NestedEvent,
    InvalidCommand,
    CannotUseYield,
    NoSaveInLoop,
    MalformedTriggerScriptCall,
    Runtime,
    SentinelMismatch,
    BlockMismatch,
    BadArguments,
    Snapshot,
    GuardExceeded,
    UnknownEvent,
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidVersion => "INVALID_VERSION",
            Self::ForbiddenSymbol => "FORBIDDEN_SYMBOL",
            Self::InvalidSyntax => "INVALID_SYNTAX",
            Self::NestedEvent => "NESTED_EVENT",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::CannotUseYield => "CANNOT_USE_YIELD",
            Self::NoSaveInLoop => "NO_SAVE_IN_LOOP",
            Self::MalformedTriggerScriptCall => "MALFORMED_TRIGGER_SCRIPT_CALL",
            Self::Runtime => "RUNTIME",
            Self::SentinelMismatch => "SENTINEL_MISMATCH",
            Self::BlockMismatch => "BLOCK_MISMATCH",
            Self::BadArguments => "BAD_ARGUMENTS",
            Self::Snapshot => "SNAPSHOT",
            Self::GuardExceeded => "GUARD_EXCEEDED",
            Self::UnknownEvent => "UNKNOWN_EVENT",
            Self::Io => "IO",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link of an error's call chain: which event, which line, and that
/// line's text as the author wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub event: String,
    pub line: usize,
    pub source_line: String,
}

/// Frames run outermost caller first, so the failing line is always last.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}{}", render_frames(.frames))]
#[serde(rename_all = "camelCase")]
pub struct EventError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<ErrorFrame>,
}

impl EventError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn at(
        mut self,
        event: impl Into<String>,
        line: usize,
        source_line: impl Into<String>,
    ) -> Self {
        self.frames.push(ErrorFrame {
            event: event.into(),
            line,
            source_line: source_line.into(),
        });
        self
    }

    pub fn called_from(
        mut self,
        event: impl Into<String>,
        line: usize,
        source_line: impl Into<String>,
    ) -> Self {
        self.frames.insert(
            0,
            ErrorFrame {
                event: event.into(),
                line,
                source_line: source_line.into(),
            },
        );
        self
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, message)
    }

    pub fn innermost(&self) -> Option<&ErrorFrame> {
        self.frames.last()
    }

    pub fn line(&self) -> Option<usize> {
        self.innermost().map(|frame| frame.line)
    }

    /// Fills in the event name of frames produced before the name was known.
    pub fn in_event(mut self, event: &str) -> Self {
        for frame in &mut self.frames {
            if frame.event.is_empty() {
                frame.event = event.to_string();
            }
        }
        self
    }
}

fn render_frames(frames: &[ErrorFrame]) -> String {
    if frames.is_empty() {
        return String::new();
    }
    let chain = frames
        .iter()
        .map(|frame| format!("{}:{}", frame.event, frame.line))
        .collect::<Vec<_>>()
        .join(" -> ");
    format!(" ({})", chain)
}
