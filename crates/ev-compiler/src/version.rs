use ev_core::{ErrorCode, EventError};
use ev_parser::version_tag;

/// Dialect versions this compiler understands.
pub const KNOWN_VERSIONS: [&str; 1] = ["pyev1"];

pub fn is_known_version(tag: &str) -> bool {
    KNOWN_VERSIONS.contains(&tag)
}

/// The declared version, or an `INVALID_VERSION` error pointing at the
/// first non-blank line.
pub fn check_version(event: &str, source: &str) -> Result<&'static str, EventError> {
    let tag = version_tag(source);
    if let Some(known) = tag.and_then(|tag| KNOWN_VERSIONS.iter().copied().find(|known| *known == tag)) {
        return Ok(known);
    }
    let (line, text) = source
        .split('\n')
        .enumerate()
        .find(|(_, text)| !text.trim().is_empty())
        .map(|(index, text)| (index + 1, text))
        .unwrap_or((1, ""));
    Err(EventError::new(
        ErrorCode::InvalidVersion,
        format!(
            "In event {}: Unknown python event version: {}",
            event,
            tag.unwrap_or("None")
        ),
    )
    .at(event, line, text))
}
