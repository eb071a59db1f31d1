use ev_core::{CommandDescriptor, CommandRegistry};
use log::warn;

use crate::sws::RAW_NEWLINE;

/// How a line naming an unknown command is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown commands parse to `None`; used by validation.
    Strict,
    /// Unknown commands become comments so the author's text survives an
    /// engine version mismatch.
    #[default]
    Lenient,
}

/// Keywords whose arguments keep their parentheses: they hold expressions or
/// free text rather than an annotated value.
const VERBATIM_KEYWORDS: [&str; 7] = [
    "Expression",
    "Condition",
    "String",
    "Text",
    "StringList",
    "PointList",
    "DashList",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCommand {
    /// Canonical command id, even when the line used an alias.
    pub id: String,
    /// Argument values as bound to parameters.
    pub values: Vec<String>,
    /// Argument values as the author wrote them.
    pub display_values: Vec<String>,
    pub source: String,
}

impl LegacyCommand {
    /// Assigns values to parameter slots. The first values fill the required
    /// keywords in order; after those, values naming an allowed flag become
    /// flags and the rest fill optional keywords. Values beyond the last slot
    /// are dropped.
    pub fn bind(&self, descriptor: &CommandDescriptor) -> (Vec<(String, String)>, Vec<String>) {
        let slots = descriptor.parameter_slots();
        let required = descriptor.keywords.len();
        let mut bound = Vec::new();
        let mut flags = Vec::new();
        let mut next_slot = 0usize;
        for (index, value) in self.values.iter().enumerate() {
            if index >= required && descriptor.accepts_flag(value) {
                if !flags.contains(value) {
                    flags.push(value.clone());
                }
                continue;
            }
            if let Some(slot) = slots.get(next_slot) {
                bound.push((slot.clone(), value.clone()));
            }
            next_slot += 1;
        }
        (bound, flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyLine {
    Blank,
    Comment(String),
    Command(LegacyCommand),
}

impl LegacyLine {
    pub fn command_id(&self) -> Option<&str> {
        match self {
            Self::Command(command) => Some(command.id.as_str()),
            _ => None,
        }
    }

    fn is(&self, id: &str) -> bool {
        self.command_id() == Some(id)
    }
}

/// Parses one `command;arg;arg;flag` line.
pub fn parse_text_to_command(
    registry: &CommandRegistry,
    text: &str,
    mode: ParseMode,
) -> Option<LegacyLine> {
    let text = text.trim_start();
    if text.trim_end().is_empty() {
        return Some(LegacyLine::Blank);
    }
    if text.starts_with('#') {
        return Some(LegacyLine::Comment(text.to_string()));
    }

    let mut arguments = text.split(';');
    let name = arguments.next().unwrap_or_default().trim_end();
    let Some(descriptor) = registry.get(name) else {
        return match mode {
            ParseMode::Strict => None,
            ParseMode::Lenient => {
                warn!("unknown event command '{}' kept as a comment", name);
                Some(LegacyLine::Comment(text.to_string()))
            }
        };
    };

    let slots = descriptor
        .keywords
        .iter()
        .chain(descriptor.optional_keywords.iter())
        .collect::<Vec<_>>();
    let mut values = Vec::new();
    let mut display_values = Vec::new();
    for (index, raw) in arguments.enumerate() {
        let arg = if descriptor.id == "speak" {
            raw.to_string()
        } else {
            raw.replace(RAW_NEWLINE, "")
        };
        let keyword = slots.get(index).map(|name| name.as_str()).unwrap_or("N/A");
        values.push(annotated_value(&arg, keyword).unwrap_or_else(|| arg.clone()));
        display_values.push(raw.to_string());
    }

    Some(LegacyLine::Command(LegacyCommand {
        id: descriptor.id.clone(),
        values,
        display_values,
        source: text.to_string(),
    }))
}

/// `Lute (the bard)` style arguments carry their real value in parentheses
/// and treat the rest as an annotation.
fn annotated_value(arg: &str, keyword: &str) -> Option<String> {
    if arg.contains('{') || arg.contains('}') {
        return None;
    }
    if !arg.contains("FLAG") && VERBATIM_KEYWORDS.contains(&keyword) {
        return None;
    }
    let open = arg.find('(')?;
    let close = arg.find(')')?;
    (close > open).then(|| arg[open + 1..close].to_string())
}

/// Index of the `end` (or `endf` for a `for`) closing the block opened at
/// `index`. Only keywords of the same family change the depth.
pub fn find_block_end(lines: &[LegacyLine], index: usize) -> Option<usize> {
    let (opener, closer) = if lines.get(index)?.is("for") {
        ("for", "endf")
    } else {
        ("if", "end")
    };
    let mut depth = 0usize;
    for (offset, line) in lines.iter().enumerate().skip(index + 1) {
        if line.is(opener) {
            depth += 1;
        } else if line.is(closer) {
            if depth == 0 {
                return Some(offset);
            }
            depth -= 1;
        }
    }
    None
}

/// Next `elif`/`else`/`end` belonging to the same `if` chain as the header at
/// `index`. Nested `if` chains and `for` blocks are stepped over.
pub fn next_sibling_branch(lines: &[LegacyLine], index: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut cursor = index + 1;
    while let Some(line) = lines.get(cursor) {
        match line.command_id() {
            Some("if") => depth += 1,
            Some("end") if depth == 0 => return Some(cursor),
            Some("end") => depth -= 1,
            Some("elif") | Some("else") if depth == 0 => return Some(cursor),
            Some("for") => cursor = find_block_end(lines, cursor)?,
            _ => {}
        }
        cursor += 1;
    }
    None
}
