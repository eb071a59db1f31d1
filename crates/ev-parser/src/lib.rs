pub mod legacy;
pub mod pyexpr;
pub mod script;
pub mod sws;

use std::sync::OnceLock;

use regex::Regex;

pub use legacy::{find_block_end, next_sibling_branch, parse_text_to_command, LegacyCommand, LegacyLine, ParseMode};
pub use script::{parse_script, walk_statements, CondBranch, ElseClause, Stmt, StmtKind, WalkContext};
pub use sws::{SwsCompiler, RAW_NEWLINE};

fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| {
        Regex::new(r"^#\s*(pyev[0-9A-Za-z_]*)\s*$").expect("version regex must compile")
    })
}

/// Dialect tag declared on the first non-blank line (`#pyev1` gives
/// `pyev1`). Legacy scripts have none.
pub fn version_tag(source: &str) -> Option<&str> {
    let first = source
        .split(['\n', RAW_NEWLINE])
        .map(str::trim)
        .find(|line| !line.is_empty())?;
    version_regex()
        .captures(first)
        .and_then(|caps| caps.get(1))
        .map(|tag| tag.as_str())
}
