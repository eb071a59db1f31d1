//! Lexing and rewriting of the Python-flavoured expressions authors write in
//! pyev1 events and legacy `{eval:...}` substitutions. Expressions are
//! rewritten token by token into Rhai; whitespace between tokens is kept.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    Number,
    Str { value: String, fstring: bool },
    Op,
    Open,
    Close,
    Comma,
    Colon,
    Dollar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

const OPERATORS: [&str; 33] = [
    "**=", "//=", ">>=", "<<=", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "**", "//", "->", "<<", ">>", ":=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "&", "|", "^",
];
const SINGLE_OPERATORS: [char; 4] = ['~', '@', '.', ';'];
pub const ASSIGN_OPERATORS: [&str; 11] = [
    "=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", ">>=",
];

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "f" | "r" | "b" | "u" | "rf" | "fr" | "rb" | "br"
    )
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if is_ident_start(first) => chars.all(is_ident_char),
        _ => false,
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars = source.char_indices().collect::<Vec<_>>();
    let byte_at = |index: usize| chars.get(index).map(|(pos, _)| *pos).unwrap_or(source.len());
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let (start, ch) = chars[index];
        if ch.is_whitespace() || ch == '\\' {
            index += 1;
            continue;
        }
        if ch == '#' {
            break;
        }
        if is_ident_start(ch) {
            let mut next = index + 1;
            while next < chars.len() && is_ident_char(chars[next].1) {
                next += 1;
            }
            let word = &source[start..byte_at(next)];
            if next < chars.len() && matches!(chars[next].1, '\'' | '"') && is_string_prefix(word)
            {
                let (token, after) = lex_string(source, &chars, index, next, word)?;
                tokens.push(token);
                index = after;
                continue;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: word.to_string(),
                start,
                end: byte_at(next),
            });
            index = next;
            continue;
        }
        let starts_number = ch.is_ascii_digit()
            || (ch == '.' && chars.get(index + 1).is_some_and(|(_, c)| c.is_ascii_digit()));
        if starts_number {
            let mut next = index + 1;
            while next < chars.len() {
                let current = chars[next].1;
                let previous = chars[next - 1].1;
                if current.is_ascii_alphanumeric() || current == '_' || current == '.' {
                    next += 1;
                } else if matches!(current, '+' | '-') && matches!(previous, 'e' | 'E') {
                    next += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: source[start..byte_at(next)].to_string(),
                start,
                end: byte_at(next),
            });
            index = next;
            continue;
        }
        if matches!(ch, '\'' | '"') {
            let (token, after) = lex_string(source, &chars, index, index, "")?;
            tokens.push(token);
            index = after;
            continue;
        }
        let simple = match ch {
            '$' => Some(TokenKind::Dollar),
            '(' | '[' | '{' => Some(TokenKind::Open),
            ')' | ']' | '}' => Some(TokenKind::Close),
            ',' => Some(TokenKind::Comma),
            ':' if !source[start..].starts_with(":=") => Some(TokenKind::Colon),
            _ if SINGLE_OPERATORS.contains(&ch) => Some(TokenKind::Op),
            _ => None,
        };
        if let Some(kind) = simple {
            tokens.push(Token {
                kind,
                text: ch.to_string(),
                start,
                end: start + ch.len_utf8(),
            });
            index += 1;
            continue;
        }
        let Some(operator) = OPERATORS.iter().find(|op| source[start..].starts_with(**op)) else {
            return Err(format!("unexpected character '{}'", ch));
        };
        tokens.push(Token {
            kind: TokenKind::Op,
            text: operator.to_string(),
            start,
            end: start + operator.len(),
        });
        index += operator.chars().count();
    }

    Ok(tokens)
}

fn lex_string(
    source: &str,
    chars: &[(usize, char)],
    token_index: usize,
    quote_index: usize,
    prefix: &str,
) -> Result<(Token, usize), String> {
    let quote = chars[quote_index].1;
    let lowered = prefix.to_ascii_lowercase();
    let raw = lowered.contains('r');
    let fstring = lowered.contains('f');
    let is_quote = |index: usize| chars.get(index).is_some_and(|(_, c)| *c == quote);
    let triple = is_quote(quote_index + 1) && is_quote(quote_index + 2);

    let mut index = quote_index + if triple { 3 } else { 1 };
    let mut value = String::new();
    while index < chars.len() {
        let ch = chars[index].1;
        if ch == '\\' && !raw {
            let Some((_, escaped)) = chars.get(index + 1) else {
                break;
            };
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' | '\'' | '"' => value.push(*escaped),
                '\n' => {}
                other => {
                    value.push('\\');
                    value.push(*other);
                }
            }
            index += 2;
            continue;
        }
        if ch == quote && (!triple || (is_quote(index + 1) && is_quote(index + 2))) {
            let after = index + if triple { 3 } else { 1 };
            let end = chars.get(after).map(|(pos, _)| *pos).unwrap_or(source.len());
            let start = chars[token_index].0;
            return Ok((
                Token {
                    kind: TokenKind::Str { value, fstring },
                    text: source[start..end].to_string(),
                    start,
                    end,
                },
                after,
            ));
        }
        value.push(ch);
        index += 1;
    }
    Err("unterminated string literal".to_string())
}

/// Rhai double-quoted literal for `value`.
pub fn quote_rhai(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ch if (ch as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", ch as u32)),
            ch => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn next_significant(tokens: &[Token], index: usize) -> Option<&Token> {
    tokens.get(index + 1)
}

/// Rewrites a Python-flavoured expression or simple statement into Rhai.
pub fn to_rhai(source: &str) -> Result<String, String> {
    let tokens = tokenize(source)?;
    let mut out = String::with_capacity(source.len() + 8);
    let mut last_end = 0usize;
    let mut index = 0usize;

    while index < tokens.len() {
        let token = &tokens[index];
        out.push_str(&source[last_end..token.start]);
        last_end = token.end;
        match &token.kind {
            TokenKind::Ident => match token.text.as_str() {
                "and" => out.push_str("&&"),
                "or" => out.push_str("||"),
                "True" => out.push_str("true"),
                "False" => out.push_str("false"),
                "None" => out.push_str("()"),
                "not" => {
                    if next_significant(&tokens, index).is_some_and(|next| next.text == "in") {
                        out.push_str("!in");
                        last_end = tokens[index + 1].end;
                        index += 1;
                    } else {
                        out.push('!');
                    }
                }
                "is" => {
                    if next_significant(&tokens, index).is_some_and(|next| next.text == "not") {
                        out.push_str("!=");
                        last_end = tokens[index + 1].end;
                        index += 1;
                    } else {
                        out.push_str("==");
                    }
                }
                _ => out.push_str(&token.text),
            },
            TokenKind::Number => {
                let text = token.text.replace('_', "");
                if text.starts_with('.') {
                    out.push('0');
                }
                out.push_str(&text);
                if text.ends_with('.') {
                    out.push('0');
                }
            }
            TokenKind::Str { value, fstring } => {
                if *fstring {
                    out.push_str(&fstring_to_rhai(value)?);
                } else {
                    out.push_str(&quote_rhai(value));
                }
            }
            TokenKind::Open if token.text == "{" => out.push_str("#{"),
            TokenKind::Op if token.text == "//" => out.push('/'),
            TokenKind::Op if token.text == "//=" => out.push_str("/="),
            _ => out.push_str(&token.text),
        }
        index += 1;
    }

    Ok(out)
}

fn fstring_to_rhai(value: &str) -> Result<String, String> {
    let mut out = String::from("`");
    let chars = value.chars().collect::<Vec<_>>();
    let mut index = 0usize;
    while index < chars.len() {
        let ch = chars[index];
        match ch {
            '{' if chars.get(index + 1) == Some(&'{') => {
                out.push('{');
                index += 2;
            }
            '}' if chars.get(index + 1) == Some(&'}') => {
                out.push('}');
                index += 2;
            }
            '{' => {
                let mut depth = 1usize;
                let mut end = index + 1;
                while end < chars.len() {
                    match chars[end] {
                        '{' | '[' | '(' => depth += 1,
                        '}' | ']' | ')' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    end += 1;
                }
                if depth != 0 {
                    return Err("unterminated replacement field in f-string".to_string());
                }
                let inner = chars[index + 1..end].iter().collect::<String>();
                let inner = strip_format_spec(&inner);
                out.push_str("${");
                out.push_str(&to_rhai(inner)?);
                out.push('}');
                index = end + 1;
            }
            _ => {
                out.push(ch);
                index += 1;
            }
        }
    }
    out.push('`');
    Ok(out)
}

fn strip_format_spec(field: &str) -> &str {
    let mut depth = 0i32;
    for (pos, ch) in field.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' | '!' if depth == 0 && !field[pos..].starts_with("!=") => {
                return field[..pos].trim();
            }
            _ => {}
        }
    }
    field.trim()
}

/// Walks `source` calling `visit(byte_pos, char)` for every character that
/// sits outside string literals, with the bracket depth before the char.
fn scan_top_level(source: &str, mut visit: impl FnMut(usize, char, i32) -> bool) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (pos, ch) in source.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        if matches!(ch, '\'' | '"') {
            quote = Some(ch);
            continue;
        }
        if !visit(pos, ch, depth) {
            return;
        }
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
}

/// Drops a trailing `#` comment that is not inside a string.
pub fn strip_comment(line: &str) -> &str {
    let mut cut = line.len();
    scan_top_level(line, |pos, ch, _| {
        if ch == '#' {
            cut = pos;
            return false;
        }
        true
    });
    &line[..cut]
}

/// Net bracket depth of a line, used to join continuation lines.
pub fn bracket_depth(line: &str) -> i32 {
    let mut depth = 0i32;
    let text = strip_comment(line);
    scan_top_level(text, |_, ch, _| {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        true
    });
    depth
}

pub fn find_top_level_char(source: &str, target: char) -> Option<usize> {
    let mut found = None;
    scan_top_level(source, |pos, ch, depth| {
        if depth == 0 && ch == target {
            found = Some(pos);
            return false;
        }
        true
    });
    found
}

/// Splits on `separator` outside strings and brackets; pieces are trimmed
/// and empty trailing pieces dropped.
pub fn split_top_level(source: &str, separator: char) -> Vec<String> {
    let mut cuts = Vec::new();
    scan_top_level(source, |pos, ch, depth| {
        if depth == 0 && ch == separator {
            cuts.push(pos);
        }
        true
    });
    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0usize;
    for cut in cuts {
        pieces.push(source[start..cut].trim().to_string());
        start = cut + separator.len_utf8();
    }
    let tail = source[start..].trim();
    if !tail.is_empty() {
        pieces.push(tail.to_string());
    }
    pieces
}

/// Byte offset of the first top-level identifier token equal to `word`.
pub fn find_top_level_word(source: &str, word: &str) -> Option<usize> {
    let tokens = tokenize(source).ok()?;
    let mut depth = 0i32;
    for token in &tokens {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth -= 1,
            TokenKind::Ident if depth == 0 && token.text == word => return Some(token.start),
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    /// `None` for plain `=`, otherwise the binary operator (`+` for `+=`).
    pub op: Option<String>,
    pub value: String,
}

pub fn split_assignment(source: &str) -> Option<Assignment> {
    let tokens = tokenize(source).ok()?;
    let mut depth = 0i32;
    for token in &tokens {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth -= 1,
            TokenKind::Op if depth == 0 && ASSIGN_OPERATORS.contains(&token.text.as_str()) => {
                let target = source[..token.start].trim();
                if target.is_empty() {
                    return None;
                }
                let op = token.text.strip_suffix('=').filter(|op| !op.is_empty());
                return Some(Assignment {
                    target: target.to_string(),
                    op: op.map(str::to_string),
                    value: source[token.end..].trim().to_string(),
                });
            }
            _ => {}
        }
    }
    None
}

/// Command names referenced as `$name` outside strings.
pub fn command_refs(source: &str) -> Vec<String> {
    let Ok(tokens) = tokenize(source) else {
        return Vec::new();
    };
    tokens
        .windows(2)
        .filter(|pair| pair[0].kind == TokenKind::Dollar && pair[0].end == pair[1].start)
        .filter(|pair| pair[1].kind == TokenKind::Ident)
        .map(|pair| pair[1].text.clone())
        .collect()
}

/// Replaces `$name` with a plain identifier so the surrounding expression
/// can be syntax-checked.
pub fn expand_command_refs(source: &str) -> String {
    let Ok(tokens) = tokenize(source) else {
        return source.to_string();
    };
    let mut out = String::with_capacity(source.len() + 8);
    let mut last = 0usize;
    for token in &tokens {
        if token.kind == TokenKind::Dollar {
            out.push_str(&source[last..token.start]);
            out.push_str("__cmd_");
            last = token.end;
        }
    }
    out.push_str(&source[last..]);
    out
}

pub fn mentions_word(source: &str, word: &str) -> bool {
    tokenize(source)
        .map(|tokens| {
            tokens
                .iter()
                .any(|token| token.kind == TokenKind::Ident && token.text == word)
        })
        .unwrap_or(false)
}

/// The decoded value of `text` when it is exactly one plain string literal.
pub fn unquote(text: &str) -> Option<String> {
    let tokens = tokenize(text).ok()?;
    match tokens.as_slice() {
        [Token {
            kind: TokenKind::Str {
                value,
                fstring: false,
            },
            ..
        }] => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod pyexpr_tests {
    use super::*;

    #[test]
    fn rewrites_python_operators_and_literals() {
        assert_eq!(
            to_rhai("a and not b or c is None").expect("rewrite"),
            "a && ! b || c == ()"
        );
        assert_eq!(to_rhai("x is not True").expect("rewrite"), "x != true");
        assert_eq!(to_rhai("n // 2 + .5").expect("rewrite"), "n / 2 + 0.5");
        assert_eq!(to_rhai("'Seth' not in names").expect("rewrite"), "\"Seth\" !in names");
        assert_eq!(to_rhai("{'a': 1}").expect("rewrite"), "#{\"a\": 1}");
    }

    #[test]
    fn rewrites_fstrings_into_interpolation() {
        assert_eq!(
            to_rhai("f\"You've rescued me {TimesRescued} times\"").expect("rewrite"),
            "`You've rescued me ${TimesRescued} times`"
        );
        assert_eq!(to_rhai("f'{x:>3}{{'").expect("rewrite"), "`${x}{`");
    }

    #[test]
    fn escapes_single_quoted_strings() {
        assert_eq!(to_rhai(r#"'say "hi"\n'"#).expect("rewrite"), r#""say \"hi\"\n""#);
        assert!(to_rhai("'open").is_err());
    }

    #[test]
    fn splits_and_finds_outside_strings_and_brackets() {
        assert_eq!(
            split_top_level("eirika, \"a, b\", (1, 2), Nid=x", ','),
            vec!["eirika", "\"a, b\"", "(1, 2)", "Nid=x"]
        );
        assert_eq!(find_top_level_char("if d['k:v']: pass", ':'), Some(11));
        assert_eq!(find_top_level_word("i, x in enumerate(items)", "in"), Some(5));
        assert_eq!(strip_comment("x = '#no' # yes"), "x = '#no' ");
        assert_eq!(bracket_depth("foo(1, [2,"), 2);
    }

    #[test]
    fn detects_assignments_but_not_comparisons() {
        let plain = split_assignment("counter = counter + 1").expect("assignment");
        assert_eq!(plain.target, "counter");
        assert_eq!(plain.op, None);
        let augmented = split_assignment("items[0] += 2").expect("aug assignment");
        assert_eq!(augmented.target, "items[0]");
        assert_eq!(augmented.op.as_deref(), Some("+"));
        assert!(split_assignment("a == b").is_none());
        assert!(split_assignment("f(x=1)").is_none());
    }

    #[test]
    fn command_references_are_found_and_expanded() {
        assert_eq!(command_refs("x = $speak(a) and '$not'"), vec!["speak"]);
        assert_eq!(expand_command_refs("$wait(10) or 1"), "__cmd_wait(10) or 1");
        assert!(mentions_word("x = yield 3", "yield"));
        assert!(!mentions_word("'yield'", "yield"));
        assert_eq!(unquote("'Other Event'").as_deref(), Some("Other Event"));
        assert_eq!(unquote("other"), None);
        assert!(is_identifier("_x1") && !is_identifier("1x"));
    }
}
