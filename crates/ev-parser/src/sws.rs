use ev_core::{CommandTokenRecord, ScriptWithSentinel, COMMAND_SENTINEL, COMMAND_SIGIL};

/// Line separator some editors store in place of `\n`.
pub const RAW_NEWLINE: char = '\u{2028}';

/// Pulls every `$command` line out of a pyev1 script, leaving a placeholder
/// on the same line so line numbers never shift.
#[derive(Debug, Clone)]
pub struct SwsCompiler {
    source: String,
}

impl SwsCompiler {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.replace(RAW_NEWLINE, "\n"),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compile_sws(&self) -> ScriptWithSentinel {
        let mut lines = Vec::new();
        let mut records = Vec::new();
        for (index, line) in self.source.split('\n').enumerate() {
            match Self::parse_line(line) {
                Some(mut record) => {
                    record.line_number = index + 1;
                    let indent = &line[..line.len() - line.trim_start().len()];
                    lines.push(format!("{}{}", indent, COMMAND_SENTINEL));
                    records.push(record);
                }
                None => lines.push(line.to_string()),
            }
        }
        ScriptWithSentinel {
            source: lines.join("\n"),
            records,
        }
    }

    /// Tokenizes one command line, e.g.
    /// `$speak eirika "Hello" (1, 2), no_block`. Whitespace separates tokens
    /// outside quotes and brackets; the first top-level comma starts the
    /// flags; `#` ends the line. Offsets count chars from the line start.
    pub fn parse_line(line: &str) -> Option<CommandTokenRecord> {
        if !line.trim_start().starts_with(COMMAND_SIGIL) {
            return None;
        }
        let chars = line.chars().collect::<Vec<_>>();
        let sigil = chars.iter().position(|ch| *ch == COMMAND_SIGIL)?;

        let mut scanner = TokenScanner::default();
        let mut eol_offset = None;
        let mut index = sigil + 1;
        while index < chars.len() {
            let ch = chars[index];
            match ch {
                '\'' | '"' => {
                    scanner.push(ch, index);
                    index += 1;
                    while index < chars.len() && chars[index] != ch {
                        scanner.push(chars[index], index);
                        index += 1;
                    }
                    if index < chars.len() {
                        scanner.push(ch, index);
                    }
                }
                '#' => {
                    scanner.finish();
                    eol_offset = Some(index);
                    break;
                }
                '(' | '[' | '{' => {
                    let close = mirror_bracket(ch);
                    let mut level = 1usize;
                    let mut quote: Option<char> = None;
                    scanner.push(ch, index);
                    while level > 0 && index + 1 < chars.len() {
                        index += 1;
                        let next = chars[index];
                        scanner.push(next, index);
                        match quote {
                            Some(open) if next == open => quote = None,
                            Some(_) => {}
                            None if matches!(next, '\'' | '"') => quote = Some(next),
                            None if next == close => level -= 1,
                            None if next == ch => level += 1,
                            None => {}
                        }
                    }
                }
                ',' => {
                    scanner.finish();
                    if scanner.flag_boundary.is_none() {
                        scanner.flag_boundary = Some(scanner.tokens.len());
                    }
                }
                ch if ch.is_whitespace() => scanner.finish(),
                _ => scanner.push(ch, index),
            }
            index += 1;
        }
        scanner.finish();

        let mut tokens = scanner.tokens;
        let mut token_offsets = scanner.offsets;
        if tokens.is_empty() {
            tokens.push(String::new());
            token_offsets.push(sigil + 1);
        }
        let boundary = scanner.flag_boundary.map(|boundary| boundary.max(1));
        let (flags, flag_offsets) = match boundary {
            Some(boundary) if boundary < tokens.len() => {
                (tokens.split_off(boundary), token_offsets.split_off(boundary))
            }
            _ => (Vec::new(), Vec::new()),
        };

        Some(CommandTokenRecord {
            flag_index: boundary.map(|boundary| boundary.min(tokens.len()) - 1),
            tokens,
            token_offsets,
            flags,
            flag_offsets,
            eol_offset,
            indent: sigil,
            line_number: 0,
            source: line.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct TokenScanner {
    tokens: Vec<String>,
    offsets: Vec<usize>,
    current: String,
    current_start: usize,
    flag_boundary: Option<usize>,
}

impl TokenScanner {
    fn push(&mut self, ch: char, at: usize) {
        if self.current.is_empty() {
            self.current_start = at;
        }
        self.current.push(ch);
    }

    fn finish(&mut self) {
        if !self.current.is_empty() {
            self.tokens.push(std::mem::take(&mut self.current));
            self.offsets.push(self.current_start);
        }
    }
}

fn mirror_bracket(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        other => other,
    }
}

#[cfg(test)]
mod sws_tests {
    use super::*;

    #[test]
    fn quotes_and_brackets_stay_whole() {
        let record = SwsCompiler::parse_line("$speak eirika \"a, b (c\" , flag1")
            .expect("command line should parse");
        assert_eq!(record.tokens, vec!["speak", "eirika", "\"a, b (c\""]);
        assert_eq!(record.token_offsets, vec![1, 7, 14]);
        assert_eq!(record.flag_index, Some(2));
        assert_eq!(record.flags, vec!["flag1"]);
        assert_eq!(record.flag_offsets, vec![26]);
        assert_eq!(record.eol_offset, None);
    }

    #[test]
    fn call_form_is_a_single_token() {
        let record = SwsCompiler::parse_line("    $speak(eirika, \"Hi (there)\"), no_block")
            .expect("command line should parse");
        assert_eq!(record.tokens, vec!["speak(eirika, \"Hi (there)\")"]);
        assert_eq!(record.flags, vec!["no_block"]);
        assert_eq!(record.flag_index, Some(0));
        assert_eq!(record.indent, 4);
    }

    #[test]
    fn hash_ends_the_line_and_unterminated_quotes_run_to_end() {
        let record =
            SwsCompiler::parse_line("    $wait 100 # pause").expect("command line should parse");
        assert_eq!(record.tokens, vec!["wait", "100"]);
        assert_eq!(record.eol_offset, Some(14));

        let record = SwsCompiler::parse_line("$alert 'never closed # still text")
            .expect("command line should parse");
        assert_eq!(record.tokens, vec!["alert", "'never closed # still text"]);
        assert_eq!(record.eol_offset, None);
    }

    #[test]
    fn nested_brackets_and_quoted_closers() {
        let record = SwsCompiler::parse_line("$move_unit Seth (1, [2, ')']) , no_block no_follow")
            .expect("command line should parse");
        assert_eq!(record.tokens, vec!["move_unit", "Seth", "(1, [2, ')'])"]);
        assert_eq!(record.flags, vec!["no_block", "no_follow"]);
    }

    #[test]
    fn compile_replaces_command_lines_in_place() {
        let source = "#pyev1\n$speak(eirika,\"Hello\")\nfor i in range(2):\n    $speak(seth,\"Hi\")\n";
        let compiled = SwsCompiler::new(source).compile_sws();
        compiled.check().expect("placeholders should match records");
        let lines = compiled.source.split('\n').collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], COMMAND_SENTINEL);
        assert_eq!(lines[2], "for i in range(2):");
        assert_eq!(lines[3], format!("    {}", COMMAND_SENTINEL));
        assert_eq!(compiled.records[1].line_number, 4);
        assert_eq!(compiled.records[1].tokens, vec!["speak(seth,\"Hi\")"]);
    }

    #[test]
    fn raw_newlines_are_normalised() {
        let source = format!("#pyev1{}$wait 10", RAW_NEWLINE);
        let compiled = SwsCompiler::new(&source).compile_sws();
        assert_eq!(compiled.records.len(), 1);
        assert_eq!(compiled.records[0].line_number, 2);
    }
}
