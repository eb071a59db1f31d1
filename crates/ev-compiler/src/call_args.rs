use ev_core::{
    ArgValue, CallArg, CommandCall, CommandRegistry, CommandTokenRecord, ErrorCode, EventError,
    EventValue,
};
use ev_parser::pyexpr::{is_identifier, split_assignment, split_top_level, to_rhai, unquote};

fn syntax_error(record: &CommandTokenRecord, message: impl Into<String>) -> EventError {
    EventError::new(ErrorCode::InvalidSyntax, message).at("", record.line_number, &record.source)
}

/// Binds a tokenized command line to a call description. Argument values
/// are classified here; their evaluation waits for run time.
pub fn build_call(
    record: &CommandTokenRecord,
    registry: &CommandRegistry,
) -> Result<CommandCall, EventError> {
    let head = record.command_token();
    let (name, args) = match head.find('(') {
        Some(open) => {
            let Some(inner) = head[open + 1..].strip_suffix(')') else {
                return Err(syntax_error(record, format!("malformed command call '{}'", head)));
            };
            if !record.arguments().is_empty() {
                return Err(syntax_error(
                    record,
                    format!("unexpected '{}' after command call", record.arguments()[0]),
                ));
            }
            let name = head[..open].trim();
            (name, call_form_args(record, inner)?)
        }
        None => (head, space_form_args(record)?),
    };
    if !is_identifier(name) {
        return Err(syntax_error(record, format!("invalid command name '{}'", name)));
    }

    let mut call = CommandCall {
        name: name.to_string(),
        command: registry.get(name).map(|descriptor| descriptor.id.clone()),
        args: Vec::new(),
        flags: Vec::new(),
    };
    for arg in args {
        match arg {
            ParsedArg::Flags(flags) => call.flags.extend(flags),
            ParsedArg::Arg(arg) => call.args.push(arg),
        }
    }
    for flag in &record.flags {
        call.flags.push(unquote(flag).unwrap_or_else(|| flag.clone()));
    }
    Ok(call)
}

enum ParsedArg {
    Arg(CallArg),
    Flags(Vec<String>),
}

fn call_form_args(record: &CommandTokenRecord, inner: &str) -> Result<Vec<ParsedArg>, EventError> {
    let mut parsed = Vec::new();
    for piece in split_top_level(inner, ',') {
        if piece.is_empty() {
            return Err(syntax_error(record, "empty argument in command call"));
        }
        match keyword_split(&piece) {
            Some((keyword, value)) if keyword == "flags" => {
                parsed.push(ParsedArg::Flags(flag_list(record, &value)?));
            }
            Some((keyword, value)) => parsed.push(ParsedArg::Arg(CallArg {
                keyword: Some(keyword),
                value: classify(record, &value, true)?,
            })),
            None => parsed.push(ParsedArg::Arg(CallArg {
                keyword: None,
                value: classify(record, &piece, true)?,
            })),
        }
    }
    Ok(parsed)
}

fn space_form_args(record: &CommandTokenRecord) -> Result<Vec<ParsedArg>, EventError> {
    record
        .arguments()
        .iter()
        .map(|token| {
            let (keyword, value) = match keyword_split(token) {
                Some((keyword, value)) => (Some(keyword), value),
                None => (None, token.clone()),
            };
            Ok(ParsedArg::Arg(CallArg {
                keyword,
                value: classify(record, &value, false)?,
            }))
        })
        .collect()
}

/// `Name=value` with a plain `=`; comparisons and augmented operators do not
/// count.
fn keyword_split(piece: &str) -> Option<(String, String)> {
    let assignment = split_assignment(piece)?;
    if assignment.op.is_some() || !is_identifier(&assignment.target) || assignment.value.is_empty() {
        return None;
    }
    Some((assignment.target, assignment.value))
}

fn flag_list(record: &CommandTokenRecord, value: &str) -> Result<Vec<String>, EventError> {
    let Some(inner) = value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .or_else(|| value.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')))
    else {
        return Err(syntax_error(record, "flags must be a list of names"));
    };
    split_top_level(inner, ',')
        .into_iter()
        .map(|item| match unquote(&item) {
            Some(flag) => Ok(flag),
            None if is_identifier(&item) => Ok(item),
            None => Err(syntax_error(record, format!("invalid flag '{}'", item))),
        })
        .collect()
}

/// Quoted text and literals become values; bare words become a variable
/// lookup in the call form and plain text in the space form; anything else is
/// an expression.
fn classify(record: &CommandTokenRecord, text: &str, call_form: bool) -> Result<ArgValue, EventError> {
    let text = text.trim();
    if let Some(value) = unquote(text) {
        return Ok(ArgValue::Literal {
            value: EventValue::String(value),
        });
    }
    if let Some(value) = EventValue::parse_literal(text) {
        return Ok(ArgValue::Literal { value });
    }
    if call_form && is_identifier(text) {
        return Ok(ArgValue::Word {
            name: text.to_string(),
        });
    }
    if !call_form {
        let bracketed = text.starts_with(['(', '[', '{']);
        let quoted = text.starts_with(['\'', '"']) || text.starts_with("f\"") || text.starts_with("f'");
        if !bracketed && !quoted {
            return Ok(ArgValue::Literal {
                value: EventValue::String(text.to_string()),
            });
        }
        if quoted && !text.starts_with('f') && to_rhai(text).is_err() {
            // Unterminated quote: the rest of the line is the text.
            return Ok(ArgValue::Literal {
                value: EventValue::String(text[1..].to_string()),
            });
        }
    }
    let source = to_rhai(text)
        .map_err(|message| syntax_error(record, format!("invalid argument '{}': {}", text, message)))?;
    Ok(ArgValue::Expr { source })
}

#[cfg(test)]
mod call_args_tests {
    use super::*;
    use ev_parser::SwsCompiler;

    fn call(line: &str) -> CommandCall {
        let mut record = SwsCompiler::parse_line(line).expect("command line should tokenize");
        record.line_number = 3;
        build_call(&record, CommandRegistry::builtin()).expect("call should build")
    }

    fn literal(value: impl Into<EventValue>) -> ArgValue {
        ArgValue::Literal {
            value: value.into(),
        }
    }

    #[test]
    fn call_form_classifies_arguments() {
        let call = call("$speak(eirika, \"Hello\", Width=3, Nid=name + '_x', flags=['no_block'])");
        assert_eq!(call.name, "speak");
        assert_eq!(call.command.as_deref(), Some("speak"));
        assert_eq!(call.args.len(), 4);
        assert_eq!(
            call.args[0].value,
            ArgValue::Word {
                name: "eirika".to_string()
            }
        );
        assert_eq!(call.args[1].value, literal("Hello"));
        assert_eq!(call.args[2].keyword.as_deref(), Some("Width"));
        assert_eq!(call.args[2].value, literal(3i64));
        assert!(matches!(
            &call.args[3].value,
            ArgValue::Expr { source } if source == "name + \"_x\""
        ));
        assert_eq!(call.flags, vec!["no_block"]);
    }

    #[test]
    fn space_form_treats_bare_words_as_text() {
        let call = call("$level_var SomeState False");
        assert_eq!(call.args[0].value, literal("SomeState"));
        assert_eq!(call.args[1].value, literal(false));

        let call = self::call("$s Seth 'Hi there' [1, 2], no_block");
        assert_eq!(call.command.as_deref(), Some("speak"));
        assert_eq!(call.args[1].value, literal("Hi there"));
        assert!(matches!(&call.args[2].value, ArgValue::Expr { source } if source == "[1, 2]"));
        assert_eq!(call.flags, vec!["no_block"]);
    }

    #[test]
    fn unknown_commands_still_build() {
        let call = call("$not_a_real_command()");
        assert_eq!(call.command, None);
        assert!(call.args.is_empty());
    }

    #[test]
    fn malformed_calls_are_syntax_errors() {
        let mut record = SwsCompiler::parse_line("$speak(a, b) extra").expect("tokenizes");
        record.line_number = 7;
        let error = build_call(&record, CommandRegistry::builtin()).expect_err("extra token");
        assert_eq!(error.code, ErrorCode::InvalidSyntax);
        assert_eq!(error.line(), Some(7));

        let record = SwsCompiler::parse_line("$speak(a,, b)").expect("tokenizes");
        assert!(build_call(&record, CommandRegistry::builtin()).is_err());
    }
}
