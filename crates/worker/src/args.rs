//! Conversion of command-line tokens into call arguments.

use serde_json::{Map, Value};

/// Positional and keyword arguments parsed from raw tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

/// Split `tokens` into positional and `key=value` keyword arguments.
///
/// Values are read as JSON when they parse, otherwise kept as strings.
/// Keys listed in `no_parse` always keep their raw string value.
pub fn parse_input<S: AsRef<str>>(tokens: &[S], no_parse: &[String]) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();

    for token in tokens {
        let token = token.as_ref();
        match split_kwarg(token) {
            Some((key, raw)) => {
                let value = if no_parse.iter().any(|k| k == key) {
                    Value::String(raw.to_string())
                } else {
                    parse_value(raw)
                };
                parsed.kwargs.insert(key.to_string(), value);
            }
            None => parsed.args.push(parse_value(token)),
        }
    }

    parsed
}

/// `key=value` where the key looks like an identifier.
fn split_kwarg(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((key, value))
    } else {
        None
    }
}

pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
