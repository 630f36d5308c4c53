//! Rendering of job results on stdout.

use caller_core::{JobResult, OutputFormat};
use caller_worker::CallError;
use serde_json::{Map, Value};

const INDENT: usize = 4;

/// Render `result` the way the command line shows it.
///
/// The payload is the return value, or the whole result with
/// `print_metadata`, keyed under `local`. `format` overrides the format
/// the function asked for.
pub fn render_result(
    result: &JobResult,
    format: Option<OutputFormat>,
    print_metadata: bool,
) -> String {
    let payload = if print_metadata {
        serde_json::to_value(result).unwrap_or_else(|_| result.return_value.clone())
    } else {
        result.return_value.clone()
    };

    let mut wrapped = Map::new();
    wrapped.insert("local".to_string(), payload);
    render(&Value::Object(wrapped), format.unwrap_or(result.output_format))
}

/// Text written to stderr when a call fails.
///
/// Not-found errors list the closest documented functions. With `detail`,
/// usage and execution errors are followed by their diagnostic record.
pub fn render_call_error(err: &CallError, detail: bool) -> String {
    let mut out = format!("{err}\n");
    match err {
        CallError::NotFound { suggestions, .. } if !suggestions.is_empty() => {
            let docs: Map<String, Value> = suggestions
                .iter()
                .map(|(name, doc)| (name.clone(), Value::String(doc.clone())))
                .collect();
            out.push_str(&render(&Value::Object(docs), OutputFormat::Nested));
        }
        CallError::Usage { .. } | CallError::Execution { .. } if detail => {
            out.push_str(&render(&err.detail(), OutputFormat::Nested));
        }
        _ => {}
    }
    out
}

pub fn render(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Nested => {
            let mut out = String::new();
            nested(value, 0, &mut out);
            out
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        OutputFormat::Txt => txt(value),
        OutputFormat::Quiet => String::new(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn push_line(out: &mut String, indent: usize, text: &str) {
    for line in text.lines() {
        out.push_str(&" ".repeat(indent));
        out.push_str(line);
        out.push('\n');
    }
    if text.is_empty() {
        out.push_str(&" ".repeat(indent));
        out.push('\n');
    }
}

fn nested(value: &Value, indent: usize, out: &mut String) {
    match value {
        Value::Object(map) => {
            if indent > 0 {
                push_line(out, indent, "----------");
            }
            for (key, item) in map {
                push_line(out, indent, &format!("{key}:"));
                nested(item, indent + INDENT, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_container(item) {
                    push_line(out, indent, "|_");
                    nested(item, indent + 2, out);
                } else {
                    push_line(out, indent, &format!("- {}", scalar(item)));
                }
            }
        }
        other => push_line(out, indent, &scalar(other)),
    }
}

fn txt(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| match item {
                Value::String(s) => format!("{key}: {s}\n"),
                other => format!("{key}: {other}\n"),
            })
            .collect(),
        other => format!("{}\n", scalar(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caller_core::JobId;
    use serde_json::json;

    fn result(value: Value) -> JobResult {
        let mut result = JobResult::new(JobId::new("20240101000000000001"));
        result.return_value = value;
        result
    }

    #[test]
    fn test_nested_scalar() {
        let out = render_result(&result(json!(true)), None, false);
        assert_eq!(out, "local:\n    True\n");
    }

    #[test]
    fn test_nested_mapping_and_list() {
        let out = render_result(&result(json!({"pkgs": ["vim", "git"]})), None, false);
        assert_eq!(
            out,
            "local:\n    ----------\n    pkgs:\n        - vim\n        - git\n"
        );
    }

    #[test]
    fn test_json_and_quiet() {
        let out = render_result(&result(json!(1)), Some(OutputFormat::Json), false);
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!({"local": 1}));
        assert!(render_result(&result(json!(1)), Some(OutputFormat::Quiet), false).is_empty());
    }

    #[test]
    fn test_txt_uses_function_outputter() {
        let mut r = result(json!("line one"));
        r.output_format = OutputFormat::Txt;
        assert_eq!(render_result(&r, None, false), "local: line one\n");
    }

    #[test]
    fn test_call_error_detail_only_when_verbose() {
        let err = CallError::Usage {
            fun: "test.echo".to_string(),
            message: "missing required argument: 'text'".to_string(),
            usage: None,
        };
        let quiet = render_call_error(&err, false);
        assert_eq!(
            quiet,
            "Passed invalid arguments: missing required argument: 'text'.\n"
        );

        let verbose = render_call_error(&err, true);
        assert!(verbose.starts_with(&quiet));
        assert!(verbose.contains("error_kind:\n    invalid_arguments\n"));
        assert!(verbose.contains("phase:\n    USAGE_ERROR_EXIT\n"));
    }

    #[test]
    fn test_not_found_lists_suggestions() {
        let mut suggestions = std::collections::BTreeMap::new();
        suggestions.insert("test.ping".to_string(), "Return true.".to_string());
        let err = CallError::NotFound {
            fun: "test.pong".to_string(),
            suggestions,
            reason: None,
        };
        assert_eq!(
            render_call_error(&err, true),
            "'test.pong' is not available.\ntest.ping:\n    Return true.\n"
        );
    }

    #[test]
    fn test_print_metadata_includes_retcode() {
        let out = render_result(&result(json!(true)), Some(OutputFormat::Json), true);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["local"]["retcode"], json!(0));
        assert_eq!(value["local"]["return"], json!(true));
    }
}
