//! Turns a raw invocation outcome into a retcode and success flag.

use caller_core::exit_codes::{EX_GENERIC, EX_OK};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retcode: i32,
    pub success: bool,
}

/// Keys of a returned mapping that report the function's own verdict.
const VERDICT_KEYS: [&str; 2] = ["result", "success"];

/// Classify `raw`, honouring an explicit retcode from the function first.
///
/// Mappings carrying `result`/`success` succeed only if every present key is
/// truthy; anything else succeeds by default.
pub fn classify(raw: &Value, side_channel_retcode: Option<i32>) -> Classification {
    if let Some(retcode) = side_channel_retcode {
        return Classification {
            retcode,
            success: retcode == EX_OK,
        };
    }

    let verdict = match raw {
        Value::Object(map) => VERDICT_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .all(is_truthy),
        _ => true,
    };

    if verdict {
        Classification {
            retcode: EX_OK,
            success: true,
        }
    } else {
        Classification {
            retcode: EX_GENERIC,
            success: false,
        }
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
