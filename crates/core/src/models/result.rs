use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CallerError;
use crate::models::JobId;

/// How a result is rendered on the standard output channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Nested,
    Json,
    Txt,
    Quiet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Nested => "nested",
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
            OutputFormat::Quiet => "quiet",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = CallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nested" => Ok(OutputFormat::Nested),
            "json" => Ok(OutputFormat::Json),
            "txt" | "text" => Ok(OutputFormat::Txt),
            "quiet" => Ok(OutputFormat::Quiet),
            _ => Err(CallerError::config_error(format!(
                "Invalid output format: {s}"
            ))),
        }
    }
}

/// Why a job did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FunctionNotFound,
    InvalidArguments,
    CommandExecution,
    CommandNotFound,
    /// The function ran and reported failure through its return value or retcode.
    ReturnedFailure,
}

/// Outcome of one job.
///
/// Built up by the caller phase by phase and handed to delivery by
/// reference once classification is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub jid: JobId,
    #[serde(rename = "return")]
    pub return_value: Value,
    pub retcode: i32,
    #[serde(rename = "out")]
    pub output_format: OutputFormat,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Node id; only attached when the result leaves the local process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fun: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fun_args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tgt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl JobResult {
    pub fn new(jid: JobId) -> Self {
        Self {
            jid,
            return_value: Value::Null,
            retcode: crate::exit_codes::EX_OK,
            output_format: OutputFormat::default(),
            success: true,
            error_kind: None,
            id: None,
            fun: None,
            fun_args: None,
            tgt: None,
            metadata: None,
        }
    }

    pub fn has_job_metadata(&self) -> bool {
        self.id.is_some() && self.fun.is_some()
    }

    /// Envelope sent to the controller: every result field plus
    /// `cmd: "_return"`, the node id, and the placeholder `jid: "req"`.
    pub fn return_envelope(&self, node_id: &str) -> Result<Value, CallerError> {
        let mut load = Map::new();
        load.insert("cmd".to_string(), Value::String("_return".to_string()));

        if let Value::Object(fields) = serde_json::to_value(self)? {
            for (key, value) in fields {
                load.insert(key, value);
            }
        }

        load.insert("id".to_string(), Value::String(node_id.to_string()));
        load.insert("jid".to_string(), Value::String("req".to_string()));
        Ok(Value::Object(load))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Txt);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_result_serializes_return_key() {
        let mut result = JobResult::new(JobId::new("20240101000000000001"));
        result.return_value = json!(true);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["return"], json!(true));
        assert_eq!(value["out"], json!("nested"));
        assert!(value.get("error_kind").is_none());
        assert!(value.get("fun").is_none());
    }

    #[test]
    fn test_return_envelope_fields() {
        let mut result = JobResult::new(JobId::new("20240101000000000001"));
        result.return_value = json!({"a": 1});
        result.fun = Some("test.ping".to_string());
        result.id = Some("ignored".to_string());

        let envelope = result.return_envelope("node-1").unwrap();
        assert_eq!(envelope["cmd"], json!("_return"));
        assert_eq!(envelope["id"], json!("node-1"));
        assert_eq!(envelope["jid"], json!("req"));
        assert_eq!(envelope["fun"], json!("test.ping"));
        assert_eq!(envelope["retcode"], json!(0));
        assert_eq!(envelope["return"], json!({"a": 1}));
    }
}
