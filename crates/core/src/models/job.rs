use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Width of the timestamp portion of a job id (`%Y%m%d%H%M%S%6f`).
pub const JID_TIMESTAMP_LEN: usize = 20;

const JID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// Lexically sortable job identifier.
///
/// The first 20 characters are the UTC admission time at microsecond
/// resolution; an optional `_<suffix>` may follow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn from_timestamp(ts: DateTime<Utc>, suffix: Option<&str>) -> Self {
        let mut value = ts.format(JID_TIMESTAMP_FORMAT).to_string();
        if let Some(suffix) = suffix {
            value.push('_');
            value.push_str(suffix);
        }
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Admission time encoded in the id, if it carries a well-formed timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let head = self.0.get(..JID_TIMESTAMP_LEN)?;
        NaiveDateTime::parse_from_str(head, JID_TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// A timestamp, optionally followed by `_` and an alphanumeric suffix.
    /// Only well-formed ids are safe to use as file names.
    pub fn is_well_formed(&self) -> bool {
        if self.timestamp().is_none() {
            return false;
        }
        match &self.0[JID_TIMESTAMP_LEN..] {
            "" => true,
            rest => rest.strip_prefix('_').is_some_and(|suffix| {
                !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric())
            }),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A job as admitted by the caller. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    id: JobId,
    function: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    target_selector: String,
    metadata: Option<Value>,
}

impl JobRequest {
    pub fn new(
        id: JobId,
        function: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        target_selector: impl Into<String>,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            id,
            function: function.into(),
            args,
            kwargs,
            target_selector: target_selector.into(),
            metadata,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn target_selector(&self) -> &str {
        &self.target_selector
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Arguments as reported with a result: positionals, then the keyword
    /// arguments as one trailing mapping tagged with `__kwarg__`.
    pub fn fun_args(&self) -> Vec<Value> {
        let mut out = self.args.clone();
        if !self.kwargs.is_empty() {
            let mut kw = self.kwargs.clone();
            kw.insert("__kwarg__".to_string(), Value::Bool(true));
            out.push(Value::Object(kw));
        }
        out
    }
}
