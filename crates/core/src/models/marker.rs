use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::JobId;

/// On-disk record of a job that is currently executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMarker {
    pub jid: JobId,
    pub pid: u32,
    pub fun: String,
    pub tgt: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ProcessMarker {
    pub fn new(jid: JobId, pid: u32, fun: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            jid,
            pid,
            fun: fun.into(),
            tgt: tgt.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
