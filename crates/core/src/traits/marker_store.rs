use async_trait::async_trait;
use serde_json::Value;

use crate::models::{JobId, ProcessMarker};
use crate::CallerResult;

/// What the host knows about the process that owns a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    NotRunning,
    /// Alive, but its command line does not identify it as one of ours
    /// (the pid was recycled).
    Foreign,
    Owned,
}

pub trait ProcessProbe: Send + Sync {
    fn probe(&self, pid: u32) -> ProcessStatus;
}

/// Advisory record of running jobs, shared by unrelated processes on a host.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn create(
        &self,
        jid: &JobId,
        pid: u32,
        fun: &str,
        tgt: &str,
        metadata: Option<&Value>,
    ) -> CallerResult<ProcessMarker>;

    /// Idempotent; a missing marker is not an error.
    async fn delete(&self, jid: &JobId) -> CallerResult<()>;

    /// Live markers only. Stale, foreign or unreadable markers are deleted
    /// as a side effect.
    async fn list(&self) -> CallerResult<Vec<ProcessMarker>>;
}
