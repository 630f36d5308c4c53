use async_trait::async_trait;

use crate::models::{JobId, JobResult};
use crate::CallerResult;

/// Local, bounded record of completed jobs.
#[async_trait]
pub trait JobCache: Send + Sync {
    /// Best effort: failures are logged by the implementation and reported
    /// as `false`, never raised.
    async fn cache(&self, jid: &JobId, result: &JobResult) -> bool;

    async fn load(&self, jid: &JobId) -> CallerResult<Option<JobResult>>;

    /// Cached job ids, oldest first.
    async fn list(&self) -> CallerResult<Vec<JobId>>;
}
