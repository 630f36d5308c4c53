use async_trait::async_trait;
use serde_json::Value;

use crate::models::JobResult;
use crate::CallerResult;

/// Named external reporter of completed job results.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, result: &JobResult) -> CallerResult<()>;
}

/// Channel to the remote controller.
#[async_trait]
pub trait ReturnChannel: Send + Sync {
    async fn send(&self, envelope: &Value) -> CallerResult<()>;

    async fn close(&self) -> CallerResult<()>;
}
