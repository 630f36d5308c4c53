use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::FunctionError;
use crate::models::{BoundArgs, JobId};
use crate::traits::{Invocable, InvocationOutcome};

/// Job context handed to every executor in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionData {
    pub jid: JobId,
    pub fun: String,
    pub arg: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub executor_opts: Option<Value>,
}

/// A strategy for invoking a resolved function.
///
/// Returning `Ok(None)` passes the call on to the next executor in the chain.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(
        &self,
        function: Arc<dyn Invocable>,
        args: &BoundArgs,
        data: &ExecutionData,
    ) -> Result<Option<InvocationOutcome>, FunctionError>;
}
