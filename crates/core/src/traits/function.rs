//! Function registry interfaces.
//!
//! The registry is an opaque capability lookup: given a dotted function name
//! it hands back something invocable, or a not-found report carrying
//! documentation-based suggestions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::FunctionError;
use crate::models::{BoundArgs, FunctionSignature, OutputFormat};

/// Raw outcome of an invocation.
///
/// `retcode` is the function's explicit out-of-band status; when set it
/// overrides whatever the return value suggests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationOutcome {
    pub value: Value,
    pub retcode: Option<i32>,
}

impl InvocationOutcome {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            retcode: None,
        }
    }

    pub fn with_retcode(mut self, retcode: i32) -> Self {
        self.retcode = Some(retcode);
        self
    }
}

#[async_trait]
pub trait Invocable: Send + Sync {
    /// Dotted name, e.g. `test.ping`.
    fn name(&self) -> &str;

    fn doc(&self) -> Option<&str> {
        None
    }

    fn signature(&self) -> &FunctionSignature;

    /// Output format this function prefers for its results.
    fn outputter(&self) -> Option<OutputFormat> {
        None
    }

    async fn invoke(&self, args: &BoundArgs) -> Result<InvocationOutcome, FunctionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{name}' is not available.")]
pub struct FunctionNotFound {
    pub name: String,
    /// Name to docstring of functions sharing the requested prefix.
    pub suggestions: BTreeMap<String, String>,
    /// Load error recorded for the function's module, if any.
    pub reason: Option<String>,
}

pub trait FunctionRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Invocable>, FunctionNotFound>;

    /// Docstrings of every function whose name starts with `prefix`.
    fn doc_prefix_search(&self, prefix: &str) -> BTreeMap<String, String>;

    fn list_functions(&self) -> Vec<String>;
}
