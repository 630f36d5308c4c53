//! Built-in delivery sinks.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use caller_core::config::ReturnersConfig;
use caller_core::traits::DeliverySink;
use caller_core::{CallerError, CallerResult, JobResult};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Prints each result to stdout; useful for checking what sinks receive.
pub struct LocalSink;

#[async_trait]
impl DeliverySink for LocalSink {
    fn name(&self) -> &str {
        "local"
    }

    async fn deliver(&self, result: &JobResult) -> CallerResult<()> {
        let line = serde_json::to_string(result)?;
        println!("{line}");
        Ok(())
    }
}

/// Appends one JSON document per job to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeliverySink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, result: &JobResult) -> CallerResult<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CallerError::sink("jsonl", format!("{}: {e}", self.path.display())))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Build the sink registered under `name`, or `None` if there is no such
/// sink or it is not configured.
pub fn create_sink(name: &str, config: &ReturnersConfig) -> Option<Arc<dyn DeliverySink>> {
    match name {
        "local" => {
            info!("Created local sink");
            Some(Arc::new(LocalSink))
        }
        "jsonl" => match &config.jsonl_path {
            Some(path) => {
                info!("Created jsonl sink: {}", path.display());
                Some(Arc::new(JsonlSink::new(path.clone())))
            }
            None => {
                warn!("Sink 'jsonl' requested but returners.jsonl_path is not set");
                None
            }
        },
        other => {
            warn!("Unknown delivery sink '{}'", other);
            None
        }
    }
}
