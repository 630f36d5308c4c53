//! Routing of completed job results to sinks, the controller and the local
//! job cache.
//!
//! Every failure here is advisory: it is logged and counted, and never
//! touches the job's own classification.

use std::sync::Arc;

use caller_core::{DeliverySink, JobCache, JobResult, ReturnChannel};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Outcome of sending the result to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOutcome {
    /// Local mode, or no channel configured.
    Skipped,
    Sent,
    Failed,
}

/// What happened to one result on its way out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sinks_delivered: Vec<String>,
    pub sinks_failed: Vec<String>,
    pub remote: RemoteOutcome,
    /// `None` when caching was not attempted.
    pub cached: Option<bool>,
}

impl DeliveryReport {
    fn new() -> Self {
        Self {
            sinks_delivered: Vec::new(),
            sinks_failed: Vec::new(),
            remote: RemoteOutcome::Skipped,
            cached: None,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.sinks_failed.is_empty()
            && self.remote != RemoteOutcome::Failed
            && self.cached != Some(false)
    }
}

/// A configured sink name and the sink it resolved to, if any.
type SinkSlot = (String, Option<Arc<dyn DeliverySink>>);

pub struct DeliveryRouter {
    node_id: String,
    local: bool,
    sinks: Vec<SinkSlot>,
    channel: Option<Arc<dyn ReturnChannel>>,
    cache: Option<Arc<dyn JobCache>>,
}

impl DeliveryRouter {
    /// `local` selects the local job cache over the controller channel.
    pub fn new(node_id: impl Into<String>, local: bool) -> Self {
        Self {
            node_id: node_id.into(),
            local,
            sinks: Vec::new(),
            channel: None,
            cache: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.push((sink.name().to_string(), Some(sink)));
        self
    }

    /// Keep a configured name that resolved to no sink; delivering to it
    /// always counts as a failure.
    pub fn with_unresolved_sink(mut self, name: impl Into<String>) -> Self {
        self.sinks.push((name.into(), None));
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn ReturnChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn JobCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn has_sinks(&self) -> bool {
        !self.sinks.is_empty()
    }

    pub async fn deliver(&self, result: &JobResult) -> DeliveryReport {
        let mut report = DeliveryReport::new();

        for (name, sink) in &self.sinks {
            let outcome = match sink {
                Some(sink) => sink.deliver(result).await.map_err(|e| e.to_string()),
                None => Err("sink is not available".to_string()),
            };
            match outcome {
                Ok(()) => {
                    debug!(jid = %result.jid, sink = %name, "Result delivered");
                    report.sinks_delivered.push(name.clone());
                }
                Err(e) => {
                    error!(jid = %result.jid, sink = %name, "Sink delivery failed: {}", e);
                    counter!("caller_delivery_sink_failures_total", "sink" => name.clone())
                        .increment(1);
                    report.sinks_failed.push(name.clone());
                }
            }
        }

        if self.local {
            if let Some(cache) = &self.cache {
                report.cached = Some(cache.cache(&result.jid, result).await);
            }
        } else {
            report.remote = self.return_to_controller(result).await;
        }

        report
    }

    async fn return_to_controller(&self, result: &JobResult) -> RemoteOutcome {
        let Some(channel) = &self.channel else {
            info!(jid = %result.jid, "No controller channel configured, skipping return");
            return RemoteOutcome::Skipped;
        };

        let outcome = match result.return_envelope(&self.node_id) {
            Ok(envelope) => match channel.send(&envelope).await {
                Ok(()) => {
                    info!(jid = %result.jid, "Result returned to controller");
                    RemoteOutcome::Sent
                }
                Err(e) => {
                    error!(jid = %result.jid, "Failed to return result to controller: {}", e);
                    RemoteOutcome::Failed
                }
            },
            Err(e) => {
                error!(jid = %result.jid, "Failed to build return envelope: {}", e);
                RemoteOutcome::Failed
            }
        };
        if outcome == RemoteOutcome::Failed {
            counter!("caller_delivery_remote_failures_total").increment(1);
        }

        if let Err(e) = channel.close().await {
            warn!("Failed to close controller channel: {}", e);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use caller_core::{CallerError, CallerResult, JobId};
    use serde_json::Value;
    use tracing_test::traced_test;

    struct BrokenSink;

    #[async_trait]
    impl DeliverySink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        async fn deliver(&self, _result: &JobResult) -> CallerResult<()> {
            Err(CallerError::sink("broken", "disk full"))
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<Value>>,
        closed: Mutex<usize>,
        fail: bool,
    }

    #[async_trait]
    impl ReturnChannel for RecordingChannel {
        async fn send(&self, envelope: &Value) -> CallerResult<()> {
            if self.fail {
                return Err(CallerError::Channel("controller unreachable".to_string()));
            }
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn close(&self) -> CallerResult<()> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct MemoryCache {
        cached: Mutex<Vec<JobId>>,
    }

    #[async_trait]
    impl JobCache for MemoryCache {
        async fn cache(&self, jid: &JobId, _result: &JobResult) -> bool {
            self.cached.lock().unwrap().push(jid.clone());
            true
        }

        async fn load(&self, _jid: &JobId) -> CallerResult<Option<JobResult>> {
            Ok(None)
        }

        async fn list(&self) -> CallerResult<Vec<JobId>> {
            Ok(self.cached.lock().unwrap().clone())
        }
    }

    fn result() -> JobResult {
        JobResult::new(JobId::new("20240101000000000001"))
    }

    #[tokio::test]
    async fn test_remote_mode_sends_once_and_skips_cache() {
        let channel = Arc::new(RecordingChannel::default());
        let cache = Arc::new(MemoryCache {
            cached: Mutex::new(Vec::new()),
        });
        let router = DeliveryRouter::new("node-1", false)
            .with_channel(channel.clone())
            .with_cache(cache.clone());

        let report = router.deliver(&result()).await;

        assert_eq!(report.remote, RemoteOutcome::Sent);
        assert_eq!(report.cached, None);
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["cmd"], "_return");
        assert_eq!(sent[0]["id"], "node-1");
        assert_eq!(*channel.closed.lock().unwrap(), 1);
        assert!(cache.cached.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_is_swallowed() {
        let channel = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let router = DeliveryRouter::new("node-1", false).with_channel(channel);
        let report = router.deliver(&result()).await;
        assert_eq!(report.remote, RemoteOutcome::Failed);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_local_mode_caches_without_channel() {
        let channel = Arc::new(RecordingChannel::default());
        let cache = Arc::new(MemoryCache {
            cached: Mutex::new(Vec::new()),
        });
        let router = DeliveryRouter::new("node-1", true)
            .with_channel(channel.clone())
            .with_cache(cache.clone());

        let report = router.deliver(&result()).await;
        assert_eq!(report.remote, RemoteOutcome::Skipped);
        assert_eq!(report.cached, Some(true));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_sink_counts_as_failure() {
        let router = DeliveryRouter::new("node-1", true).with_unresolved_sink("couchbase");
        let report = router.deliver(&result()).await;
        assert_eq!(report.sinks_failed, vec!["couchbase".to_string()]);
        assert_eq!(report.cached, None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sink_failure_is_logged_not_raised() {
        let router = DeliveryRouter::new("node-1", true).with_sink(Arc::new(BrokenSink));
        let report = router.deliver(&result()).await;
        assert_eq!(report.sinks_failed, vec!["broken".to_string()]);
        assert!(logs_contain("Sink delivery failed"));
    }
}
