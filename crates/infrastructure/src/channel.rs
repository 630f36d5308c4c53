use std::time::Duration;

use async_trait::async_trait;
use caller_core::traits::ReturnChannel;
use caller_core::{CallerError, CallerResult};
use serde_json::Value;
use tracing::{debug, error};

/// Return channel that POSTs envelopes to the controller over HTTP.
pub struct HttpReturnChannel {
    url: String,
    http_client: reqwest::Client,
}

impl HttpReturnChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> CallerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallerError::Channel(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReturnChannel for HttpReturnChannel {
    async fn send(&self, envelope: &Value) -> CallerResult<()> {
        match self.http_client.post(&self.url).json(envelope).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    debug!("Returned job data to {}", self.url);
                    Ok(())
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    error!("Controller rejected job return: HTTP {} - {}", status, body);
                    Err(CallerError::Channel(format!(
                        "Job return failed: HTTP {status} - {body}"
                    )))
                }
            }
            Err(e) => {
                error!("Failed to reach controller at {}: {}", self.url, e);
                Err(CallerError::Channel(format!("Controller connection error: {e}")))
            }
        }
    }

    async fn close(&self) -> CallerResult<()> {
        // Connections are pooled by reqwest and released on drop.
        Ok(())
    }
}
