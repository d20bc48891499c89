//! Best-effort terminal-state webhooks
//!
//! Delivery is fire-and-forget: it runs on a detached task, retries a short
//! fixed ladder, and never feeds back into job state. A job is `done` or
//! `error` regardless of whether its callback could be reached.

use std::sync::Arc;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::types::event::JobEvent;

/// Error type for webhook delivery failures
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// Delivers terminal job events to caller-supplied callback URLs
pub struct WebhookNotifier {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        let retry_delays = config
            .retry_delays_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();
        Self {
            client,
            retry_delays,
        }
    }

    /// Spawn a detached delivery of the terminal event
    pub fn notify_detached(self: &Arc<Self>, url: String, event: JobEvent) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&url, &event).await {
                tracing::warn!(
                    job_id = %event.job_id(),
                    url,
                    error = %e,
                    "Webhook delivery gave up"
                );
            }
        });
    }

    /// Deliver the payload with the configured retry ladder
    pub async fn deliver(&self, url: &str, event: &JobEvent) -> Result<(), WebhookError> {
        let mut last_err: Option<WebhookError> = None;

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(url, event).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff
        match self.try_send(url, event).await {
            Ok(()) => Ok(()),
            Err(e) => Err(last_err.unwrap_or(e)),
        }
    }

    /// Execute a single POST and check the response status
    async fn try_send(&self, url: &str, event: &JobEvent) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}
