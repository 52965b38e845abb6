//! Outbound webhook delivery.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    classify::{EventSink, NormalizedEvent},
};

/// Result of one delivery, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub attempts: u32,
    pub delivered: bool,
}

/// Posts normalized events to a single configured endpoint.
pub struct WebhookDispatcher {
    http: reqwest::Client,
    url: Option<String>,
    max_attempts: u32,
}

impl WebhookDispatcher {
    /// `max_attempts` counts the first call; values below 1 count as 1.
    pub fn new(url: Option<String>, max_attempts: u32, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::delivery)?;
        Ok(Self {
            http,
            url,
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn post(&self, url: &str, body: &Value) -> Result<()> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::delivery)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::delivery(format!("endpoint returned {status}")));
        }
        Ok(())
    }

    /// Post `body`, retrying unconditionally up to the attempt bound.
    /// Failures are logged and swallowed.
    pub async fn send(&self, body: &Value) -> DeliveryOutcome {
        let Some(url) = self.url.as_deref() else {
            debug!("no webhook url configured, skipping delivery");
            return DeliveryOutcome {
                attempts: 0,
                delivered: false,
            };
        };

        for attempt in 1..=self.max_attempts {
            match self.post(url, body).await {
                Ok(()) => {
                    debug!(attempt, "webhook delivered");
                    return DeliveryOutcome {
                        attempts: attempt,
                        delivered: true,
                    };
                },
                Err(e) => {
                    debug!(attempt, error = %e, "webhook attempt failed");
                },
            }
        }

        warn!(
            attempts = self.max_attempts,
            "webhook delivery failed, dropping event"
        );
        DeliveryOutcome {
            attempts: self.max_attempts,
            delivered: false,
        }
    }
}

#[async_trait]
impl EventSink for WebhookDispatcher {
    async fn deliver(&self, event: NormalizedEvent) {
        let outcome = self.send(&event.webhook_body()).await;
        if !outcome.delivered && outcome.attempts > 0 {
            debug!(
                session_id = %event.session_id,
                message_type = event.message_type.key(),
                "inbound message not delivered"
            );
        }
    }
}
