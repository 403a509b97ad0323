//! Tier-change notification dispatch
//!
//! Delivers tier-change callbacks to the downstream automation endpoint.
//! Dispatch is fire-and-forget and strictly outside the apply_event
//! transaction boundary: a delivery failure is logged and retried here, never
//! surfaced to the scoring operation. Delivery is at-least-once; the consumer
//! deduplicates on `triggeringEventId`.

use lsq_common::model::TierChange;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// HTTP client for the tier-change callback endpoint
pub struct NotificationDispatcher {
    http_client: reqwest::Client,
    /// None disables dispatch (no endpoint configured)
    endpoint: Option<String>,
}

impl NotificationDispatcher {
    pub fn new(endpoint: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self {
            http_client,
            endpoint,
        }
    }

    /// Dispatch a tier change asynchronously
    ///
    /// Spawns a delivery task and returns immediately; the caller's
    /// transaction has already committed by the time this runs.
    pub fn dispatch(self: &Arc<Self>, change: TierChange) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.deliver_with_retry(change).await;
        });
    }

    async fn deliver_with_retry(&self, change: TierChange) {
        let Some(endpoint) = self.endpoint.as_deref() else {
            debug!(
                lead_id = %change.lead_id,
                "No notification endpoint configured, skipping tier-change dispatch"
            );
            return;
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self.deliver(endpoint, &change).await {
                Ok(()) => {
                    info!(
                        lead_id = %change.lead_id,
                        from_tier = %change.from_tier,
                        to_tier = %change.to_tier,
                        "Delivered tier-change notification"
                    );
                    return;
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        lead_id = %change.lead_id,
                        attempt,
                        "Tier-change delivery failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        lead_id = %change.lead_id,
                        triggering_event_id = %change.triggering_event_id,
                        "Tier-change delivery failed after {} attempts: {}",
                        MAX_ATTEMPTS,
                        e
                    );
                }
            }
        }
    }

    async fn deliver(&self, endpoint: &str, change: &TierChange) -> Result<(), String> {
        let response = self
            .http_client
            .post(endpoint)
            .json(change)
            .send()
            .await
            .map_err(|e| format!("network error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("endpoint returned {}: {}", status, body));
        }
        Ok(())
    }
}
