//! Subscription confirmation handshake.
//!
//! The notification service only starts delivering after its confirmation
//! URL has been fetched once. Fetching is idempotent on the provider side,
//! so repeated confirmations are harmless. Failures are logged together
//! with the URL so an operator can confirm by hand; they never reach the
//! caller.

use crate::error::Result;
use dashmap::DashSet;
use metrics::counter;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error, info};

/// Default timeout for the confirmation fetch.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Key used in the confirmed set when the envelope names no topic.
const UNKNOWN_TOPIC: &str = "unknown-topic";

/// Completes subscription handshakes.
pub struct SubscriptionConfirmer {
    http_client: reqwest::Client,
    /// Topics whose handshake completed.
    confirmed: DashSet<String>,
}

impl SubscriptionConfirmer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            confirmed: DashSet::new(),
        })
    }

    /// Fetch the confirmation URL once. Returns whether it succeeded; errors
    /// are logged, never propagated.
    pub async fn confirm(&self, topic: Option<&str>, url: &str) -> bool {
        let topic = topic.unwrap_or(UNKNOWN_TOPIC);
        if self.is_confirmed(topic) {
            debug!("Topic {} already confirmed, confirming again", topic);
        }
        info!("Confirming subscription for {} via {}", topic, url);

        match self.fetch(url).await {
            Ok(status) if status.is_success() => {
                self.confirmed.insert(topic.to_string());
                counter!("gateway_handshake_success_total").increment(1);
                info!("Subscription confirmed for {} ({})", topic, status);
                true
            }
            Ok(status) => {
                counter!("gateway_handshake_failure_total").increment(1);
                error!(
                    "Subscription confirmation for {} returned {}. Confirm manually by visiting: {}",
                    topic, status, url
                );
                false
            }
            Err(e) => {
                counter!("gateway_handshake_failure_total").increment(1);
                error!(
                    "Subscription confirmation for {} failed: {}. Confirm manually by visiting: {}",
                    topic, e, url
                );
                false
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<StatusCode> {
        let response = self.http_client.get(url).send().await?;
        Ok(response.status())
    }

    pub fn is_confirmed(&self, topic: &str) -> bool {
        self.confirmed.contains(topic)
    }
}
