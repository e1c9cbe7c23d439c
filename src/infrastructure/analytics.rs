use async_trait::async_trait;
use tracing::{debug, warn};

use super::psp::http_client;
use crate::domain::ports::AnalyticsSink;
use crate::domain::psp::PurchaseEvent;
use crate::error::Result;

/// Posts purchase events to an analytics collector, fire-and-forget: the
/// send happens on a detached task and failures are logged, never
/// propagated into the payment path.
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalyticsSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn record_purchase(&self, event: PurchaseEvent) -> Result<()> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            match client.post(&endpoint).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(transaction_ref = %event.transaction_ref, "purchase event emitted");
                }
                Ok(response) => warn!(
                    transaction_ref = %event.transaction_ref,
                    status = %response.status(),
                    "analytics collector rejected purchase event"
                ),
                Err(err) => warn!(
                    transaction_ref = %event.transaction_ref,
                    %err,
                    "purchase event emission failed"
                ),
            }
        });
        Ok(())
    }
}

/// Sink for deployments without an analytics collector.
pub struct NoopAnalyticsSink;

#[async_trait]
impl AnalyticsSink for NoopAnalyticsSink {
    async fn record_purchase(&self, event: PurchaseEvent) -> Result<()> {
        debug!(transaction_ref = %event.transaction_ref, "purchase event discarded (no collector)");
        Ok(())
    }
}
