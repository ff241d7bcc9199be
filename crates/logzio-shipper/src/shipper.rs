//! The write entry point: one flush unit in, bulks shipped in order, every
//! failure absorbed.

use std::sync::Arc;

use tracing::{debug, error};

use crate::bulk::{Bulk, BulkEncoder};
use crate::config::Config;
use crate::delivery::{deliver, DeliveryOutcome, RetryPolicy};
use crate::enrich::{EventTime, Record};
use crate::error::ShipError;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::salvage;
use crate::transport::Transport;

/// Ships flush units from the host to the listener.
///
/// Cheap to clone; clones share the transport's connection pool. Safe to call
/// concurrently from independent tasks: each `write` call exclusively owns its
/// input and bulks, and nothing else is mutable across calls.
///
/// Delivery is at-least-once: a retried bulk is a byte-identical resend, and
/// the listener may observe the same bytes twice when a response was lost
/// after it had already accepted them.
#[derive(Clone)]
pub struct Shipper {
    encoder: BulkEncoder,
    transport: Transport,
    policy: RetryPolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl Shipper {
    /// Builds a shipper that discards metrics observations.
    pub fn new(config: Config) -> Result<Self, ShipError> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Builds a shipper reporting status-code observations to `metrics`.
    pub fn with_metrics(
        config: Config,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ShipError> {
        config.validate()?;
        Ok(Shipper {
            encoder: BulkEncoder::new(&config),
            transport: Transport::new(&config),
            policy: RetryPolicy::new(&config),
            metrics,
        })
    }

    /// Ships one flush unit.
    ///
    /// Bulks are sent in encoding order; a failed bulk never blocks the ones
    /// after it. Returns nothing and never panics: every delivery failure is
    /// absorbed into logs and metrics so the host's own buffering is not
    /// triggered a second time.
    pub async fn write<I>(&self, chunk: I)
    where
        I: IntoIterator<Item = (String, EventTime, Record)>,
    {
        for bulk in self.encoder.encode(chunk) {
            if bulk.is_empty() {
                continue;
            }
            self.ship_bulk(bulk).await;
        }
    }

    async fn ship_bulk(&self, bulk: Bulk) {
        debug!(
            "shipping bulk of {} records ({} bytes)",
            bulk.len(),
            bulk.size()
        );
        let body = bulk.body();
        match deliver(&self.transport, self.metrics.as_ref(), &self.policy, &body).await {
            DeliveryOutcome::Success(status) => {
                debug!("listener accepted bulk with HTTP {status}");
            }
            DeliveryOutcome::Unauthorized => {
                error!(
                    "not authorized by the listener, check the shipping token; dropping {} records",
                    bulk.len()
                );
            }
            DeliveryOutcome::Rejected { body: response } => {
                salvage::handle_rejection(
                    &self.transport,
                    self.metrics.as_ref(),
                    bulk.into_records(),
                    &response,
                )
                .await;
            }
            // Attempts exhausted; deliver already logged the bulk body.
            DeliveryOutcome::Retryable(_) => {}
        }
    }
}
