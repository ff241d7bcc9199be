//! Capability interface for delivery metrics.
//!
//! The shipper reports one observation per completed HTTP exchange, labelled
//! with the status code. The registry behind the counter belongs to the
//! embedding agent; the shipper only depends on the increment capability and
//! receives it by injection, so tests can capture observations with a fake.

/// Sink for status-code observations.
pub trait MetricsSink: Send + Sync {
    /// Increments the delivery counter for one completed HTTP exchange.
    fn record_status(&self, status_code: u16);
}

/// Sink that discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_status(&self, _status_code: u16) {}
}
