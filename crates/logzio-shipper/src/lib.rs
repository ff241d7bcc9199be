//! Bulk shipping core for the Logz.io listener.
//!
//! This crate is the batching/delivery half of a log-forwarding agent: the
//! host's buffering machinery decides *when* to flush and hands over one flush
//! unit of `(tag, time, record)` triples; the shipper does the rest.
//!
//! # Architecture
//!
//! ```text
//!   host flush
//!       │
//!       v
//!   ┌──────────┐   ┌──────────────┐   ┌────────────┐
//!   │  Enrich  │──>│ Bulk encode  │──>│ HTTP POST  │  (per bulk)
//!   └──────────┘   └──────────────┘   └─────┬──────┘
//!                                           │
//!                                           v
//!                                    ┌────────────┐
//!                                    │  Classify  │
//!                                    └─────┬──────┘
//!              2xx: done                   │
//!              retryable: backoff + resend │
//!              400: salvage oversized once │
//!              401: drop, report           │
//! ```
//!
//! # Guarantees
//!
//! - Every bulk body stays under the configured byte ceiling; a record that
//!   can never fit is dropped with a warning, not sent.
//! - [`Shipper::write`] never returns an error and never panics; failures are
//!   absorbed into `tracing` logs and the status-code metric.
//! - Delivery is at-least-once: retried bulks are byte-identical resends with
//!   no deduplication token.
//! - A rejected bulk costs at most `retry_count + 1` requests: the bounded
//!   retry loop plus one salvage resend.

pub mod bulk;
pub mod config;
pub mod delivery;
pub mod enrich;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod salvage;
pub mod shipper;
pub mod transport;
mod util;

pub use config::Config;
pub use enrich::{EventTime, Record};
pub use error::ShipError;
pub use metrics::{MetricsSink, NoopMetrics};
pub use shipper::Shipper;
