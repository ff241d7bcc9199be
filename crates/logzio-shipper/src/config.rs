use std::path::PathBuf;
use std::time::Duration;

use crate::error::ShipError;

/// Default name of the field carrying the fluentd tag on each record.
pub const DEFAULT_TAG_FIELD: &str = "fluentd_tags";

/// Default uncompressed byte ceiling for one bulk request body.
pub const DEFAULT_BULK_LIMIT: usize = 1_000_000;

/// Configuration surface of the shipper.
///
/// The shipper consumes these as already-validated values; parsing them out of
/// a config file or CLI belongs to the embedding agent. [`Config::validate`]
/// only rejects states the pipeline cannot operate under at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bulk intake endpoint, shipping token embedded in the query string
    /// (e.g. `https://listener.logz.io:8071/?token=...`).
    pub endpoint_url: String,
    /// Stamp records with an `@timestamp` field when absent.
    pub include_time: bool,
    /// Stamp records with the tag field when absent.
    pub include_tags: bool,
    /// Name of the tag field written by enrichment.
    pub tag_field: String,
    /// Total delivery attempts per bulk, including the first.
    pub retry_count: u32,
    /// Sleep before the first retry; doubles after every retryable failure.
    pub retry_sleep: Duration,
    /// Uncompressed byte ceiling for one bulk body.
    pub bulk_limit: usize,
    /// When set, oversized-record warnings include this many leading bytes of
    /// the serialized record; unset keeps the warning to sizes only.
    pub oversized_log_preview_len: Option<usize>,
    /// Gzip the request body (`Content-Encoding: gzip`).
    pub gzip: bool,
    /// How long pooled connections may sit idle before being closed.
    pub idle_timeout: Duration,
    /// Outbound proxy URI, applied once at transport construction.
    pub proxy_uri: Option<String>,
    /// Extra root certificate (PEM file) for the proxy or a private listener.
    pub proxy_cert: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint_url: String::new(),
            include_time: true,
            include_tags: true,
            tag_field: DEFAULT_TAG_FIELD.to_string(),
            retry_count: 4,
            retry_sleep: Duration::from_secs(2),
            bulk_limit: DEFAULT_BULK_LIMIT,
            oversized_log_preview_len: None,
            gzip: false,
            idle_timeout: Duration::from_secs(5),
            proxy_uri: None,
            proxy_cert: None,
        }
    }
}

impl Config {
    /// Default configuration pointed at `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Config {
            endpoint_url: endpoint_url.into(),
            ..Config::default()
        }
    }

    /// Rejects configurations the pipeline cannot run under.
    pub fn validate(&self) -> Result<(), ShipError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ShipError::InvalidConfig(
                "endpoint URL cannot be empty".to_string(),
            ));
        }
        if self.bulk_limit == 0 {
            return Err(ShipError::InvalidConfig(
                "bulk limit must be greater than 0".to_string(),
            ));
        }
        if self.retry_count == 0 {
            return Err(ShipError::InvalidConfig(
                "retry count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
