//! Best-effort repair of a bulk the listener rejected with HTTP 400.
//!
//! The rejection body reports how many lines were malformed and how many were
//! oversized. Oversized records are identified locally by serialized size,
//! their message field is cut down, and the repaired subset is resent exactly
//! once, never retried or salvaged again, so one rejected bulk costs at
//! most one extra request. Malformed lines cannot be identified from the
//! response and are only surfaced for the operator.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::delivery::{classify, DeliveryOutcome};
use crate::enrich::Record;
use crate::metrics::MetricsSink;
use crate::transport::Transport;
use crate::util::truncate_utf8;

/// Serialized size at which a record is assumed to be one of the lines the
/// listener flagged as oversized.
pub const OVERSIZED_BYTES_THRESHOLD: usize = 32_000;

/// Field whose value is cut down when repairing an oversized record.
const MESSAGE_FIELD: &str = "message";

/// Per-reason line counts parsed from a 400 response body.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RejectionReport {
    pub malformed_lines: u64,
    pub oversized_lines: u64,
}

impl RejectionReport {
    /// Parses a rejection body; absent fields and unreadable bodies count as
    /// zero reported lines.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|err| {
            debug!("could not parse rejection body {body:?}: {err}");
            RejectionReport::default()
        })
    }
}

/// Handles one rejected bulk: reports the counts, truncates the oversized
/// records, and resends the salvaged subset once.
pub async fn handle_rejection(
    transport: &Transport,
    metrics: &dyn MetricsSink,
    records: Vec<String>,
    response_body: &str,
) {
    let report = RejectionReport::parse(response_body);
    warn!(
        "listener rejected bulk of {} records: {} malformed, {} oversized",
        records.len(),
        report.malformed_lines,
        report.oversized_lines
    );
    if report.malformed_lines > 0 {
        // Not repairable: the response does not say which lines they were.
        warn!(
            "{} malformed records were dropped by the listener and cannot be resent",
            report.malformed_lines
        );
    }
    if report.oversized_lines == 0 {
        return;
    }

    let salvaged = truncate_oversized(&records, report.oversized_lines);
    if salvaged.is_empty() {
        return;
    }

    // One shot: a salvage bulk is never retried or salvaged again.
    let outcome = classify(transport.send(&salvaged.join("\n")).await);
    if let Some(status) = outcome.status() {
        metrics.record_status(status);
    }
    match outcome {
        DeliveryOutcome::Success(status) => {
            info!(
                "resent {} truncated records, listener answered HTTP {status}",
                salvaged.len()
            );
        }
        outcome => {
            error!(
                "failed to resend {} truncated records: {outcome:?}",
                salvaged.len()
            );
        }
    }
}

/// Truncates the message field of up to `reported` records whose serialized
/// form is at or above [`OVERSIZED_BYTES_THRESHOLD`], in bulk order.
fn truncate_oversized(records: &[String], reported: u64) -> Vec<String> {
    let mut remaining = reported;
    let mut salvaged = Vec::new();
    for json in records {
        if remaining == 0 {
            break;
        }
        if json.len() < OVERSIZED_BYTES_THRESHOLD {
            continue;
        }
        let mut record: Record = match serde_json::from_str(json) {
            Ok(record) => record,
            Err(err) => {
                warn!("could not re-read oversized record: {err}");
                continue;
            }
        };
        match record.get_mut(MESSAGE_FIELD) {
            Some(Value::String(message)) => {
                truncate_utf8(message, OVERSIZED_BYTES_THRESHOLD - 1);
            }
            _ => {
                warn!("oversized record has no string {MESSAGE_FIELD:?} field to truncate");
                continue;
            }
        }
        match serde_json::to_string(&record) {
            Ok(truncated) => {
                salvaged.push(truncated);
                remaining -= 1;
            }
            Err(err) => warn!("could not re-serialize truncated record: {err}"),
        }
    }
    salvaged
}
