//! Record enrichment: timestamp and tag stamping before serialization.

use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Number, Value};

use crate::config::Config;

/// A single log record: an ordered mapping of string keys to JSON values.
///
/// Records are mutated in place by enrichment and never touched again once
/// serialized.
pub type Record = Map<String, Value>;

/// Field enrichment stamps with the event time.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Event timestamp as handed over by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTime {
    /// Plain fractional seconds since the Unix epoch.
    Seconds(f64),
    /// Integer seconds plus nanoseconds, as fluentd's event time carries them.
    Precise { secs: i64, nanos: u32 },
}

impl EventTime {
    /// Fractional seconds since the epoch; `secs + nanos / 1e9` for the
    /// structured form.
    pub fn as_secs_f64(self) -> f64 {
        match self {
            EventTime::Seconds(secs) => secs,
            EventTime::Precise { secs, nanos } => secs as f64 + f64::from(nanos) / 1e9,
        }
    }

    fn split(self) -> (i64, u32) {
        match self {
            EventTime::Precise { secs, nanos } => (secs, nanos),
            EventTime::Seconds(secs) => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9).round() as u32;
                (whole as i64, nanos.min(999_999_999))
            }
        }
    }
}

impl From<f64> for EventTime {
    fn from(secs: f64) -> Self {
        EventTime::Seconds(secs)
    }
}

/// Stamps records with `@timestamp` and the tag field, set-if-absent only.
///
/// Enrichment never fails: a timestamp that cannot be rendered falls back to
/// the raw numeric seconds value.
#[derive(Debug, Clone)]
pub struct Enricher {
    include_time: bool,
    include_tags: bool,
    tag_field: String,
}

impl Enricher {
    pub fn new(config: &Config) -> Self {
        Enricher {
            include_time: config.include_time,
            include_tags: config.include_tags,
            tag_field: config.tag_field.clone(),
        }
    }

    pub fn enrich(&self, tag: &str, time: EventTime, record: &mut Record) {
        if self.include_time && !record.contains_key(TIMESTAMP_FIELD) {
            if let Some(stamp) = timestamp_value(time) {
                record.insert(TIMESTAMP_FIELD.to_string(), stamp);
            }
        }
        if self.include_tags && !record.contains_key(&self.tag_field) {
            record.insert(self.tag_field.clone(), Value::String(tag.to_owned()));
        }
    }
}

/// ISO-8601 with millisecond precision, UTC; out-of-range times degrade to the
/// numeric seconds value.
fn timestamp_value(time: EventTime) -> Option<Value> {
    let (secs, nanos) = time.split();
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .or_else(|| Number::from_f64(time.as_secs_f64()).map(Value::Number))
}
