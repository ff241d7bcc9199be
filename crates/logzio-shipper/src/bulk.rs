//! Bulk assembly: packing serialized records into size-bounded request bodies.
//!
//! The encoder walks one flush unit from the host, enriches and serializes
//! each record, and yields bulks whose accounted size never exceeds the
//! configured byte ceiling. Records that can never fit are dropped with a
//! warning; per-record serialization failures are skipped. Neither aborts the
//! rest of the flush.

use tracing::warn;

use crate::config::Config;
use crate::enrich::{Enricher, EventTime, Record};
use crate::error::ShipError;
use crate::util::utf8_prefix;

/// One size-bounded batch of serialized records, sent as a single request
/// body.
///
/// `size` is the exact byte length of [`Bulk::body`]: every record after the
/// first is accounted with one extra byte for the `\n` joining delimiter.
#[derive(Debug, Default)]
pub struct Bulk {
    records: Vec<String>,
    size: usize,
}

impl Bulk {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records in the bulk.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Accounted byte size, delimiters included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The newline-joined request body.
    pub fn body(&self) -> String {
        self.records.join("\n")
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }

    pub fn into_records(self) -> Vec<String> {
        self.records
    }

    fn push(&mut self, json: String) {
        self.size += json.len() + usize::from(!self.records.is_empty());
        self.records.push(json);
    }
}

/// Packs one flush unit into bulks under the configured byte ceiling.
#[derive(Debug, Clone)]
pub struct BulkEncoder {
    enricher: Enricher,
    bulk_limit: usize,
    preview_len: Option<usize>,
}

impl BulkEncoder {
    pub fn new(config: &Config) -> Self {
        BulkEncoder {
            enricher: Enricher::new(config),
            bulk_limit: config.bulk_limit,
            preview_len: config.oversized_log_preview_len,
        }
    }

    /// Lazily encodes `chunk` into bulks, in input order.
    ///
    /// The final bulk is yielded even when empty; callers skip empty bulks
    /// before transport.
    pub fn encode<I>(&self, chunk: I) -> Bulks<'_, I::IntoIter>
    where
        I: IntoIterator<Item = (String, EventTime, Record)>,
    {
        Bulks {
            encoder: self,
            input: chunk.into_iter(),
            bulk: Bulk::default(),
            done: false,
        }
    }

    fn serialize(
        &self,
        tag: &str,
        time: EventTime,
        mut record: Record,
    ) -> Result<String, ShipError> {
        self.enricher.enrich(tag, time, &mut record);
        Ok(serde_json::to_string(&record)?)
    }

    fn warn_oversized(&self, json: &str, record_size: usize) {
        let err = ShipError::Oversize {
            size: record_size,
            limit: self.bulk_limit,
        };
        match self.preview_len {
            Some(len) => warn!(
                "{err}; dropping record starting with: {}",
                utf8_prefix(json, len)
            ),
            None => warn!("{err}; dropping record"),
        }
    }
}

/// Lazy bulk sequence over one flush unit.
pub struct Bulks<'a, I> {
    encoder: &'a BulkEncoder,
    input: I,
    bulk: Bulk,
    done: bool,
}

impl<I> Iterator for Bulks<'_, I>
where
    I: Iterator<Item = (String, EventTime, Record)>,
{
    type Item = Bulk;

    fn next(&mut self) -> Option<Bulk> {
        if self.done {
            return None;
        }
        for (tag, time, record) in self.input.by_ref() {
            let json = match self.encoder.serialize(&tag, time, record) {
                Ok(json) => json,
                Err(err) => {
                    warn!("skipping record that failed to serialize: {err}");
                    continue;
                }
            };
            let record_size = json.len() + usize::from(!self.bulk.is_empty());
            if record_size > self.encoder.bulk_limit {
                self.encoder.warn_oversized(&json, record_size);
                continue;
            }
            if self.bulk.size + record_size > self.encoder.bulk_limit {
                let full = std::mem::take(&mut self.bulk);
                // The record opens the next bulk, so it is accounted without
                // a delimiter byte.
                self.bulk.push(json);
                return Some(full);
            }
            self.bulk.push(json);
        }
        self.done = true;
        Some(std::mem::take(&mut self.bulk))
    }
}
