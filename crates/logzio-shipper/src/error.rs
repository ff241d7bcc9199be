/// Failures that can occur while encoding and shipping bulks.
///
/// None of these ever crosses the [`crate::Shipper::write`] boundary; they are
/// absorbed into logs and the status-code metric so the host's own retry
/// machinery is not triggered a second time.
#[derive(Debug, thiserror::Error)]
pub enum ShipError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record of {size} bytes exceeds the bulk limit of {limit} bytes")]
    Oversize { size: usize, limit: usize },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bulk not delivered after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}
