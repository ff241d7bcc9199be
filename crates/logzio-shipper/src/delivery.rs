//! Delivery outcome classification and the bounded retry loop.
//!
//! Every transport result maps through [`classify`] into a [`DeliveryOutcome`]
//! so that status handling is a total function instead of error-driven control
//! flow. [`deliver`] drives one bulk to a final outcome: an immutable
//! [`RetryPolicy`] plus a [`RetryState`] threaded through each iteration, with
//! the sleep doubling after every retryable failure.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ShipError;
use crate::metrics::MetricsSink;
use crate::transport::{Transport, TransportResponse};

/// Classified result of one delivery attempt.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// 2xx: the listener accepted the bulk.
    Success(u16),
    /// Any other status, or a connection-level failure (carrying no status).
    /// Worth another attempt.
    Retryable(Option<u16>),
    /// 400: the listener rejected the payload; resending the same bytes can
    /// never succeed, but a subset may be salvageable.
    Rejected { body: String },
    /// 401: the shipping token is not valid; retrying is pointless.
    Unauthorized,
}

impl DeliveryOutcome {
    /// Status code of the completed HTTP exchange, if one happened.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryOutcome::Success(status) => Some(*status),
            DeliveryOutcome::Retryable(status) => *status,
            DeliveryOutcome::Rejected { .. } => Some(400),
            DeliveryOutcome::Unauthorized => Some(401),
        }
    }
}

/// Total mapping from a transport result to its outcome, in priority order:
/// 2xx, 401, 400, everything else retryable.
pub fn classify(result: Result<TransportResponse, ShipError>) -> DeliveryOutcome {
    match result {
        Ok(response) => match response.status {
            status @ 200..=299 => DeliveryOutcome::Success(status),
            401 => DeliveryOutcome::Unauthorized,
            400 => DeliveryOutcome::Rejected {
                body: response.body,
            },
            status => DeliveryOutcome::Retryable(Some(status)),
        },
        Err(err) => {
            debug!("transport failure treated as retryable: {err}");
            DeliveryOutcome::Retryable(None)
        }
    }
}

/// Immutable backoff parameters shared by every bulk a shipper sends.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_sleep: Duration,
    multiplier: u32,
}

impl RetryPolicy {
    pub fn new(config: &Config) -> Self {
        RetryPolicy {
            max_attempts: config.retry_count,
            initial_sleep: config.retry_sleep,
            multiplier: 2,
        }
    }

    /// Fresh state for one bulk send.
    pub fn fresh(&self) -> RetryState {
        RetryState {
            attempts_made: 0,
            current_sleep: self.initial_sleep,
        }
    }
}

/// Progress of one bulk send; created per bulk and discarded with it.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    attempts_made: u32,
    current_sleep: Duration,
}

impl RetryState {
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn current_sleep(&self) -> Duration {
        self.current_sleep
    }

    fn record_attempt(self) -> Self {
        RetryState {
            attempts_made: self.attempts_made + 1,
            ..self
        }
    }

    fn backoff(self, policy: &RetryPolicy) -> Self {
        RetryState {
            current_sleep: self.current_sleep * policy.multiplier,
            ..self
        }
    }

    fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts_made >= policy.max_attempts
    }
}

/// Drives one bulk to a final outcome.
///
/// Terminal outcomes (2xx, 400, 401) short-circuit immediately; retryable
/// failures sleep and resend the identical body until the attempt bound is
/// reached, at which point the bulk is abandoned with an error log carrying
/// its body. Each completed HTTP exchange is recorded in the metrics sink.
pub async fn deliver(
    transport: &Transport,
    metrics: &dyn MetricsSink,
    policy: &RetryPolicy,
    body: &str,
) -> DeliveryOutcome {
    let mut state = policy.fresh();
    loop {
        let outcome = classify(transport.send(body).await);
        if let Some(status) = outcome.status() {
            metrics.record_status(status);
        }
        state = state.record_attempt();
        match outcome {
            DeliveryOutcome::Retryable(status) => {
                if state.exhausted(policy) {
                    let err = ShipError::RetriesExhausted {
                        attempts: state.attempts_made(),
                    };
                    error!("{err}; dropping bulk: {body}");
                    return DeliveryOutcome::Retryable(status);
                }
                debug!(
                    "got {} from the listener, retrying in {:?}",
                    describe(status),
                    state.current_sleep()
                );
                sleep(state.current_sleep()).await;
                state = state.backoff(policy);
            }
            outcome => return outcome,
        }
    }
}

fn describe(status: Option<u16>) -> String {
    match status {
        Some(status) => format!("HTTP {status}"),
        None => "a connection error".to_string(),
    }
}
