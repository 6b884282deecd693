use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A structured record of one step of a retried call.
///
/// All events of a single invocation share the same `retry_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retryable failure occurred and the operation is about to run again.
    Attempt {
        exception_class: &'static str,
        exception_message: String,
        /// Retries left before this one is spent.
        retries_remaining: u32,
        retry_id: Uuid,
        /// `None` when no delay is configured or sleeps are disabled.
        sleep_before_retry: Option<Duration>,
        time_elapsed: Duration,
    },
    /// The retry budget ran out and the error is being returned.
    Failure {
        exception_class: &'static str,
        exception_message: String,
        retries_attempted: u32,
        retry_id: Uuid,
        time_elapsed: Duration,
    },
    /// The operation succeeded after at least one retry.
    Success {
        retries_required: u32,
        retry_id: Uuid,
        time_elapsed: Duration,
    },
}

impl RetryEvent {
    pub fn retry_id(&self) -> Uuid {
        match self {
            RetryEvent::Attempt { retry_id, .. }
            | RetryEvent::Failure { retry_id, .. }
            | RetryEvent::Success { retry_id, .. } => *retry_id,
        }
    }
}

/// Receives the events emitted while retrying.
pub trait EventSink {
    fn record(&self, event: &RetryEvent);
}

impl<L: EventSink + ?Sized> EventSink for &L {
    fn record(&self, event: &RetryEvent) {
        (**self).record(event)
    }
}

/// Forwards events to `tracing`, one structured event each.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &RetryEvent) {
        match event {
            RetryEvent::Attempt {
                exception_class,
                exception_message,
                retries_remaining,
                retry_id,
                sleep_before_retry,
                time_elapsed,
            } => warn!(
                exception_class = *exception_class,
                exception_message = %exception_message,
                retries_remaining = *retries_remaining,
                retry_id = %retry_id,
                sleep_before_retry = sleep_before_retry.map(|sleep| sleep.as_secs_f64()),
                time_elapsed = time_elapsed.as_secs_f64(),
                "Retrying after failure"
            ),
            RetryEvent::Failure {
                exception_class,
                exception_message,
                retries_attempted,
                retry_id,
                time_elapsed,
            } => error!(
                exception_class = *exception_class,
                exception_message = %exception_message,
                retries_attempted = *retries_attempted,
                retry_id = %retry_id,
                time_elapsed = time_elapsed.as_secs_f64(),
                "Retries exhausted"
            ),
            RetryEvent::Success {
                retries_required,
                retry_id,
                time_elapsed,
            } => info!(
                retries_required = *retries_required,
                retry_id = %retry_id,
                time_elapsed = time_elapsed.as_secs_f64(),
                "Succeeded after retrying"
            ),
        }
    }
}
