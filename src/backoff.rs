use crate::{JitterSource, RetryOptions};
use std::time::Duration;

/// Base delay used by the first retry when exponential backoff is enabled.
pub const EXPONENTIAL_START: Duration = Duration::from_secs(1);

/// The base delay before each retry of a single invocation.
///
/// A schedule is either empty (retry immediately), flat (the same
/// `retry_sleep` before every retry) or exponential (1s, 2s, 4s, ...).
/// Exponential growth saturates at [`Duration::MAX`] instead of overflowing.
///
/// # Example
///
/// ```rust
/// use retry_helper::{RetryOptions, SleepSchedule};
/// use std::time::Duration;
///
/// let options = RetryOptions::builder().exponential_backoff(true).build();
/// let mut schedule = SleepSchedule::new(&options);
///
/// assert_eq!(schedule.advance(), Some(Duration::from_secs(1)));
/// assert_eq!(schedule.advance(), Some(Duration::from_secs(2)));
/// assert_eq!(schedule.advance(), Some(Duration::from_secs(4)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSchedule {
    base: Option<Duration>,
    exponential: bool,
}

impl SleepSchedule {
    /// Exponential backoff ignores any configured `retry_sleep`.
    pub fn new(options: &RetryOptions) -> Self {
        if options.exponential_backoff {
            Self {
                base: Some(EXPONENTIAL_START),
                exponential: true,
            }
        } else {
            Self {
                base: options.retry_sleep,
                exponential: false,
            }
        }
    }

    /// The base delay the next retry will use, without advancing.
    pub fn peek(&self) -> Option<Duration> {
        self.base
    }

    /// Return the base delay for the upcoming retry and move on to the next one.
    pub fn advance(&mut self) -> Option<Duration> {
        let current = self.base;
        if self.exponential {
            self.base = current.map(|base| base.checked_mul(2).unwrap_or(Duration::MAX));
        }
        current
    }

    /// Advance the schedule and add up to `max_jitter` of random delay on top of the base.
    ///
    /// Returns `None` when no base delay is configured: jitter alone never causes a sleep.
    pub fn next_sleep<J: JitterSource + ?Sized>(
        &mut self,
        jitter: &J,
        max_jitter: Duration,
    ) -> Option<Duration> {
        self.advance()
            .map(|base| base.saturating_add(jitter.sample(max_jitter)))
    }
}
