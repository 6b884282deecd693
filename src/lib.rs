//! Retry failing operations with optional backoff and jitter, and mark named
//! policies as in effect for the calling thread.
//!
//! [`RetryExecutor`] wraps an operation with bounded, error-selective retries and
//! reports each step as a structured [`RetryEvent`]. [`PolicyNamespace`] tracks which
//! [`Policy`] instances are active per thread, so nested code can tell that it already
//! runs under, say, a retry and avoid retrying twice.
mod backoff;
mod classify;
mod events;
mod jitter;
mod options;
pub mod policies;
mod retry;
mod settings;
mod sleeper;

pub use backoff::{SleepSchedule, EXPONENTIAL_START};
pub use classify::{ErrorClass, ErrorType};
pub use events::{EventSink, RetryEvent, TracingSink};
pub use jitter::{JitterSource, SeededJitter, ThreadRngJitter};
pub use options::{RetryOptions, RetryOptionsBuilder};
pub use policies::{NamedPolicy, Policy, PolicyHandle, PolicyNamespace};
pub use retry::RetryExecutor;
pub use settings::{Settings, DISABLE_SLEEP_ENV};
pub use sleeper::{Sleeper, ThreadSleeper};
