use crate::{
    ErrorClass, EventSink, JitterSource, RetryEvent, RetryOptions, Settings, SleepSchedule,
    Sleeper, ThreadRngJitter, ThreadSleeper, TracingSink,
};
use chrono::{DateTime, Utc};
use std::any::type_name;
use std::fmt::Display;
use std::time::Duration;
use uuid::Uuid;

/// Runs operations, retrying the failures a predicate accepts.
///
/// The executor holds no per-call state and can be shared freely. Every call gets
/// its own retry budget, sleep schedule and `retry_id`. The value returned is either
/// the operation's success value or the last error it produced, never a wrapper.
///
/// # Example
///
/// ```rust
/// use retry_helper::{ErrorType, RetryExecutor, RetryOptions, Settings};
/// use std::io;
///
/// let executor = RetryExecutor::new().with_settings(Settings { disable_sleep: true });
/// let options = RetryOptions::builder().retry_count(2).build();
/// let mut calls = 0;
///
/// let answer = executor.retry_on_failure(&[ErrorType::of::<io::Error>()], &options, || {
///     calls += 1;
///     if calls < 3 {
///         Err(anyhow::Error::new(io::Error::new(io::ErrorKind::Other, "flaky")))
///     } else {
///         Ok(42)
///     }
/// });
///
/// assert_eq!(answer.unwrap(), 42);
/// assert_eq!(calls, 3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor<J = ThreadRngJitter, S = ThreadSleeper, L = TracingSink> {
    jitter: J,
    sleeper: S,
    sink: L,
    settings: Settings,
}

impl RetryExecutor {
    /// An executor using thread-local randomness, blocking sleeps, `tracing` events
    /// and the process-wide [`Settings::global`].
    pub fn new() -> Self {
        Self {
            jitter: ThreadRngJitter,
            sleeper: ThreadSleeper,
            sink: TracingSink,
            settings: Settings::global(),
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl<J, S, L> RetryExecutor<J, S, L> {
    pub fn with_jitter<J2: JitterSource>(self, jitter: J2) -> RetryExecutor<J2, S, L> {
        RetryExecutor {
            jitter,
            sleeper: self.sleeper,
            sink: self.sink,
            settings: self.settings,
        }
    }

    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> RetryExecutor<J, S2, L> {
        RetryExecutor {
            jitter: self.jitter,
            sleeper,
            sink: self.sink,
            settings: self.settings,
        }
    }

    pub fn with_sink<L2: EventSink>(self, sink: L2) -> RetryExecutor<J, S, L2> {
        RetryExecutor {
            jitter: self.jitter,
            sleeper: self.sleeper,
            sink,
            settings: self.settings,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }
}

impl<J, S, L> RetryExecutor<J, S, L>
where
    J: JitterSource,
    S: Sleeper,
    L: EventSink,
{
    /// Retry when the error is one of `kinds`, or a narrower kind belonging to one of them.
    pub fn retry_on_failure<K, T, E, F>(
        &self,
        kinds: &[K],
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, E>
    where
        E: ErrorClass<K> + Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run(
            |error: &E| kinds.iter().any(|kind| error.is_a(kind)),
            |error: &E| error.class_name(kinds.iter().find(|kind| error.is_a(kind))),
            options,
            operation,
        )
    }

    /// Retry on any error that is not one of `kinds`.
    ///
    /// Excluding a broad kind also excludes every narrower kind belonging to it.
    pub fn retry_on_failure_except<K, T, E, F>(
        &self,
        kinds: &[K],
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, E>
    where
        E: ErrorClass<K> + Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run(
            |error: &E| !kinds.iter().any(|kind| error.is_a(kind)),
            |error: &E| error.class_name(None),
            options,
            operation,
        )
    }

    /// Retry while `predicate` accepts the error and the budget allows it.
    ///
    /// Errors the predicate rejects are returned straight away: they spend no budget,
    /// cause no sleep and emit no event.
    pub fn retry_on_failure_condition<T, E, F, P>(
        &self,
        predicate: P,
        options: &RetryOptions,
        operation: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        self.run(predicate, |_: &E| type_name::<E>(), options, operation)
    }

    fn run<T, E, F, P, C>(
        &self,
        predicate: P,
        class_of: C,
        options: &RetryOptions,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        C: Fn(&E) -> &'static str,
    {
        let mut attempt = RetryAttempt::start(options);

        loop {
            let error = match operation() {
                Ok(value) => {
                    let retries_required = attempt.retries_made();
                    if retries_required > 0 && options.log_retries {
                        self.sink.record(&RetryEvent::Success {
                            retries_required,
                            retry_id: attempt.retry_id,
                            time_elapsed: attempt.elapsed(),
                        });
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !predicate(&error) {
                return Err(error);
            }

            if attempt.retries_remaining == 0 {
                if options.log_retries {
                    self.sink.record(&RetryEvent::Failure {
                        exception_class: class_of(&error),
                        exception_message: error.to_string(),
                        retries_attempted: attempt.retries_made(),
                        retry_id: attempt.retry_id,
                        time_elapsed: attempt.elapsed(),
                    });
                }
                return Err(error);
            }

            let sleep = if self.settings.disable_sleep {
                // Keep the exponential base in step with the retry number.
                attempt.schedule.advance();
                None
            } else {
                attempt.schedule.next_sleep(&self.jitter, options.jitter)
            };

            if options.log_retries {
                self.sink.record(&RetryEvent::Attempt {
                    exception_class: class_of(&error),
                    exception_message: error.to_string(),
                    retries_remaining: attempt.retries_remaining,
                    retry_id: attempt.retry_id,
                    sleep_before_retry: sleep,
                    time_elapsed: attempt.elapsed(),
                });
            }

            attempt.retries_remaining -= 1;
            if let Some(duration) = sleep {
                self.sleeper.sleep(duration);
            }
        }
    }

    /// Decorate `function` so that every call runs under [`RetryExecutor::retry_on_failure`].
    ///
    /// The argument is cloned for each attempt.
    pub fn wrap_with_retry<'a, K, A, T, E, F>(
        &'a self,
        kinds: Vec<K>,
        options: RetryOptions,
        mut function: F,
    ) -> impl FnMut(A) -> Result<T, E> + 'a
    where
        K: 'a,
        A: Clone,
        E: ErrorClass<K> + Display,
        F: FnMut(A) -> Result<T, E> + 'a,
    {
        move |argument: A| {
            self.retry_on_failure(&kinds, &options, || function(argument.clone()))
        }
    }
}

/// Bookkeeping for one invocation of the retry loop.
struct RetryAttempt {
    retry_id: Uuid,
    retry_count: u32,
    retries_remaining: u32,
    schedule: SleepSchedule,
    started_at: DateTime<Utc>,
}

impl RetryAttempt {
    fn start(options: &RetryOptions) -> Self {
        Self {
            retry_id: Uuid::new_v4(),
            retry_count: options.retry_count,
            retries_remaining: options.retry_count,
            schedule: SleepSchedule::new(options),
            started_at: Utc::now(),
        }
    }

    fn retries_made(&self) -> u32 {
        self.retry_count - self.retries_remaining
    }

    fn elapsed(&self) -> Duration {
        // The wall clock may step backwards; report zero rather than fail.
        (Utc::now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
