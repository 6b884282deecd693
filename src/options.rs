use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a single retried call behaves.
///
/// Deserializes from a map keyed by option name; missing keys take their defaults
/// and unknown keys are rejected. `retry_sleep` is expressed in (fractional) seconds,
/// `jitter` in milliseconds.
///
/// # Example
///
/// ```rust
/// use retry_helper::RetryOptions;
/// use std::time::Duration;
///
/// let options = RetryOptions::builder()
///     .retry_count(5)
///     .retry_sleep(Duration::from_millis(250))
///     .build();
///
/// assert_eq!(options.retry_count, 5);
/// assert_eq!(options.retry_sleep, Some(Duration::from_millis(250)));
/// assert!(options.log_retries);
/// assert_eq!(options.jitter, Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct RetryOptions {
    /// Maximum number of retries after the first failed attempt.
    pub retry_count: u32,
    /// Base delay before each retry. No delay when unset.
    #[serde(with = "optional_seconds")]
    pub retry_sleep: Option<Duration>,
    /// Start the base delay at one second and double it after every retry.
    pub exponential_backoff: bool,
    /// Emit attempt, failure and success events.
    pub log_retries: bool,
    /// Upper bound of the random delay added to each sleep.
    #[serde(with = "milliseconds")]
    pub jitter: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_sleep: None,
            exponential_backoff: false,
            log_retries: true,
            jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryOptions {
    /// Returns a builder seeded with the defaults.
    pub fn builder() -> RetryOptionsBuilder {
        <_>::default()
    }
}

/// Builds a [`RetryOptions`].
#[derive(Debug, Clone, Default)]
pub struct RetryOptionsBuilder {
    options: RetryOptions,
}

impl RetryOptionsBuilder {
    /// Maximum retries after the first failure. _Default 3_.
    ///
    /// Zero means the operation runs exactly once.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.options.retry_count = retry_count;
        self
    }

    /// Flat delay before every retry. _Default none_.
    pub fn retry_sleep(mut self, retry_sleep: Duration) -> Self {
        self.options.retry_sleep = Some(retry_sleep);
        self
    }

    /// Exponential delays of 1s, 2s, 4s, ... _Default false_.
    ///
    /// Overrides [`RetryOptionsBuilder::retry_sleep`].
    pub fn exponential_backoff(mut self, enabled: bool) -> Self {
        self.options.exponential_backoff = enabled;
        self
    }

    /// _Default true_.
    pub fn log_retries(mut self, enabled: bool) -> Self {
        self.options.log_retries = enabled;
        self
    }

    /// Maximum random delay added to each sleep. _Default 1000ms_.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.options.jitter = jitter;
        self
    }

    pub fn build(self) -> RetryOptions {
        self.options
    }
}

mod optional_seconds {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}

mod milliseconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
