use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A source of random delay added on top of the base retry sleep.
pub trait JitterSource {
    /// Sample a whole number of milliseconds, uniformly distributed in `0..=max`.
    fn sample(&self, max: Duration) -> Duration;
}

impl<J: JitterSource + ?Sized> JitterSource for &J {
    fn sample(&self, max: Duration) -> Duration {
        (**self).sample(max)
    }
}

/// Jitter drawn from the thread-local random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, max: Duration) -> Duration {
        sample_millis(&mut rand::thread_rng(), max)
    }
}

/// Deterministic jitter, reproducible from a fixed seed.
///
/// # Example
///
/// ```rust
/// use retry_helper::{JitterSource, SeededJitter};
/// use std::time::Duration;
///
/// let first = SeededJitter::new(7);
/// let second = SeededJitter::new(7);
/// let max = Duration::from_millis(1000);
///
/// assert_eq!(first.sample(max), second.sample(max));
/// ```
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self, max: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        sample_millis(&mut *rng, max)
    }
}

fn sample_millis<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rng.gen_range(0..=max_millis))
}
