//! Jitter applied on top of a backoff delay.
//!
//! - `None`: the exact backoff delay. This is the default so configured delays are honoured as-is.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`.
//!
//! Uses `rand`'s thread-local RNG; `apply_with_rng` takes an explicit one.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    #[default]
    None,
    Full,
    Equal,
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            _ => self.apply_with_rng(delay, &mut rng()),
        }
    }

    /// Apply jitter with a caller-provided RNG.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let nanos: u64 = delay.as_nanos().try_into().unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            _ if nanos == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_nanos(rng.random_range(0..=nanos)),
            Jitter::Equal => Duration::from_nanos(rng.random_range(nanos / 2..=nanos)),
        }
    }
}
