//! Delay curves used between retries.
//!
//! `delay(retry)` takes the 1-based retry number: the wait before the first retry is `delay(1)`.
//! `delay(0)` is the initial call and is always zero.
//!
//! - `Fixed`: the same wait before every retry.
//! - `Linear`: `base × retry` (100ms, 200ms, 300ms, ...).
//! - `Exponential`: `base × 2^(retry-1)` (100ms, 200ms, 400ms, ...).
//!
//! ```rust
//! use std::time::Duration;
//! use lifeline::Backoff;
//!
//! let backoff = Backoff::linear(Duration::from_millis(100));
//! assert_eq!(backoff.delay(3), Duration::from_millis(300));
//! ```
//!
//! Computations that would overflow saturate to [`MAX_BACKOFF`].

use std::time::Duration;

/// Upper bound for any computed delay (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("a fixed backoff cannot be capped")]
    FixedDoesNotSupportCap,
    #[error("cap must be greater than zero")]
    CapMustBePositive,
    #[error("cap ({cap:?}) must be >= base ({base:?})")]
    CapLessThanBase { base: Duration, cap: Duration },
}

/// Backoff curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Linear { base: Duration, cap: Option<Duration> },
    Exponential { base: Duration, cap: Option<Duration> },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed(delay)
    }

    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base, cap: None }
    }

    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, cap: None }
    }

    /// Cap a growing curve. Errors on `Fixed`, on a zero cap, or when `cap < base`.
    pub fn with_cap(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::CapMustBePositive);
        }
        match &mut self {
            Backoff::Fixed(_) => Err(BackoffError::FixedDoesNotSupportCap),
            Backoff::Linear { base, cap } | Backoff::Exponential { base, cap } => {
                if max < *base {
                    return Err(BackoffError::CapLessThanBase { base: *base, cap: max });
                }
                *cap = Some(max);
                Ok(self)
            }
        }
    }

    /// The base (or fixed) delay.
    pub fn base(&self) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear { base, .. } | Backoff::Exponential { base, .. } => *base,
        }
    }

    /// Wait before the given 1-based retry.
    pub fn delay(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let raw = match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear { base, cap } => {
                let factor = retry.min(u32::MAX as usize) as u32;
                let linear = base.checked_mul(factor).unwrap_or(MAX_BACKOFF);
                cap.map_or(linear, |c| linear.min(c))
            }
            Backoff::Exponential { base, cap } => {
                let exponent = (retry - 1).min(u32::MAX as usize) as u32;
                let nanos = base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                let exp = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                cap.map_or(exp, |c| exp.min(c))
            }
        };
        raw.min(MAX_BACKOFF)
    }
}
