//! Failure kinds surfaced by strategies and the execution wrapper.
use std::fmt;
use std::time::Duration;

/// Unified failure type for every strategy and for [`crate::ResilientClient`].
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The circuit breaker denied the request, or opened while handling it.
    ///
    /// `cause` holds the failure that was being handled when the breaker gave up, if any.
    CircuitBroken { failure_count: usize, cause: Option<Box<ResilienceError<E>>> },
    /// The per-attempt deadline elapsed before the operation finished.
    Timeout { elapsed: Duration, timeout: Duration },
    /// The caller's (or the client's) cancellation scope was cancelled.
    Cancelled,
    /// The wrapped operation itself failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitBroken { failure_count, cause: Some(cause) } => {
                write!(
                    f,
                    "request not allowed as circuit has been broken ({} failures); last error: {}",
                    failure_count, cause
                )
            }
            Self::CircuitBroken { failure_count, cause: None } => {
                write!(f, "circuit broken ({} failures)", failure_count)
            }
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::CircuitBroken { cause: Some(cause), .. } => {
                Some(cause.as_ref() as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Build a `CircuitBroken` failure, optionally wrapping the failure that tripped it.
    pub fn circuit_broken(failure_count: usize, cause: Option<ResilienceError<E>>) -> Self {
        Self::CircuitBroken { failure_count, cause: cause.map(Box::new) }
    }

    /// Check if the breaker rejected or gave up on this call.
    pub fn is_circuit_broken(&self) -> bool {
        matches!(self, Self::CircuitBroken { .. })
    }

    /// Check if this error is due to the per-attempt deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if an outer cancellation scope ended the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Either a deadline or an outer cancellation ended the call.
    pub fn is_cancellation(&self) -> bool {
        self.is_timeout() || self.is_cancelled()
    }

    /// Check if this error wraps an operation failure.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// The failure wrapped by a `CircuitBroken` error.
    pub fn cause(&self) -> Option<&ResilienceError<E>> {
        match self {
            Self::CircuitBroken { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Follow `CircuitBroken` causes down to the first non-breaker failure.
    pub fn root_cause(&self) -> &ResilienceError<E> {
        let mut current = self;
        while let Some(next) = current.cause() {
            current = next;
        }
        current
    }

    /// Access timeout details as `(elapsed, limit)`.
    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }
}
