//! Failure-tracking circuit breaker.
//!
//! A breaker is created once per protected resource and shared (`Arc<CircuitBreaker>`) by every
//! caller talking to that resource.
//!
//! Transitions:
//! - **Closed → Open** when the failure count reaches `failure_threshold`. Only the call that
//!   crosses the threshold gets a [`CircuitBrokenError`] back from [`CircuitBreaker::mark_failure`].
//! - **Open**: [`CircuitBreaker::allow_request`] admits one probe per `circuit_retry` window and
//!   restarts the window as soon as a probe is admitted, whatever that probe's outcome.
//! - **Open → Closed** on the first success reported while open, or on [`CircuitBreaker::reset`].
//!
//! Successes reported while closed do not clear the failure count; failures accumulate until the
//! breaker opens and recovers or is reset.
//!
//! State, the broken-at timestamp and every threshold decision live behind one mutex. Only the raw
//! failure increment happens outside it.

use crate::clock::{Clock, MonotonicClock};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_FAILURE_THRESHOLD: usize = 1;
const DEFAULT_CIRCUIT_RETRY: Duration = Duration::from_secs(60);
const DEFAULT_CIRCUIT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are denied apart from one probe per retry window.
    Open,
    /// Reserved. No transition enters it; it behaves exactly like `Closed`.
    Partial,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::Partial => "partial",
        };
        f.write_str(name)
    }
}

/// Raised by `mark_failure` on the transition into `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit broken after {failures} failures")]
pub struct CircuitBrokenError {
    pub failures: usize,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("failure_threshold must be > 0 (got {provided})")]
    InvalidFailureThreshold { provided: usize },
    #[error("circuit_retry must be > 0 (got {0:?})")]
    InvalidCircuitRetry(Duration),
}

/// Decision surface shared by breaker implementations.
pub trait Breaker: Send + Sync + fmt::Debug {
    fn state(&self) -> CircuitState;
    fn failure_count(&self) -> usize;
    /// Pre-flight admission check.
    fn allow_request(&self) -> bool;
    /// Record a failure; errors exactly once, on the transition into `Open`.
    fn mark_failure(&self) -> Result<(), CircuitBrokenError>;
    fn mark_success(&self);
    /// Force the breaker closed and clear the failure count.
    fn reset(&self);
}

/// Validated breaker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    circuit_retry: Duration,
    circuit_lockout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            circuit_retry: DEFAULT_CIRCUIT_RETRY,
            circuit_lockout: DEFAULT_CIRCUIT_LOCKOUT,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(
        failure_threshold: usize,
        circuit_retry: Duration,
        circuit_lockout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        validate_threshold(failure_threshold)?;
        validate_retry(circuit_retry)?;
        Ok(Self { failure_threshold, circuit_retry, circuit_lockout })
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Minimum time between admitted probes while open.
    pub fn circuit_retry(&self) -> Duration {
        self.circuit_retry
    }

    /// Stored for callers; no transition consults it.
    pub fn circuit_lockout(&self) -> Duration {
        self.circuit_lockout
    }
}

fn validate_threshold(threshold: usize) -> Result<(), CircuitBreakerError> {
    if threshold == 0 {
        return Err(CircuitBreakerError::InvalidFailureThreshold { provided: threshold });
    }
    Ok(())
}

fn validate_retry(retry: Duration) -> Result<(), CircuitBreakerError> {
    if retry.is_zero() {
        return Err(CircuitBreakerError::InvalidCircuitRetry(retry));
    }
    Ok(())
}

fn to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    broken_at_millis: u64,
}

/// The default breaker implementation.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuit: Mutex<Circuit>,
    failures: AtomicUsize,
    failure_threshold: AtomicUsize,
    circuit_retry_millis: AtomicU64,
    circuit_lockout_millis: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Breaker with a threshold of 1, a 60s retry window and a 5min lockout.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit: Mutex::new(Circuit { state: CircuitState::Closed, broken_at_millis: 0 }),
            failures: AtomicUsize::new(0),
            failure_threshold: AtomicUsize::new(config.failure_threshold),
            circuit_retry_millis: AtomicU64::new(to_millis(config.circuit_retry)),
            circuit_lockout_millis: AtomicU64::new(to_millis(config.circuit_lockout)),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold(),
            circuit_retry: self.circuit_retry(),
            circuit_lockout: self.circuit_lockout(),
        }
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold.load(Ordering::Acquire)
    }

    /// Takes effect on the next failure evaluation.
    pub fn set_failure_threshold(&self, threshold: usize) -> Result<(), CircuitBreakerError> {
        validate_threshold(threshold)?;
        self.failure_threshold.store(threshold, Ordering::Release);
        Ok(())
    }

    pub fn circuit_retry(&self) -> Duration {
        Duration::from_millis(self.circuit_retry_millis.load(Ordering::Acquire))
    }

    /// Takes effect on the next admission check.
    pub fn set_circuit_retry(&self, retry: Duration) -> Result<(), CircuitBreakerError> {
        validate_retry(retry)?;
        self.circuit_retry_millis.store(to_millis(retry), Ordering::Release);
        Ok(())
    }

    pub fn circuit_lockout(&self) -> Duration {
        Duration::from_millis(self.circuit_lockout_millis.load(Ordering::Acquire))
    }

    pub fn set_circuit_lockout(&self, lockout: Duration) {
        self.circuit_lockout_millis.store(to_millis(lockout), Ordering::Release);
    }

    pub fn state(&self) -> CircuitState {
        self.circuit().state
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Record a failure. Returns `Err` only on the call that opens the circuit.
    pub fn mark_failure(&self) -> Result<(), CircuitBrokenError> {
        self.failures.fetch_add(1, Ordering::AcqRel);
        let failures = {
            let mut circuit = self.circuit();
            let failures = self.failures.load(Ordering::Acquire);
            if failures < self.failure_threshold() || circuit.state == CircuitState::Open {
                return Ok(());
            }
            circuit.state = CircuitState::Open;
            circuit.broken_at_millis = self.clock.now_millis();
            failures
        };
        error!(
            target: "lifeline::circuit_breaker",
            failures,
            threshold = self.failure_threshold(),
            "circuit breaker → open"
        );
        Err(CircuitBrokenError { failures })
    }

    /// Record a success. Closes an open circuit; a no-op otherwise.
    pub fn mark_success(&self) {
        let mut circuit = self.circuit();
        if circuit.state == CircuitState::Open {
            self.close(&mut circuit);
            drop(circuit);
            info!(target: "lifeline::circuit_breaker", "circuit breaker → closed");
        }
    }

    /// Admission check. While open, admits one probe per retry window.
    pub fn allow_request(&self) -> bool {
        let mut circuit = self.circuit();
        match circuit.state {
            CircuitState::Closed | CircuitState::Partial => true,
            CircuitState::Open => {
                let now = self.clock.now_millis();
                let elapsed = now.saturating_sub(circuit.broken_at_millis);
                if elapsed < self.circuit_retry_millis.load(Ordering::Acquire) {
                    return false;
                }
                circuit.broken_at_millis = now;
                drop(circuit);
                debug!(target: "lifeline::circuit_breaker", elapsed_ms = elapsed, "probe admitted");
                true
            }
        }
    }

    pub fn reset(&self) {
        let mut circuit = self.circuit();
        self.close(&mut circuit);
        drop(circuit);
        info!(target: "lifeline::circuit_breaker", "circuit breaker reset");
    }

    fn close(&self, circuit: &mut Circuit) {
        self.failures.store(0, Ordering::Release);
        circuit.state = CircuitState::Closed;
    }

    // Every critical section leaves `Circuit` consistent, so a poisoned lock is safe to reuse.
    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Breaker for CircuitBreaker {
    fn state(&self) -> CircuitState {
        CircuitBreaker::state(self)
    }

    fn failure_count(&self) -> usize {
        CircuitBreaker::failure_count(self)
    }

    fn allow_request(&self) -> bool {
        CircuitBreaker::allow_request(self)
    }

    fn mark_failure(&self) -> Result<(), CircuitBrokenError> {
        CircuitBreaker::mark_failure(self)
    }

    fn mark_success(&self) {
        CircuitBreaker::mark_success(self)
    }

    fn reset(&self) {
        CircuitBreaker::reset(self)
    }
}

/// Breaker that never opens.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCircuitBreaker;

impl Breaker for NoOpCircuitBreaker {
    fn state(&self) -> CircuitState {
        CircuitState::Closed
    }

    fn failure_count(&self) -> usize {
        0
    }

    fn allow_request(&self) -> bool {
        true
    }

    fn mark_failure(&self) -> Result<(), CircuitBrokenError> {
        Ok(())
    }

    fn mark_success(&self) {}

    fn reset(&self) {}
}
