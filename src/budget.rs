//! Retry budget: total timeout spread evenly across a fixed number of attempts.
//!
//! The per-attempt delay is `timeout / max_attempts`, computed once and held fixed for the
//! whole invocation. It does not adapt to elapsed time or to how long a probe took.
//!
//! ```rust
//! use std::time::Duration;
//! use waitready::RetryBudget;
//!
//! let budget = RetryBudget::from_millis(1000, 5).unwrap();
//! assert_eq!(budget.delay(), Duration::from_millis(200));
//! ```

use std::time::Duration;

/// Budget used by [`RetryBudget::server_startup`].
pub const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempt count used by [`RetryBudget::server_startup`].
pub const SERVER_STARTUP_ATTEMPTS: usize = 10;

/// Errors produced while validating a retry budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

/// Immutable pairing of a total timeout and a maximum attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    timeout: Duration,
    max_attempts: usize,
}

impl RetryBudget {
    /// Create a budget. `max_attempts` counts every probe invocation, including the first.
    pub fn new(timeout: Duration, max_attempts: usize) -> Result<Self, BudgetError> {
        if max_attempts == 0 {
            return Err(BudgetError::InvalidMaxAttempts(max_attempts));
        }
        Ok(Self { timeout, max_attempts })
    }

    /// Convenience constructor taking the total timeout in milliseconds.
    pub fn from_millis(total_timeout_ms: u64, max_attempts: usize) -> Result<Self, BudgetError> {
        Self::new(Duration::from_millis(total_timeout_ms), max_attempts)
    }

    /// Waiting for a freshly started server process: 10 seconds over 10 attempts.
    pub fn server_startup() -> Self {
        Self { timeout: SERVER_STARTUP_TIMEOUT, max_attempts: SERVER_STARTUP_ATTEMPTS }
    }

    /// Total time budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Hard ceiling on probe invocations.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Fixed pause between attempts: `timeout / max_attempts`.
    ///
    /// Note that `max_attempts` attempts only have `max_attempts - 1` gaps between them, so a
    /// probe that always fails finishes after roughly `timeout * (n - 1) / n`, not `timeout`.
    pub fn delay(&self) -> Duration {
        // Counts above u32::MAX already make the delay indistinguishable from zero.
        let divisor = u32::try_from(self.max_attempts).unwrap_or(u32::MAX);
        self.timeout / divisor
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::server_startup()
    }
}
