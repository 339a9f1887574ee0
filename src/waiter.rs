//! Bounded, evenly paced retry of a readiness probe.
//!
//! Semantics:
//! - `max_attempts` counts every probe invocation, including the first.
//! - The pause between attempts is `timeout / max_attempts`, computed once per invocation.
//! - `ProbeError::Unrecoverable` stops the invocation immediately, whatever attempts remain.
//! - Any `ProbeError::Transient` failure is retried until the attempt budget runs out; the last
//!   one is returned.
//! - Attempts are strictly sequential. Attempt `n + 1` never starts before attempt `n` settled.
//!
//! Invariants:
//! - Each invocation owns its attempt counter; a `Waiter` can drive any number of concurrent
//!   invocations without them observing each other.
//! - An invocation settles exactly once, with one of the [`Outcome`] variants.
//!
//! ```rust
//! use std::time::Duration;
//! use waitready::{ProbeError, RetryBudget, Waiter};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let waiter = Waiter::builder()
//!     .budget(RetryBudget::from_millis(1000, 5).unwrap())
//!     .label("health")
//!     .build()
//!     .unwrap();
//!
//! let ready: Result<&str, _> = waiter
//!     .wait_until_ready(|| async { Ok::<_, ProbeError<std::io::Error>>("up") })
//!     .await;
//! assert_eq!(ready.unwrap(), "up");
//! # });
//! ```

use crate::budget::{BudgetError, RetryBudget};
use crate::error::{ProbeError, Unrecoverable, WaitError};
use crate::sleeper::{Pause, Sleeper, TokioSleeper};
use crate::telemetry::{NullSink, TelemetrySink, WaitEvent};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_LABEL: &str = "probe";

/// Why an invocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Ready,
    Unrecoverable,
    Exhausted,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::Ready => "ready",
            StopReason::Unrecoverable => "unrecoverable",
            StopReason::Exhausted => "exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The probe succeeded on attempt `attempts`.
    Ready { value: T, attempts: usize },
    /// The probe raised an unrecoverable signal on attempt `attempts`.
    Unrecoverable { signal: Unrecoverable<E>, attempts: usize },
    /// All `attempts` failed transiently; `last` is the final failure.
    Exhausted { last: E, attempts: usize },
    /// Cancelled after `attempts` probe invocations had started.
    Cancelled { attempts: usize },
}

impl<T, E> Outcome<T, E> {
    pub fn reason(&self) -> StopReason {
        match self {
            Outcome::Ready { .. } => StopReason::Ready,
            Outcome::Unrecoverable { .. } => StopReason::Unrecoverable,
            Outcome::Exhausted { .. } => StopReason::Exhausted,
            Outcome::Cancelled { .. } => StopReason::Cancelled,
        }
    }

    /// Number of probe invocations started.
    pub fn attempts(&self) -> usize {
        match self {
            Outcome::Ready { attempts, .. }
            | Outcome::Unrecoverable { attempts, .. }
            | Outcome::Exhausted { attempts, .. }
            | Outcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready { .. })
    }

    pub fn into_result(self) -> Result<T, WaitError<E>> {
        match self {
            Outcome::Ready { value, .. } => Ok(value),
            Outcome::Unrecoverable { signal, attempts } => {
                Err(WaitError::Unrecoverable { attempts, signal })
            }
            Outcome::Exhausted { last, attempts } => Err(WaitError::Exhausted { attempts, last }),
            Outcome::Cancelled { attempts } => Err(WaitError::Cancelled { attempts }),
        }
    }
}

/// Repeatedly invokes a probe until it is ready, it gives up, or the budget is spent.
#[derive(Clone)]
pub struct Waiter<S = NullSink> {
    budget: RetryBudget,
    delay_first_attempt: bool,
    label: Arc<str>,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
}

impl<S> fmt::Debug for Waiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("budget", &self.budget)
            .field("delay_first_attempt", &self.delay_first_attempt)
            .field("label", &self.label)
            .field("sleeper", &self.sleeper)
            .field("sink", &"<sink>")
            .finish()
    }
}

impl Waiter<NullSink> {
    /// Waiter with default pacing, tokio timers, and no telemetry.
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            budget,
            delay_first_attempt: false,
            label: Arc::from(DEFAULT_LABEL),
            sleeper: Arc::new(TokioSleeper),
            sink: NullSink,
        }
    }

    pub fn builder() -> WaiterBuilder<NullSink> {
        WaiterBuilder::new()
    }
}

impl<S> Waiter<S> {
    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<S: TelemetrySink> Waiter<S> {
    /// Drive the probe to a terminal [`Outcome`].
    pub async fn run<T, E, Fut, P>(&self, probe: P) -> Outcome<T, E>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        E: fmt::Display,
    {
        self.drive(probe, None).await
    }

    /// Like [`Waiter::run`], but settles with `Outcome::Cancelled` as soon as `token` fires.
    ///
    /// Cancellation drops the pending pause (clearing its timer), any in-flight probe future, and
    /// any telemetry delivery still in progress.
    pub async fn run_cancellable<T, E, Fut, P>(
        &self,
        probe: P,
        token: &CancellationToken,
    ) -> Outcome<T, E>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        E: fmt::Display,
    {
        self.drive(probe, Some(token)).await
    }

    /// Resolve with the first successful probe value.
    pub async fn wait_until_ready<T, E, Fut, P>(&self, probe: P) -> Result<T, WaitError<E>>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        E: fmt::Display,
    {
        self.run(probe).await.into_result()
    }

    pub async fn wait_until_ready_cancellable<T, E, Fut, P>(
        &self,
        probe: P,
        token: &CancellationToken,
    ) -> Result<T, WaitError<E>>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        E: fmt::Display,
    {
        self.run_cancellable(probe, token).await.into_result()
    }

    async fn drive<T, E, Fut, P>(
        &self,
        mut probe: P,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<T, E>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let max_attempts = self.budget.max_attempts();
        let delay = self.budget.delay();
        let mut attempt = 1usize;

        let outcome = loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                break Outcome::Cancelled { attempts: attempt - 1 };
            }

            let should_pause = attempt > 1 || self.delay_first_attempt;
            if should_pause && self.sleeper.pause(delay, cancel).await == Pause::Interrupted {
                break Outcome::Cancelled { attempts: attempt - 1 };
            }

            debug!(probe = %self.label, attempt, max_attempts, "probing");
            self.emit(WaitEvent::AttemptStarted { attempt, max_attempts }, cancel).await;

            let result = match until_cancelled(cancel, probe()).await {
                Some(result) => result,
                None => break Outcome::Cancelled { attempts: attempt },
            };

            match result {
                Ok(value) => break Outcome::Ready { value, attempts: attempt },
                Err(ProbeError::Unrecoverable(signal)) => {
                    warn!(probe = %self.label, attempt, reason = %signal, "probe cannot recover");
                    self.emit(WaitEvent::AttemptFailed { attempt, unrecoverable: true }, cancel)
                        .await;
                    break Outcome::Unrecoverable { signal, attempts: attempt };
                }
                Err(ProbeError::Transient(error)) => {
                    self.emit(WaitEvent::AttemptFailed { attempt, unrecoverable: false }, cancel)
                        .await;
                    if attempt >= max_attempts {
                        warn!(probe = %self.label, attempts = attempt, error = %error, "giving up");
                        break Outcome::Exhausted { last: error, attempts: attempt };
                    }
                    debug!(probe = %self.label, attempt, error = %error, ?delay, "retrying");
                    let next_attempt = attempt + 1;
                    self.emit(WaitEvent::RetryScheduled { next_attempt, delay }, cancel).await;
                    attempt += 1;
                }
            }
        };

        let settled = WaitEvent::Settled {
            reason: outcome.reason(),
            attempts: outcome.attempts(),
            elapsed: started.elapsed(),
        };
        self.emit(settled, cancel).await;
        outcome
    }

    /// Offer `event` to the sink. A sink that is not ready misses it; a delivery still running
    /// when `cancel` fires is dropped.
    async fn emit(&self, event: WaitEvent, cancel: Option<&CancellationToken>) {
        if let Some(delivery) = self.sink.clone().offer(event) {
            let _ = until_cancelled(cancel, delivery).await;
        }
    }
}

/// Await `fut` unless `cancel` fires first. The losing future is dropped.
async fn until_cancelled<F: Future>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            output = fut => Some(output),
        },
        None => Some(fut.await),
    }
}

/// Wait for `probe` under `budget` with default pacing and no telemetry.
///
/// ```rust
/// use waitready::{wait_until_ready, ProbeError, RetryBudget, Unrecoverable};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let err = wait_until_ready(
///     || async { Err::<(), _>(ProbeError::from(Unrecoverable::caused_by("exited", "code 1"))) },
///     RetryBudget::from_millis(1000, 5).unwrap(),
/// )
/// .await
/// .unwrap_err();
/// assert_eq!(err.into_cause(), Some("code 1"));
/// # });
/// ```
pub async fn wait_until_ready<T, E, Fut, P>(
    probe: P,
    budget: RetryBudget,
) -> Result<T, WaitError<E>>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError<E>>>,
    E: fmt::Display,
{
    Waiter::new(budget).wait_until_ready(probe).await
}

/// Builder for [`Waiter`].
pub struct WaiterBuilder<S = NullSink> {
    timeout: Duration,
    max_attempts: usize,
    delay_first_attempt: bool,
    label: Arc<str>,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
}

impl WaiterBuilder<NullSink> {
    /// Defaults to [`RetryBudget::server_startup`], tokio timers, and no telemetry.
    pub fn new() -> Self {
        let budget = RetryBudget::server_startup();
        Self {
            timeout: budget.timeout(),
            max_attempts: budget.max_attempts(),
            delay_first_attempt: false,
            label: Arc::from(DEFAULT_LABEL),
            sleeper: Arc::new(TokioSleeper),
            sink: NullSink,
        }
    }
}

impl Default for WaiterBuilder<NullSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> WaiterBuilder<S> {
    /// Total time budget spread across all attempts.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Take both timeout and attempt count from an existing budget.
    pub fn budget(mut self, budget: RetryBudget) -> Self {
        self.timeout = budget.timeout();
        self.max_attempts = budget.max_attempts();
        self
    }

    /// Also pause before the very first attempt.
    pub fn delay_first_attempt(mut self, enabled: bool) -> Self {
        self.delay_first_attempt = enabled;
        self
    }

    /// Name used for the probe in log records.
    pub fn label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_sleeper<Sl>(mut self, sleeper: Sl) -> Self
    where
        Sl: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Route wait events to a telemetry sink.
    pub fn with_sink<S2>(self, sink: S2) -> WaiterBuilder<S2> {
        WaiterBuilder {
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            delay_first_attempt: self.delay_first_attempt,
            label: self.label,
            sleeper: self.sleeper,
            sink,
        }
    }

    pub fn build(self) -> Result<Waiter<S>, BudgetError> {
        let budget = RetryBudget::new(self.timeout, self.max_attempts)?;
        Ok(Waiter {
            budget,
            delay_first_attempt: self.delay_first_attempt,
            label: self.label,
            sleeper: self.sleeper,
            sink: self.sink,
        })
    }
}
