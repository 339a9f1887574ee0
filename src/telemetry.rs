//! Telemetry for waiter invocations.
//!
//! Every invocation emits [`WaitEvent`]s to a [`TelemetrySink`]. Any cloneable
//! `tower::Service<WaitEvent>` is a sink. Delivery never holds up the wait: a sink that is not
//! ready when an event is offered misses that event, and its errors are discarded.
//!
//! ```rust
//! use std::time::Duration;
//! use waitready::telemetry::WaitEvent;
//!
//! let event = WaitEvent::RetryScheduled { next_attempt: 2, delay: Duration::from_millis(200) };
//! assert!(event.to_string().contains("#2"));
//! ```

use crate::waiter::StopReason;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Service, ServiceExt};

/// What happened during one waiter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitEvent {
    /// The probe is about to be invoked.
    AttemptStarted { attempt: usize, max_attempts: usize },
    /// The probe failed on this attempt.
    AttemptFailed { attempt: usize, unrecoverable: bool },
    /// Another attempt will run after `delay`.
    RetryScheduled { next_attempt: usize, delay: Duration },
    /// The invocation reached its terminal outcome.
    Settled { reason: StopReason, attempts: usize, elapsed: Duration },
}

impl fmt::Display for WaitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitEvent::AttemptStarted { attempt, max_attempts } => {
                write!(f, "AttemptStarted(#{}/{})", attempt, max_attempts)
            }
            WaitEvent::AttemptFailed { attempt, unrecoverable } => {
                write!(f, "AttemptFailed(#{}, unrecoverable={})", attempt, unrecoverable)
            }
            WaitEvent::RetryScheduled { next_attempt, delay } => {
                write!(f, "RetryScheduled(#{}, delay={:?})", next_attempt, delay)
            }
            WaitEvent::Settled { reason, attempts, elapsed } => {
                write!(f, "Settled({}, attempts={}, elapsed={:?})", reason, attempts, elapsed)
            }
        }
    }
}

/// Destination for [`WaitEvent`]s.
///
/// Implemented for every cloneable `tower::Service<WaitEvent, Response = ()>` with a `Send`
/// future.
pub trait TelemetrySink: Clone + Send + 'static {
    /// Hand `event` over if the sink can take it right now.
    ///
    /// Readiness is polled exactly once. `None` means the event was dropped; otherwise the
    /// returned future finishes the delivery and swallows its error.
    fn offer(&mut self, event: WaitEvent) -> Option<BoxFuture<'static, ()>>;
}

impl<S> TelemetrySink for S
where
    S: Service<WaitEvent, Response = ()> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    fn offer(&mut self, event: WaitEvent) -> Option<BoxFuture<'static, ()>> {
        match ServiceExt::<WaitEvent>::ready(self).now_or_never() {
            Some(Ok(sink)) => Some(sink.call(event).map(|_| ()).boxed()),
            _ => None,
        }
    }
}

/// Discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<WaitEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: WaitEvent) -> Self::Future {
        future::ok(())
    }
}

/// Logs events through `tracing` at debug level.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<WaitEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: WaitEvent) -> Self::Future {
        tracing::debug!(event = %event, "wait_event");
        future::ok(())
    }
}

const MEMORY_SINK_CAPACITY: usize = 1_000;

/// Ring of the most recent events, shared between clones. Mostly useful in tests.
#[derive(Clone, Debug)]
pub struct MemorySink {
    ring: Arc<Mutex<VecDeque<WaitEvent>>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_SINK_CAPACITY)
    }

    /// Keep at most `capacity` events (at least one); older ones are overwritten.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { ring: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))), capacity }
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<WaitEvent> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, event: WaitEvent) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<WaitEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = future::Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: WaitEvent) -> Self::Future {
        self.record(event);
        future::ok(())
    }
}
