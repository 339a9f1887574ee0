//! Pause between probe attempts.
//!
//! A [`Sleeper`] owns the whole pause, including its interaction with cancellation: when the
//! token fires, the pending timer is dropped and the pause reports [`Pause::Interrupted`].

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    Elapsed,
    Interrupted,
}

/// Source of the inter-attempt pause.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Wait for `duration`, or until `cancel` fires, whichever comes first.
    fn pause<'a>(
        &'a self,
        duration: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, Pause>;
}

/// Timer-backed pauses on the tokio runtime. Honors a paused test clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn pause<'a>(
        &'a self,
        duration: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, Pause> {
        Box::pin(async move {
            let Some(token) = cancel else {
                tokio::time::sleep(duration).await;
                return Pause::Elapsed;
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => Pause::Interrupted,
                _ = tokio::time::sleep(duration) => Pause::Elapsed,
            }
        })
    }
}

/// Records every requested pause and returns at once, unless the token already fired.
///
/// Clones share the same record, so a test can keep one handle and give the other to a waiter.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Virtual time the waiter would have spent pausing.
    pub fn total(&self) -> Duration {
        self.pauses().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn pause<'a>(
        &'a self,
        duration: Duration,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, Pause> {
        self.pauses.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        let end = match cancel {
            Some(token) if token.is_cancelled() => Pause::Interrupted,
            _ => Pause::Elapsed,
        };
        Box::pin(futures::future::ready(end))
    }
}
