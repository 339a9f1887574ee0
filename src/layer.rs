//! Tower integration: wait for a service to answer successfully.
//!
//! Every call is replayed against a fresh clone of the inner service until it succeeds,
//! the classifier marks the error unrecoverable, or the waiter's attempt budget runs out.
//!
//! ```rust
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//! use waitready::{RetryBudget, WaitLayer, Waiter};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer = WaitLayer::new(Waiter::new(RetryBudget::from_millis(100, 3).unwrap()))
//!     .unrecoverable_when(|e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound);
//!
//! let svc = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|req: u32| async move { Ok::<_, std::io::Error>(req * 2) }));
//!
//! assert_eq!(svc.oneshot(21).await.unwrap(), 42);
//! # });
//! ```

use crate::error::{ProbeError, Unrecoverable, WaitError};
use crate::telemetry::{NullSink, TelemetrySink};
use crate::waiter::Waiter;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Layer applying a [`Waiter`] to every request.
pub struct WaitLayer<E, S = NullSink> {
    waiter: Waiter<S>,
    unrecoverable: Classifier<E>,
}

impl<E, S> WaitLayer<E, S> {
    /// Every inner error is treated as transient until [`WaitLayer::unrecoverable_when`] says
    /// otherwise.
    pub fn new(waiter: Waiter<S>) -> Self {
        Self { waiter, unrecoverable: Arc::new(|_| false) }
    }

    /// Errors matching `predicate` stop the wait immediately and become the signal's cause.
    pub fn unrecoverable_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.unrecoverable = Arc::new(predicate);
        self
    }
}

impl<E, S: Clone> Clone for WaitLayer<E, S> {
    fn clone(&self) -> Self {
        Self { waiter: self.waiter.clone(), unrecoverable: self.unrecoverable.clone() }
    }
}

impl<E, S> fmt::Debug for WaitLayer<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitLayer")
            .field("waiter", &self.waiter)
            .field("unrecoverable", &"<predicate>")
            .finish()
    }
}

impl<Svc, E, S: Clone> Layer<Svc> for WaitLayer<E, S> {
    type Service = WaitService<Svc, E, S>;

    fn layer(&self, inner: Svc) -> Self::Service {
        WaitService { inner, layer: self.clone() }
    }
}

/// Service produced by [`WaitLayer`].
pub struct WaitService<Svc, E, S = NullSink> {
    inner: Svc,
    layer: WaitLayer<E, S>,
}

impl<Svc: Clone, E, S: Clone> Clone for WaitService<Svc, E, S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), layer: self.layer.clone() }
    }
}

impl<Svc, E, S, Request> Service<Request> for WaitService<Svc, E, S>
where
    Request: Clone + Send + 'static,
    Svc: Service<Request, Error = E> + Clone + Send + 'static,
    Svc::Response: Send + 'static,
    Svc::Future: Send + 'static,
    E: fmt::Display + Send + 'static,
    S: TelemetrySink + Sync,
{
    type Response = Svc::Response;
    type Error = WaitError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited per attempt inside `call`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let inner = self.inner.clone();
        let layer = self.layer.clone();
        Box::pin(async move {
            let unrecoverable = layer.unrecoverable.clone();
            layer
                .waiter
                .wait_until_ready(move || {
                    let svc = inner.clone();
                    let req = req.clone();
                    let unrecoverable = unrecoverable.clone();
                    async move {
                        svc.oneshot(req).await.map_err(|e| {
                            if unrecoverable(&e) {
                                ProbeError::Unrecoverable(Unrecoverable::caused_by(
                                    "service reported an unrecoverable error",
                                    e,
                                ))
                            } else {
                                ProbeError::Transient(e)
                            }
                        })
                    }
                })
                .await
        })
    }
}
