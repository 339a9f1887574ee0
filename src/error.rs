//! Error types for probes and waiter invocations
use std::fmt;

/// Failure a probe raises to stop the waiter immediately.
///
/// Carries a human-readable message and, optionally, the underlying cause. When the waiter
/// stops on this signal it surfaces the cause if there is one, and the signal itself otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrecoverable<E> {
    message: String,
    cause: Option<E>,
}

impl<E> Unrecoverable<E> {
    /// Signal without an underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), cause: None }
    }

    /// Signal wrapping an underlying cause.
    pub fn caused_by(message: impl Into<String>, cause: E) -> Self {
        Self { message: message.into(), cause: Some(cause) }
    }

    /// Attach (or replace) the underlying cause.
    pub fn with_cause(mut self, cause: E) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&E> {
        self.cause.as_ref()
    }

    pub fn into_cause(self) -> Option<E> {
        self.cause
    }

    /// Change the cause type, e.g. when a signal without a cause crosses an API boundary.
    pub fn map_cause<F, E2>(self, f: F) -> Unrecoverable<E2>
    where
        F: FnOnce(E) -> E2,
    {
        Unrecoverable { message: self.message, cause: self.cause.map(f) }
    }
}

impl<E> fmt::Display for Unrecoverable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Unrecoverable<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e as &dyn std::error::Error)
    }
}

/// How a single probe invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError<E> {
    /// Retried until the attempt budget runs out.
    Transient(E),
    /// Never retried.
    Unrecoverable(Unrecoverable<E>),
}

impl<E> ProbeError<E> {
    pub fn transient(error: E) -> Self {
        Self::Transient(error)
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable(Unrecoverable::new(message))
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}

impl<E> From<Unrecoverable<E>> for ProbeError<E> {
    fn from(signal: Unrecoverable<E>) -> Self {
        Self::Unrecoverable(signal)
    }
}

impl<E: fmt::Display> fmt::Display for ProbeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "{}", e),
            Self::Unrecoverable(signal) => write!(f, "unrecoverable: {}", signal),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ProbeError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient(e) => Some(e),
            Self::Unrecoverable(signal) => Some(signal),
        }
    }
}

/// Lift plain probe results into [`ProbeError`].
pub trait ProbeResultExt<T, E> {
    /// Treat the failure as retryable.
    fn transient(self) -> Result<T, ProbeError<E>>;
    /// Treat the failure as final, keeping it as the signal's cause.
    fn unrecoverable(self, message: impl Into<String>) -> Result<T, ProbeError<E>>;
}

impl<T, E> ProbeResultExt<T, E> for Result<T, E> {
    fn transient(self) -> Result<T, ProbeError<E>> {
        self.map_err(ProbeError::Transient)
    }

    fn unrecoverable(self, message: impl Into<String>) -> Result<T, ProbeError<E>> {
        self.map_err(|e| ProbeError::Unrecoverable(Unrecoverable::caused_by(message, e)))
    }
}

/// Terminal failure of one waiter invocation.
#[derive(Debug, Clone)]
pub enum WaitError<E> {
    /// The probe raised an unrecoverable signal; no further attempts were made.
    Unrecoverable { attempts: usize, signal: Unrecoverable<E> },
    /// Every attempt failed transiently; `last` is the failure from the final attempt.
    Exhausted { attempts: usize, last: E },
    /// The invocation was cancelled before it settled.
    Cancelled { attempts: usize },
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Stands in for the cause, so `source` does not repeat it.
            Self::Unrecoverable { signal, .. } => match signal.cause() {
                Some(cause) => write!(f, "{}", cause),
                None => write!(f, "{}", signal),
            },
            Self::Exhausted { attempts, .. } => {
                write!(f, "still not ready after {} attempts", attempts)
            }
            Self::Cancelled { attempts } => {
                write!(f, "wait cancelled after {} attempts", attempts)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for WaitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Unrecoverable { .. } | Self::Cancelled { .. } => None,
        }
    }
}

impl<E> WaitError<E> {
    /// Number of probe invocations started before the invocation settled.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Unrecoverable { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Borrow the failure the caller should act on: the unrecoverable cause, or the last
    /// transient failure.
    pub fn cause(&self) -> Option<&E> {
        match self {
            Self::Unrecoverable { signal, .. } => signal.cause(),
            Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }

    /// Take ownership of the failure returned by [`WaitError::cause`].
    pub fn into_cause(self) -> Option<E> {
        match self {
            Self::Unrecoverable { signal, .. } => signal.into_cause(),
            Self::Exhausted { last, .. } => Some(last),
            Self::Cancelled { .. } => None,
        }
    }

    /// Borrow the unrecoverable signal, if that is why the invocation stopped.
    pub fn signal(&self) -> Option<&Unrecoverable<E>> {
        match self {
            Self::Unrecoverable { signal, .. } => Some(signal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);
    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}

    #[test]
    fn unrecoverable_displays_cause_when_present() {
        let err = WaitError::Unrecoverable {
            attempts: 1,
            signal: Unrecoverable::caused_by("server died", DummyError("connection refused")),
        };
        assert_eq!(err.to_string(), "connection refused");
        assert!(err.source().is_none(), "cause must not appear twice in the chain");
        assert_eq!(err.cause(), Some(&DummyError("connection refused")));
    }

    #[test]
    fn unrecoverable_without_cause_displays_signal() {
        let err: WaitError<DummyError> =
            WaitError::Unrecoverable { attempts: 2, signal: Unrecoverable::new("server died") };
        assert_eq!(err.to_string(), "server died");
        assert!(err.source().is_none());
        assert!(err.cause().is_none());
        assert_eq!(err.signal().unwrap().message(), "server died");
    }

    #[test]
    fn exhausted_chains_last_error() {
        let err = WaitError::Exhausted { attempts: 5, last: DummyError("503") };
        assert_eq!(err.to_string(), "still not ready after 5 attempts");
        assert_eq!(err.source().unwrap().to_string(), "503");
        assert_eq!(err.attempts(), 5);
        assert!(err.is_exhausted());
    }

    #[test]
    fn cancelled_has_no_cause() {
        let err: WaitError<io::Error> = WaitError::Cancelled { attempts: 3 };
        assert!(err.is_cancelled());
        assert!(err.source().is_none());
        assert!(err.into_cause().is_none());
    }

    #[test]
    fn into_cause_extracts_error() {
        let err = WaitError::Unrecoverable {
            attempts: 1,
            signal: Unrecoverable::caused_by("fatal", io::Error::new(io::ErrorKind::Other, "x")),
        };
        assert!(err.is_unrecoverable());
        assert_eq!(err.into_cause().unwrap().to_string(), "x");
    }

    #[test]
    fn probe_result_ext_classifies_failures() {
        let transient: Result<(), _> = Err::<(), _>(DummyError("busy")).transient();
        assert_eq!(transient, Err(ProbeError::Transient(DummyError("busy"))));

        let fatal = Err::<(), _>(DummyError("gone")).unrecoverable("process exited");
        match fatal {
            Err(ProbeError::Unrecoverable(signal)) => {
                assert_eq!(signal.message(), "process exited");
                assert_eq!(signal.cause(), Some(&DummyError("gone")));
            }
            other => panic!("expected unrecoverable, got {:?}", other),
        }
    }

    #[test]
    fn signal_source_is_cause() {
        let signal = Unrecoverable::new("fatal").with_cause(DummyError("root"));
        assert_eq!(signal.source().unwrap().to_string(), "root");
        let mapped = signal.map_cause(|e| e.0.len());
        assert_eq!(mapped.cause(), Some(&4));
    }
}
