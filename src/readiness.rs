//! Status reports for a managed server process.
//!
//! A readiness probe typically asks a supervisor for the state of the process it started and
//! only then tries to reach the process itself. [`ProcessState::check`] turns a dead or failed
//! process into an [`Unrecoverable`] signal, so the waiter stops instead of burning its budget
//! on something that will never come up.
//!
//! ```rust
//! use waitready::readiness::ProcessState;
//!
//! let state = ProcessState::with_status("zombie").returncode(1);
//! let signal = state.check::<std::io::Error>().unwrap_err();
//! assert!(signal.message().contains("Exit code 1."));
//! ```

use crate::error::Unrecoverable;
use std::fmt;
use tracing::warn;

/// Status string of a process that is up.
pub const STATUS_RUNNING: &str = "running";
/// Status strings of a process that is up but idle; still counts as alive.
pub const STATUS_SLEEPING: [&str; 2] = ["sleeping", "disk-sleep"];

/// Classified process status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Sleeping,
    /// Anything else, or no status at all.
    Failed(Option<String>),
}

impl ProcessStatus {
    pub fn is_alive(&self) -> bool {
        !matches!(self, ProcessStatus::Failed(_))
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::Sleeping => f.write_str("sleeping"),
            ProcessStatus::Failed(Some(status)) => write!(f, "failed ({})", status),
            ProcessStatus::Failed(None) => f.write_str("failed"),
        }
    }
}

/// State of a server process as reported by its supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcessState {
    pub status: Option<String>,
    pub stderr: Option<String>,
    pub returncode: Option<i64>,
    pub cmdline: Option<Vec<String>>,
    pub port: Option<u16>,
}

impl ProcessState {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()), ..Self::default() }
    }

    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    pub fn returncode(mut self, code: i64) -> Self {
        self.returncode = Some(code);
        self
    }

    pub fn cmdline<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.cmdline = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn classify(&self) -> ProcessStatus {
        match self.status.as_deref() {
            Some(STATUS_RUNNING) => ProcessStatus::Running,
            Some(s) if STATUS_SLEEPING.contains(&s) => ProcessStatus::Sleeping,
            other => ProcessStatus::Failed(other.map(str::to_owned)),
        }
    }

    /// `Ok` while the process is alive, otherwise an unrecoverable signal describing why not.
    pub fn check<E>(&self) -> Result<(), Unrecoverable<E>> {
        match self.classify() {
            ProcessStatus::Running => Ok(()),
            ProcessStatus::Sleeping => {
                warn!(status = ?self.status, port = ?self.port, "server process is sleeping");
                Ok(())
            }
            ProcessStatus::Failed(_) => Err(Unrecoverable::new(self.failure_message())),
        }
    }

    fn failure_message(&self) -> String {
        let mut message =
            String::from("Server process could not be started or terminated unexpectedly.");
        if let Some(stderr) = &self.stderr {
            message.push_str(&format!(" Message: {}.", stderr));
        }
        if let Some(code) = self.returncode {
            message.push_str(&format!(" Exit code {}.", code));
        }
        if let Some(status) = &self.status {
            message.push_str(&format!(" Status: {}.", status));
        }
        if let Some(cmdline) = &self.cmdline {
            message.push_str(&format!(" Command-line: \"{}\".", cmdline.join(" ")));
        }
        message
    }
}
