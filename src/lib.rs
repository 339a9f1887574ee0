#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # waitready
//!
//! Wait for something to become ready: invoke an async probe until it succeeds, it reports an
//! unrecoverable failure, or a bounded number of attempts runs out. Attempts are paced evenly
//! across a total timeout budget.
//!
//! ## Features
//!
//! - **Fixed pacing**: the pause between attempts is `timeout / max_attempts`
//! - **Escape hatch**: probes raise [`Unrecoverable`] to stop retrying immediately
//! - **Explicit outcomes**: [`Outcome`] says why an invocation stopped
//! - **Cancellation** via `tokio_util::sync::CancellationToken`
//! - **Tower integration** through [`WaitLayer`]
//! - **Telemetry** events delivered to any `tower::Service<WaitEvent>`
//!
//! ## Quick Start
//!
//! ```rust
//! use waitready::{wait_until_ready, ProbeError, RetryBudget};
//!
//! #[tokio::main]
//! async fn main() {
//!     let budget = RetryBudget::from_millis(1000, 5).unwrap();
//!
//!     let port = wait_until_ready(
//!         || async {
//!             // Ask your server whether it is up yet
//!             Ok::<_, ProbeError<std::io::Error>>(9090)
//!         },
//!         budget,
//!     )
//!     .await
//!     .unwrap();
//!     assert_eq!(port, 9090);
//! }
//! ```

pub mod budget;
pub mod error;
pub mod layer;
pub mod prelude;
pub mod readiness;
pub mod sleeper;
pub mod telemetry;
pub mod waiter;

// Re-exports
pub use budget::{BudgetError, RetryBudget};
pub use error::{ProbeError, ProbeResultExt, Unrecoverable, WaitError};
pub use layer::{WaitLayer, WaitService};
pub use sleeper::{Pause, RecordingSleeper, Sleeper, TokioSleeper};
pub use telemetry::WaitEvent;
pub use tokio_util::sync::CancellationToken;
pub use waiter::{wait_until_ready, Outcome, StopReason, Waiter, WaiterBuilder};
