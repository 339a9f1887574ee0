//! Convenient re-exports for writing probes and configuring waiters.
pub use crate::{
    budget::{BudgetError, RetryBudget},
    error::{ProbeError, ProbeResultExt, Unrecoverable, WaitError},
    layer::WaitLayer,
    readiness::ProcessState,
    waiter::{wait_until_ready, Outcome, StopReason, Waiter},
    CancellationToken,
};
