use thiserror::Error;

use labflow_scheduler::SchedulerError;

/// Errors raised by process construction and commit/join bookkeeping.
///
/// A child failing to *run* is not an error — that surfaces as a `false`
/// join result. These are configuration mistakes the caller must fix.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("switch index {index} out of range for {len} children")]
    SwitchIndex { index: usize, len: usize },

    #[error("cannot change {0} while process is pending")]
    MutateWhilePending(&'static str),
}
