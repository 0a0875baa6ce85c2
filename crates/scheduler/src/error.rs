use thiserror::Error;

/// Errors raised synchronously by the scheduler at configuration time.
///
/// Action-body failures are never surfaced through this type — they are
/// captured by the runner and translated into a failed end point.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    NotRunning,

    #[error("point key is empty")]
    EmptyPointKey,

    #[error("unknown control point: {0}")]
    UnknownPoint(String),

    #[error("invalid point count: {0}")]
    InvalidPointCount(usize),

    #[error("action {action} is already registered on point {point}")]
    DuplicateRegistration { point: String, action: String },

    #[error("point {0} has already resolved")]
    PointResolved(String),
}
