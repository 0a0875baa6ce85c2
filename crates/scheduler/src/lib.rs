//! labflow-scheduler — dependency-graph executor for laboratory
//! measurement sequences.
//!
//! Callers acquire [`ControlPoint`] keys from a [`Scheduler`], construct
//! [`Action`]s gated on those points and commit them. Each committed action
//! runs as its own tokio task wrapped in an [`ActionRunner`]: it awaits its
//! begin point, executes its body (off-loaded to the blocking pool for
//! `to_thread` work), and signals its end point with the outcome. Fan-in is
//! reference-counted on the point; fan-out is free concurrency.

pub mod action;
pub mod config;
pub mod error;
pub mod point;
pub mod runner;
pub mod scheduler;

pub use action::{Action, ActionBody, ActionMeta, ActionSnapshot, BodyResult};
pub use config::{load_dotenv, SchedulerConfig};
pub use error::SchedulerError;
pub use point::{ControlPoint, PointFailure, PointSnapshot, PointStatus};
pub use runner::{ActionRunner, RunnerSnapshot};
pub use scheduler::{global, Scheduler, SchedulerSnapshot};
