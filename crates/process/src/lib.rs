//! labflow-process — a composable process algebra on top of the
//! labflow scheduler.
//!
//! A [`Process`] is a stateful unit driven by the commit/join protocol;
//! [`run_process`] drives one to exhaustion. [`SimpleProcess`] wraps a
//! single async body, and the combinators compose:
//! [`SeriesProcess`] runs children one after another,
//! [`ParallelProcess`] runs them concurrently, [`SwitchProcess`] picks one
//! branch per cycle, and [`SweepProcess`] repeats a body while a sweeper
//! keeps re-arming it. A [`DataGroup`] threads shared key/value state
//! through a process tree.

pub mod data;
pub mod error;
pub mod parallel;
pub mod process;
pub mod series;
pub mod simple;
pub mod sweep;
pub mod switch;

pub use data::DataGroup;
pub use error::ProcessError;
pub use parallel::ParallelProcess;
pub use process::{run_process, Process, ProcessSnapshot};
pub use series::SeriesProcess;
pub use simple::{AbortSignal, SimpleContext, SimpleProcess};
pub use sweep::SweepProcess;
pub use switch::{SwitchProcess, Switcher};
