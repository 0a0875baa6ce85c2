use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use labflow_scheduler::Scheduler;

use crate::data::DataGroup;
use crate::error::ProcessError;

/// A stateful, possibly multi-round unit of scheduling.
///
/// The protocol every process — leaf or composite — satisfies:
/// 1. `commit` a bounded batch of actions into the scheduler (non-blocking;
///    returns `Ok(false)` when there is nothing to commit, e.g. while
///    already pending),
/// 2. `join` until the committed batch resolves, reporting success,
/// 3. consult `has_more`, and if true go back to 1.
///
/// `has_more` must be callable at any time, including right after
/// construction and after every commit/join cycle. `reset` returns the
/// process to its initial state; resetting while pending instead requests
/// an abort of the in-flight work.
#[async_trait]
pub trait Process: Send {
    fn name(&self) -> &str;

    /// Commit the next batch of actions. `Err` is a configuration problem;
    /// `Ok(false)` just means nothing was committed this round.
    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError>;

    /// Whether committed-but-unfinished actions exist.
    fn is_pending(&self) -> bool;

    /// Wait until whatever was committed resolves; `Ok(true)` on success.
    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError>;

    /// Whether more work remains.
    fn has_more(&self) -> bool;

    /// Return to the initial state (or request an abort while pending).
    fn reset(&mut self);

    fn data_group(&self) -> Option<&DataGroup>;

    /// Bind (or unbind) the shared data container. Composites cascade the
    /// binding to their children. Fails while pending.
    fn bind_data_group(&mut self, group: Option<DataGroup>) -> Result<(), ProcessError>;

    /// Diagnostic snapshot; composites nest their children's snapshots.
    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot::leaf("Process", self.name(), self.is_pending(), self.has_more())
    }
}

/// Serializable view of a [`Process`] tree.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub pending: bool,
    pub more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ProcessSnapshot>>,
}

impl ProcessSnapshot {
    pub fn leaf(kind: &'static str, name: &str, pending: bool, more: bool) -> Self {
        Self {
            kind,
            name: name.to_string(),
            pending,
            more,
            children: None,
        }
    }

    pub fn with_children(mut self, children: Vec<ProcessSnapshot>) -> Self {
        self.children = Some(children);
        self
    }
}

/// Drive a process to exhaustion: reset, then commit/join until `has_more`
/// goes false or a round fails. Returns overall success and elapsed time.
///
/// Finer-grained failure causes are available via `snapshot()` on the
/// process or the scheduler, not through the return value.
pub async fn run_process<P>(process: &mut P, scheduler: &Scheduler, verbose: bool) -> (bool, Duration)
where
    P: Process + ?Sized,
{
    process.reset();
    if verbose {
        info!(process = %process.name(), "process run started");
    }
    let start = Instant::now();
    let mut ticks = 0u32;
    let mut success = true;

    while process.has_more() {
        if let Err(e) = process.commit(scheduler) {
            warn!(process = %process.name(), error = %e, tick = ticks, "commit failed");
            success = false;
            break;
        }
        match process.join(scheduler).await {
            Ok(true) => ticks += 1,
            Ok(false) => {
                warn!(process = %process.name(), tick = ticks, "join reported failure");
                success = false;
                break;
            }
            Err(e) => {
                warn!(process = %process.name(), error = %e, tick = ticks, "join failed");
                success = false;
                break;
            }
        }
    }

    let elapsed = start.elapsed();
    if verbose {
        info!(
            process = %process.name(),
            success,
            ticks,
            elapsed = ?elapsed,
            "process run finished"
        );
    }
    (success, elapsed)
}
