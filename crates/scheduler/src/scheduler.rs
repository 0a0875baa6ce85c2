use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::point::{ControlPoint, PointStatus};
use crate::runner::ActionRunner;

struct Inner {
    points: HashMap<String, Arc<ControlPoint>>,
    runners: HashMap<String, Arc<ActionRunner>>,
    started_at: Option<DateTime<Utc>>,
}

/// The dependency-graph executor.
///
/// Owns the live sets of [`ControlPoint`]s and [`ActionRunner`]s. Callers
/// acquire points, commit [`Action`]s referencing them, and wait on points;
/// the DAG's ordering emerges from each runner awaiting its begin point —
/// there is no topological sort, and cycles are not detected (they deadlock).
///
/// The handle is cheap to clone; all clones share the same engine. Runners
/// are spawned onto the ambient tokio runtime, so `commit_action` must be
/// called from within one.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    running: Arc<AtomicBool>,
    /// Bounds concurrently off-loaded blocking bodies.
    limiter: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create an isolated scheduler instance (tests and embedded use).
    /// Shared-by-convention callers go through [`global`].
    pub fn new(config: SchedulerConfig) -> Self {
        let limit = config.resolved_blocking_limit();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                points: HashMap::new(),
                runners: HashMap::new(),
                started_at: None,
            })),
            running: Arc::new(AtomicBool::new(false)),
            limiter: Arc::new(Semaphore::new(limit)),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Start accepting commits and waits.
    pub fn start(&self) -> bool {
        self.inner.lock().unwrap().started_at.get_or_insert_with(Utc::now);
        self.running.store(true, Ordering::SeqCst);
        info!("scheduler started");
        true
    }

    /// Unconditional teardown: cancel every live runner, then every live
    /// point, clear both maps and flip to not running. Not a graceful drain.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        for runner in inner.runners.values() {
            runner.cancel();
        }
        inner.runners.clear();
        for point in inner.points.values() {
            point.cancel("scheduler");
        }
        inner.points.clear();
        self.running.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Create and register a new control point, returning its key.
    pub fn acquire_point(&self) -> String {
        let point = Arc::new(ControlPoint::new());
        let key = point.id().to_string();
        self.inner.lock().unwrap().points.insert(key.clone(), point);
        key
    }

    /// Acquire `count` fresh control points. `count == 0` is a
    /// configuration error.
    pub fn acquire_points(&self, count: usize) -> Result<Vec<String>, SchedulerError> {
        if count == 0 {
            return Err(SchedulerError::InvalidPointCount(count));
        }
        Ok((0..count).map(|_| self.acquire_point()).collect())
    }

    /// Look up a live control point for introspection.
    pub fn point(&self, key: &str) -> Option<Arc<ControlPoint>> {
        self.inner.lock().unwrap().points.get(key).cloned()
    }

    /// Look up a live action runner for introspection.
    pub fn runner(&self, id: &str) -> Option<Arc<ActionRunner>> {
        self.inner.lock().unwrap().runners.get(id).cloned()
    }

    /// Commit an action: resolve its point keys, bind a runner and spawn it.
    ///
    /// Returns `Ok(false)` when the scheduler is not running (the action is
    /// dropped). A non-empty key that names no live point is a configuration
    /// error.
    pub fn commit_action(&self, action: Action) -> Result<bool, SchedulerError> {
        if !self.is_running() {
            warn!("scheduler is not running, action dropped");
            return Ok(false);
        }
        let (meta, body) = action.into_parts();
        let (prev, post) = {
            let inner = self.inner.lock().unwrap();
            let resolve = |key: &str| -> Result<Option<Arc<ControlPoint>>, SchedulerError> {
                if key.is_empty() {
                    return Ok(None);
                }
                inner
                    .points
                    .get(key)
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| SchedulerError::UnknownPoint(key.to_string()))
            };
            (resolve(&meta.begin_point)?, resolve(&meta.end_point)?)
        };

        let runner = ActionRunner::bind(meta, body, prev, post)?;
        self.inner
            .lock()
            .unwrap()
            .runners
            .insert(runner.id().to_string(), runner.clone());

        let scheduler = self.clone();
        let spawned = runner.clone();
        let task = tokio::spawn(async move {
            spawned.execute(scheduler.limiter.clone()).await;
            scheduler.finish_action(spawned.id());
        });
        runner.set_abort(task.abort_handle());
        debug!(runner = %runner.id(), label = %runner.label(), "action committed");
        Ok(true)
    }

    /// Wait until the named point resolves or `timeout` elapses.
    ///
    /// Returns `Pending` on timeout without affecting the underlying
    /// computation. A failed point is reported as a status, never an error.
    pub async fn wait_point(
        &self,
        point: &str,
        timeout: Option<Duration>,
    ) -> Result<PointStatus, SchedulerError> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        if point.is_empty() {
            return Err(SchedulerError::EmptyPointKey);
        }
        let live = self
            .inner
            .lock()
            .unwrap()
            .points
            .get(point)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownPoint(point.to_string()))?;
        Ok(live.wait(timeout).await)
    }

    /// Drop all points whose completion signal has already resolved, to
    /// bound memory growth in long-running sessions.
    pub fn clear_done_points(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.points.retain(|_, point| !point.is_done());
    }

    /// Completion callback: drop the runner from the live set and propagate
    /// its outcome to the post point.
    fn finish_action(&self, action_id: &str) {
        let runner = self.inner.lock().unwrap().runners.remove(action_id);
        if let Some(runner) = runner {
            if self.config.verbose_actions {
                info!(runner = %action_id, label = %runner.label(), status = ?runner.status(), "action finished");
            } else {
                debug!(runner = %action_id, label = %runner.label(), status = ?runner.status(), "action finished");
            }
            runner.trigger_post();
        }
    }

    /// Diagnostic snapshot: point/runner counts, active vs. done split.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let inner = self.inner.lock().unwrap();
        let done = inner.points.values().filter(|p| p.is_done()).count();
        SchedulerSnapshot {
            kind: "Scheduler",
            is_running: self.is_running(),
            point_count: inner.points.len(),
            done_point_count: done,
            active_point_count: inner.points.len() - done,
            runner_count: inner.runners.len(),
            started_at: inner.started_at,
        }
    }
}

/// Serializable view of the [`Scheduler`]'s live state.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub is_running: bool,
    pub point_count: usize,
    pub done_point_count: usize,
    pub active_point_count: usize,
    pub runner_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// The process-wide scheduler, created lazily from env config on first use.
/// Callers still decide when to [`start`](Scheduler::start) it. Tests should
/// prefer isolated [`Scheduler::new`] instances.
pub fn global() -> &'static Scheduler {
    GLOBAL.get_or_init(|| Scheduler::new(SchedulerConfig::from_env()))
}
