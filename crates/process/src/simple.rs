use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use labflow_scheduler::{Action, BodyResult, PointStatus, Scheduler};

use crate::data::DataGroup;
use crate::error::ProcessError;
use crate::process::{Process, ProcessSnapshot};

/// Cooperative abort request handed to a [`SimpleProcess`] body.
///
/// Raised when `reset()` is called while the body is in flight; the body is
/// expected to check it at its own checkpoints and return early — the
/// scheduler never kills the body mid-flight for an abort.
#[derive(Clone)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn is_aborting(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a simple process body gets to see: the abort signal and the
/// bound data container (if any).
pub struct SimpleContext {
    pub abort: AbortSignal,
    pub data: Option<DataGroup>,
}

type SimpleBody = Arc<dyn Fn(SimpleContext) -> BoxFuture<'static, BodyResult> + Send + Sync>;

/// A leaf process wrapping one async unit of work.
///
/// Each commit acquires a fresh end point and schedules the body as a single
/// [`Action`]; `has_more` stays true until one run completes cleanly without
/// an abort. The body closure is re-invocable so the process can be reset
/// and rerun (sweep loops rely on this).
pub struct SimpleProcess {
    name: String,
    begin_point: String,
    end_point: String,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    aborting: Arc<AtomicBool>,
    body: SimpleBody,
    group: Option<DataGroup>,
}

impl SimpleProcess {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(SimpleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            begin_point: String::new(),
            end_point: String::new(),
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            aborting: Arc::new(AtomicBool::new(false)),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
            group: None,
        }
    }

    /// Gate the next run on an externally acquired control point.
    /// Consumed by that run; cannot be changed while pending.
    pub fn set_begin_point(&mut self, point: impl Into<String>) -> Result<(), ProcessError> {
        if self.is_pending() {
            return Err(ProcessError::MutateWhilePending("begin point"));
        }
        self.begin_point = point.into();
        Ok(())
    }

    pub fn begin_point(&self) -> &str {
        &self.begin_point
    }

    /// End point of the last committed run. Generated at commit time.
    pub fn end_point(&self) -> &str {
        &self.end_point
    }

    pub fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Process for SimpleProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if self.finished.load(Ordering::SeqCst) || self.running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let point = scheduler.acquire_point();
        let ctx = SimpleContext {
            abort: AbortSignal(self.aborting.clone()),
            data: self.group.clone(),
        };
        let body = self.body.clone();
        let finished = self.finished.clone();
        let aborting = self.aborting.clone();
        let action = Action::new(self.begin_point.clone(), point.clone(), async move {
            let result = body(ctx).await;
            // An aborted run is not finished: the next commit reruns it.
            let aborted = aborting.swap(false, Ordering::SeqCst);
            if result.is_ok() && !aborted {
                finished.store(true, Ordering::SeqCst);
            }
            result
        })
        .with_label(self.name.clone());

        // The spawned body can complete before commit_action returns, so
        // the flags must already be in place; `running` is cleared only in
        // join, once the end point has resolved.
        self.running.store(true, Ordering::SeqCst);
        self.aborting.store(false, Ordering::SeqCst);
        let committed = match scheduler.commit_action(action) {
            Ok(committed) => committed,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        if committed {
            self.end_point = point;
            self.begin_point.clear();
        } else {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(committed)
    }

    fn is_pending(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if self.end_point.is_empty() {
            return Ok(false);
        }
        let status = scheduler.wait_point(&self.end_point, None).await;
        // The run is over either way; a dead scheduler still unblocks us.
        self.running.store(false, Ordering::SeqCst);
        Ok(status? == PointStatus::Succeeded)
    }

    fn has_more(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    fn reset(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            self.aborting.store(true, Ordering::SeqCst);
        } else {
            self.finished.store(false, Ordering::SeqCst);
        }
    }

    fn data_group(&self) -> Option<&DataGroup> {
        self.group.as_ref()
    }

    fn bind_data_group(&mut self, group: Option<DataGroup>) -> Result<(), ProcessError> {
        if self.is_pending() {
            return Err(ProcessError::MutateWhilePending("data group"));
        }
        self.group = group;
        Ok(())
    }

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot::leaf("SimpleProcess", &self.name, self.is_pending(), self.has_more())
    }
}
