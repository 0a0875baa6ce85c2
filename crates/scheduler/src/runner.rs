use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::action::{ActionBody, ActionMeta, ActionSnapshot};
use crate::error::SchedulerError;
use crate::point::{ControlPoint, PointStatus};

struct RunnerState {
    status: PointStatus,
    error: Option<Arc<anyhow::Error>>,
    /// Present until the body has been taken for execution.
    body: Option<ActionBody>,
    abort: Option<AbortHandle>,
    triggered: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// The live execution wrapper binding one committed [`Action`](crate::Action)
/// to its optional predecessor and successor control points.
///
/// Registration happens at bind time: the runner records itself as a post
/// action of `prev` and as an incoming action of `post`. Execution (driven by
/// the scheduler as a spawned task) awaits `prev`, runs the body, records the
/// terminal status exactly once, and leaves outcome propagation to
/// [`trigger_post`](Self::trigger_post).
pub struct ActionRunner {
    id: String,
    meta: ActionMeta,
    prev: Option<Arc<ControlPoint>>,
    post: Option<Arc<ControlPoint>>,
    state: Mutex<RunnerState>,
}

impl std::fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRunner")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl ActionRunner {
    /// Bind a committed action to its control points, registering the runner
    /// on both. Fails on duplicate registration or an already-resolved post.
    pub(crate) fn bind(
        meta: ActionMeta,
        body: ActionBody,
        prev: Option<Arc<ControlPoint>>,
        post: Option<Arc<ControlPoint>>,
    ) -> Result<Arc<Self>, SchedulerError> {
        let id = Uuid::new_v4().to_string();
        if let Some(p) = &prev {
            p.add_post(&id)?;
        }
        if let Some(p) = &post {
            if let Err(e) = p.add_previous(&id) {
                // A rejected bind must leave no trace on the prev point.
                if let Some(prev) = &prev {
                    prev.remove_post(&id);
                }
                return Err(e);
            }
        }
        Ok(Arc::new(Self {
            id,
            meta,
            prev,
            post,
            state: Mutex::new(RunnerState {
                status: PointStatus::Pending,
                error: None,
                body: Some(body),
                abort: None,
                triggered: false,
                started_at: None,
                finished_at: None,
            }),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.meta.label
    }

    pub fn status(&self) -> PointStatus {
        self.state.lock().unwrap().status
    }

    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// The captured body error, if the action failed with one.
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.state.lock().unwrap().error.clone()
    }

    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        self.state.lock().unwrap().abort = Some(handle);
    }

    /// Await the predecessor point (if any), then run the body.
    ///
    /// Body errors and panics are captured into the runner state, never
    /// re-raised. Blocking bodies are dispatched to the blocking pool under
    /// `limiter` so off-loaded work stays bounded.
    pub(crate) async fn execute(&self, limiter: Arc<Semaphore>) {
        let gate_open = match &self.prev {
            Some(p) => p.wait(None).await == PointStatus::Succeeded,
            None => true,
        };
        if !gate_open {
            // Predecessor never succeeded: fail without an error of our own
            // so trigger_post cancels (rather than errors) the post point.
            debug!(runner = %self.id, label = %self.meta.label, "predecessor failed, skipping body");
            self.complete(None, false);
            return;
        }

        let body = {
            let mut st = self.state.lock().unwrap();
            if st.status.is_done() {
                return;
            }
            st.started_at = Some(Utc::now());
            st.body.take()
        };
        let Some(body) = body else {
            return;
        };

        let result = match body {
            ActionBody::Future(fut) => match std::panic::AssertUnwindSafe(fut)
                .catch_unwind()
                .await
            {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!("action body panicked")),
            },
            ActionBody::Blocking(f) => {
                let _permit = limiter.acquire_owned().await.ok();
                match tokio::task::spawn_blocking(f).await {
                    Ok(r) => r,
                    Err(e) => Err(anyhow::anyhow!("blocking action body panicked: {e}")),
                }
            }
        };

        match result {
            Ok(()) => self.complete(None, true),
            Err(e) => {
                error!(runner = %self.id, label = %self.meta.label, error = %e, "action body failed");
                self.complete(Some(Arc::new(e)), false);
            }
        }
    }

    fn complete(&self, error: Option<Arc<anyhow::Error>>, ok: bool) {
        let mut st = self.state.lock().unwrap();
        if st.status.is_done() {
            return;
        }
        st.status = if ok {
            PointStatus::Succeeded
        } else {
            PointStatus::Failed
        };
        st.error = error;
        st.finished_at = Some(Utc::now());
    }

    /// Propagate the terminal outcome to the post point: success finishes it,
    /// a captured error fails it, cancellation (failure without an error)
    /// cancels it. Safe to call at most once per runner; a no-op before the
    /// runner is done or after the post point has resolved.
    pub(crate) fn trigger_post(&self) {
        let (status, error) = {
            let mut st = self.state.lock().unwrap();
            if st.triggered || !st.status.is_done() {
                return;
            }
            st.triggered = true;
            (st.status, st.error.clone())
        };
        if let Some(post) = &self.post {
            match (status, error) {
                (PointStatus::Succeeded, _) => post.finish(None),
                (PointStatus::Failed, Some(e)) => post.finish(Some(e)),
                (PointStatus::Failed, None) => post.cancel(&self.id),
                (PointStatus::Pending, _) => unreachable!(),
            }
        }
    }

    /// Mark the runner failed/cancelled and abort its in-flight task.
    pub(crate) fn cancel(&self) {
        let mut st = self.state.lock().unwrap();
        if st.status.is_done() {
            return;
        }
        st.status = PointStatus::Failed;
        st.finished_at = Some(Utc::now());
        if let Some(abort) = st.abort.take() {
            abort.abort();
        }
    }

    /// Diagnostic snapshot.
    pub fn snapshot(&self) -> RunnerSnapshot {
        let st = self.state.lock().unwrap();
        RunnerSnapshot {
            kind: "ActionRunner",
            id: self.id.clone(),
            action: self.meta.snapshot(),
            status: st.status,
            error: st.error.as_ref().map(|e| e.to_string()),
            started_at: st.started_at,
            finished_at: st.finished_at,
        }
    }
}

/// Serializable view of an [`ActionRunner`].
#[derive(Debug, Clone, Serialize)]
pub struct RunnerSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub action: ActionSnapshot,
    pub status: PointStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
