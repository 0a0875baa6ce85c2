use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Tri-state outcome of a control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PointStatus {
    /// Whether the point has resolved (either way).
    pub fn is_done(self) -> bool {
        self != PointStatus::Pending
    }
}

/// Why a control point resolved as failed.
#[derive(Debug, Clone)]
pub enum PointFailure {
    /// An incoming action reported an error.
    Error(Arc<anyhow::Error>),
    /// Forcibly cancelled; `source` names the canceller (runner id or "scheduler").
    Cancelled { source: String },
}

impl fmt::Display for PointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointFailure::Error(e) => write!(f, "{e}"),
            PointFailure::Cancelled { source } => write!(f, "cancelled by {source}"),
        }
    }
}

#[derive(Default)]
struct PointState {
    /// Fan-in reference count: incoming actions not yet finished.
    pending: usize,
    incoming: Vec<String>,
    outgoing: Vec<String>,
    failure: Option<PointFailure>,
}

/// A fan-in synchronization marker.
///
/// Each incoming action self-registers via [`add_previous`](Self::add_previous)
/// when committed and reports completion via [`finish`](Self::finish). The
/// point succeeds once every registered action has finished cleanly; it fails
/// as soon as any one reports an error (first resolution wins, later
/// resolutions are no-ops).
///
/// Resolution is published through a `watch` channel, so any number of
/// waiters observe it, including waiters that subscribe after the fact.
pub struct ControlPoint {
    id: String,
    tx: watch::Sender<PointStatus>,
    state: Mutex<PointState>,
}

impl ControlPoint {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tx: watch::Sender::new(PointStatus::Pending),
            state: Mutex::new(PointState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> PointStatus {
        *self.tx.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// The failure cause, if the point resolved as failed.
    pub fn failure(&self) -> Option<PointFailure> {
        self.state.lock().unwrap().failure.clone()
    }

    /// Number of registered incoming actions that have not yet finished.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending
    }

    /// Register an incoming action that must finish before this point can
    /// succeed. Increments the fan-in count.
    pub fn add_previous(&self, action_id: &str) -> Result<(), SchedulerError> {
        let mut st = self.state.lock().unwrap();
        if self.status().is_done() {
            return Err(SchedulerError::PointResolved(self.id.clone()));
        }
        if action_id.is_empty() || st.incoming.iter().any(|a| a == action_id) {
            return Err(SchedulerError::DuplicateRegistration {
                point: self.id.clone(),
                action: action_id.to_string(),
            });
        }
        st.incoming.push(action_id.to_string());
        st.pending += 1;
        Ok(())
    }

    /// Record a downstream action gated on this point. Introspection only —
    /// never consulted for control decisions.
    pub fn add_post(&self, action_id: &str) -> Result<(), SchedulerError> {
        let mut st = self.state.lock().unwrap();
        if action_id.is_empty() || st.outgoing.iter().any(|a| a == action_id) {
            return Err(SchedulerError::DuplicateRegistration {
                point: self.id.clone(),
                action: action_id.to_string(),
            });
        }
        st.outgoing.push(action_id.to_string());
        Ok(())
    }

    /// Undo an [`add_post`](Self::add_post) registration.
    pub(crate) fn remove_post(&self, action_id: &str) {
        self.state.lock().unwrap().outgoing.retain(|a| a != action_id);
    }

    /// Report completion of one registered incoming action.
    ///
    /// A non-`None` error resolves the point as failed immediately,
    /// regardless of the fan-in count. A clean completion decrements the
    /// count; reaching zero resolves the point as succeeded. No-op once
    /// resolved.
    pub fn finish(&self, error: Option<Arc<anyhow::Error>>) {
        let mut st = self.state.lock().unwrap();
        if self.status().is_done() {
            return;
        }
        match error {
            Some(e) => {
                warn!(point = %self.id, error = %e, "control point failed");
                st.failure = Some(PointFailure::Error(e));
                self.tx.send_replace(PointStatus::Failed);
            }
            None => {
                if st.pending > 0 {
                    st.pending -= 1;
                    if st.pending == 0 {
                        debug!(point = %self.id, "control point succeeded");
                        self.tx.send_replace(PointStatus::Succeeded);
                    }
                }
            }
        }
    }

    /// Forcibly resolve the point as failed. No-op once resolved.
    pub fn cancel(&self, source: &str) {
        let mut st = self.state.lock().unwrap();
        if self.status().is_done() {
            return;
        }
        warn!(point = %self.id, source = %source, "control point cancelled");
        st.failure = Some(PointFailure::Cancelled {
            source: source.to_string(),
        });
        self.tx.send_replace(PointStatus::Failed);
    }

    /// Wait until the point resolves or `timeout` elapses.
    ///
    /// Returns `Pending` on timeout; otherwise the resolved status. A failed
    /// point is a normal observable outcome, not an error — this never
    /// propagates the stored failure.
    pub async fn wait(&self, timeout: Option<Duration>) -> PointStatus {
        let mut rx = self.tx.subscribe();
        let resolved = rx.wait_for(|s| s.is_done());
        match timeout {
            Some(t) => {
                let _ = tokio::time::timeout(t, resolved).await;
            }
            None => {
                let _ = resolved.await;
            }
        }
        self.status()
    }

    /// Diagnostic snapshot.
    pub fn snapshot(&self) -> PointSnapshot {
        let st = self.state.lock().unwrap();
        PointSnapshot {
            kind: "ControlPoint",
            id: self.id.clone(),
            status: self.status(),
            pending_count: st.pending,
            previous: st.incoming.clone(),
            posts: st.outgoing.clone(),
            failure: st.failure.as_ref().map(|f| f.to_string()),
        }
    }
}

/// Serializable view of a [`ControlPoint`].
#[derive(Debug, Clone, Serialize)]
pub struct PointSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub status: PointStatus,
    pub pending_count: usize,
    pub previous: Vec<String>,
    pub posts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_counts_fan_in() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.add_previous("b").unwrap();
        assert_eq!(point.pending_count(), 2);
        assert_eq!(point.status(), PointStatus::Pending);
    }

    #[test]
    fn duplicate_registration_is_error() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        assert!(matches!(
            point.add_previous("a"),
            Err(SchedulerError::DuplicateRegistration { .. })
        ));
        point.add_post("z").unwrap();
        assert!(point.add_post("z").is_err());
    }

    #[test]
    fn empty_action_id_is_error() {
        let point = ControlPoint::new();
        assert!(point.add_previous("").is_err());
    }

    #[test]
    fn succeeds_when_all_incoming_finish() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.add_previous("b").unwrap();
        point.add_previous("c").unwrap();

        point.finish(None);
        point.finish(None);
        assert_eq!(point.status(), PointStatus::Pending);
        point.finish(None);
        assert_eq!(point.status(), PointStatus::Succeeded);
    }

    #[test]
    fn first_failure_wins() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.add_previous("b").unwrap();

        point.finish(Some(Arc::new(anyhow::anyhow!("probe disconnected"))));
        assert_eq!(point.status(), PointStatus::Failed);

        // Later completions (clean or failed) are no-ops.
        point.finish(None);
        point.finish(Some(Arc::new(anyhow::anyhow!("other"))));
        assert_eq!(point.status(), PointStatus::Failed);
        let failure = point.failure().unwrap();
        assert!(failure.to_string().contains("probe disconnected"));
    }

    #[test]
    fn zero_registrations_never_succeeds_alone() {
        let point = ControlPoint::new();
        point.finish(None);
        assert_eq!(point.status(), PointStatus::Pending);
    }

    #[test]
    fn registration_after_resolution_is_error() {
        let point = ControlPoint::new();
        point.cancel("test");
        assert!(matches!(
            point.add_previous("a"),
            Err(SchedulerError::PointResolved(_))
        ));
    }

    #[test]
    fn cancel_is_idempotent() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.finish(None);
        assert_eq!(point.status(), PointStatus::Succeeded);
        point.cancel("late");
        assert_eq!(point.status(), PointStatus::Succeeded);
    }

    #[tokio::test]
    async fn wait_zero_timeout_reports_pending() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        let status = point.wait(Some(Duration::ZERO)).await;
        assert_eq!(status, PointStatus::Pending);
    }

    #[tokio::test]
    async fn wait_on_resolved_point_returns_immediately() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.finish(None);
        // No timeout: must not suspend on an already-resolved point.
        let status = point.wait(None).await;
        assert_eq!(status, PointStatus::Succeeded);
    }

    #[tokio::test]
    async fn wait_observes_late_resolution() {
        let point = Arc::new(ControlPoint::new());
        point.add_previous("a").unwrap();

        let waiter = point.clone();
        let handle = tokio::spawn(async move { waiter.wait(None).await });
        tokio::task::yield_now().await;

        point.finish(None);
        assert_eq!(handle.await.unwrap(), PointStatus::Succeeded);
    }

    #[test]
    fn snapshot_reflects_state() {
        let point = ControlPoint::new();
        point.add_previous("a").unwrap();
        point.add_post("b").unwrap();
        let snap = point.snapshot();
        assert_eq!(snap.previous, vec!["a".to_string()]);
        assert_eq!(snap.posts, vec!["b".to_string()]);
        assert_eq!(snap.pending_count, 1);
        assert_eq!(snap.status, PointStatus::Pending);
    }
}
