use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;

/// Outcome of an action body. Failures are opaque to the scheduler — it
/// only forwards them into the failed resolution of the end point.
pub type BodyResult = anyhow::Result<()>;

/// The executable payload of an [`Action`].
///
/// `Future` bodies run cooperatively on the scheduler's runtime. `Blocking`
/// bodies wrap synchronous calls (e.g. instrument I/O) and are dispatched
/// to the blocking pool so they never stall the event loop.
pub enum ActionBody {
    Future(BoxFuture<'static, BodyResult>),
    Blocking(Box<dyn FnOnce() -> BodyResult + Send + 'static>),
}

impl ActionBody {
    /// Whether this body must run off the cooperative scheduler thread.
    pub fn to_thread(&self) -> bool {
        matches!(self, ActionBody::Blocking(_))
    }
}

impl fmt::Debug for ActionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionBody::Future(_) => f.write_str("ActionBody::Future"),
            ActionBody::Blocking(_) => f.write_str("ActionBody::Blocking"),
        }
    }
}

/// An immutable description of one unit of work.
///
/// `begin_point` gates execution: the body does not run until that control
/// point succeeds (empty = runnable immediately). `end_point` is signalled
/// with the body's outcome (empty = fire-and-forget). Arguments are captured
/// by the body closure at construction time.
///
/// Created by a caller, consumed exactly once by
/// [`Scheduler::commit_action`](crate::Scheduler::commit_action).
#[derive(Debug)]
pub struct Action {
    label: String,
    begin_point: String,
    end_point: String,
    body: ActionBody,
}

impl Action {
    /// Create an action with a cooperative async body.
    pub fn new<F>(begin_point: impl Into<String>, end_point: impl Into<String>, body: F) -> Self
    where
        F: Future<Output = BodyResult> + Send + 'static,
    {
        Self {
            label: "action".to_string(),
            begin_point: begin_point.into(),
            end_point: end_point.into(),
            body: ActionBody::Future(Box::pin(body)),
        }
    }

    /// Create an action whose body is a blocking call, dispatched to the
    /// blocking pool when run (`to_thread` semantics).
    pub fn blocking<F>(
        begin_point: impl Into<String>,
        end_point: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: FnOnce() -> BodyResult + Send + 'static,
    {
        Self {
            label: "action".to_string(),
            begin_point: begin_point.into(),
            end_point: end_point.into(),
            body: ActionBody::Blocking(Box::new(body)),
        }
    }

    /// Attach a human-readable label, used in logging and snapshots.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Key of the predecessor control point (empty = none).
    pub fn begin_point(&self) -> &str {
        &self.begin_point
    }

    /// Key of the successor control point (empty = none).
    pub fn end_point(&self) -> &str {
        &self.end_point
    }

    /// Whether the body must run off the cooperative scheduler thread.
    pub fn to_thread(&self) -> bool {
        self.body.to_thread()
    }

    /// Split into snapshot metadata and the executable body.
    pub(crate) fn into_parts(self) -> (ActionMeta, ActionBody) {
        (
            ActionMeta {
                label: self.label,
                begin_point: self.begin_point,
                end_point: self.end_point,
                to_thread: self.body.to_thread(),
            },
            self.body,
        )
    }

    /// Diagnostic snapshot of the action description.
    pub fn snapshot(&self) -> ActionSnapshot {
        ActionSnapshot {
            kind: "Action",
            label: self.label.clone(),
            begin: self.begin_point.clone(),
            end: self.end_point.clone(),
            to_thread: self.body.to_thread(),
        }
    }
}

/// Retained description of a committed action (body already consumed).
#[derive(Debug, Clone)]
pub struct ActionMeta {
    pub label: String,
    pub begin_point: String,
    pub end_point: String,
    pub to_thread: bool,
}

impl ActionMeta {
    pub fn snapshot(&self) -> ActionSnapshot {
        ActionSnapshot {
            kind: "Action",
            label: self.label.clone(),
            begin: self.begin_point.clone(),
            end: self.end_point.clone(),
            to_thread: self.to_thread,
        }
    }
}

/// Serializable view of an [`Action`] for logging/diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSnapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: String,
    pub begin: String,
    pub end: String,
    pub to_thread: bool,
}
