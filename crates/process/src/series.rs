use async_trait::async_trait;
use tracing::{debug, warn};

use labflow_scheduler::Scheduler;

use crate::data::DataGroup;
use crate::error::ProcessError;
use crate::process::{Process, ProcessSnapshot};

/// Runs its children strictly one after another.
///
/// At most one child is ever pending: commit advances past exhausted
/// children, commits the current one, and refuses to commit while it is
/// still in flight.
pub struct SeriesProcess {
    name: String,
    children: Vec<Box<dyn Process>>,
    index: usize,
    group: Option<DataGroup>,
}

impl SeriesProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            index: 0,
            group: None,
        }
    }

    /// Append a child, inheriting the bound data group.
    pub fn push(&mut self, mut child: Box<dyn Process>) {
        if let Some(group) = &self.group {
            // A freshly appended child is never pending.
            let _ = child.bind_data_group(Some(group.clone()));
        }
        self.children.push(child);
    }

    pub fn with_child(mut self, child: impl Process + 'static) -> Self {
        self.push(Box::new(child));
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Process for SeriesProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        while self.index < self.children.len() {
            let child = &mut self.children[self.index];
            if child.is_pending() {
                warn!(series = %self.name, child = %child.name(), "current child still pending");
                return Ok(false);
            } else if !child.has_more() {
                self.index += 1;
            } else {
                return child.commit(scheduler);
            }
        }
        debug!(series = %self.name, "all children exhausted");
        Ok(false)
    }

    fn is_pending(&self) -> bool {
        self.children
            .get(self.index)
            .map(|c| c.is_pending())
            .unwrap_or(false)
    }

    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if let Some(child) = self.children.get_mut(self.index) {
            if child.is_pending() {
                return child.join(scheduler).await;
            }
        }
        Ok(true)
    }

    fn has_more(&self) -> bool {
        match self.children.get(self.index) {
            Some(child) => {
                child.is_pending() || child.has_more() || self.index + 1 < self.children.len()
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
        self.index = 0;
    }

    fn data_group(&self) -> Option<&DataGroup> {
        self.group.as_ref()
    }

    fn bind_data_group(&mut self, group: Option<DataGroup>) -> Result<(), ProcessError> {
        if self.is_pending() {
            return Err(ProcessError::MutateWhilePending("data group"));
        }
        for child in &mut self.children {
            child.bind_data_group(group.clone())?;
        }
        self.group = group;
        Ok(())
    }

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot::leaf("SeriesProcess", &self.name, self.is_pending(), self.has_more())
            .with_children(self.children.iter().map(|c| c.snapshot()).collect())
    }
}
