use async_trait::async_trait;
use tracing::debug;

use labflow_scheduler::Scheduler;

use crate::data::DataGroup;
use crate::error::ProcessError;
use crate::process::{Process, ProcessSnapshot};

/// Runs its children concurrently.
///
/// Each commit launches every child that is idle and still has work; join
/// waits for all in-flight children and reports success only when every one
/// of them succeeded.
pub struct ParallelProcess {
    name: String,
    children: Vec<Box<dyn Process>>,
    group: Option<DataGroup>,
}

impl ParallelProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            group: None,
        }
    }

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
impl Process for ParallelProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        let mut launched = false;
        for child in &mut self.children {
            if !child.is_pending() && child.has_more() {
                launched |= child.commit(scheduler)?;
            }
        }
        if !launched {
            debug!(parallel = %self.name, "no child had work to launch");
        }
        Ok(launched)
    }

    fn is_pending(&self) -> bool {
        self.children.iter().any(|c| c.is_pending())
    }

    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        let mut any = false;
        let mut all_ok = true;
        for child in &mut self.children {
            if child.is_pending() {
                any = true;
                all_ok &= child.join(scheduler).await?;
            }
        }
        Ok(any && all_ok)
    }

    fn has_more(&self) -> bool {
        self.children.iter().any(|c| c.is_pending() || c.has_more())
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
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
        ProcessSnapshot::leaf(
            "ParallelProcess",
            &self.name,
            self.is_pending(),
            self.has_more(),
        )
        .with_children(self.children.iter().map(|c| c.snapshot()).collect())
    }
}
