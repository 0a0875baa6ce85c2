use async_trait::async_trait;
use tracing::debug;

use labflow_scheduler::Scheduler;

use crate::data::DataGroup;
use crate::error::ProcessError;
use crate::process::{Process, ProcessSnapshot};

/// Decides which branch to run based on the bound data group.
pub type Switcher = Box<dyn Fn(Option<&DataGroup>) -> usize + Send + Sync>;

/// Selects exactly one child per cycle and delegates to it.
///
/// The switcher runs once on the first commit after a reset; every later
/// commit and join goes to the chosen branch until the next reset.
pub struct SwitchProcess {
    name: String,
    children: Vec<Box<dyn Process>>,
    switcher: Switcher,
    chosen: Option<usize>,
    decided: bool,
    group: Option<DataGroup>,
}

impl SwitchProcess {
    pub fn new(
        name: impl Into<String>,
        switcher: impl Fn(Option<&DataGroup>) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            switcher: Box::new(switcher),
            chosen: None,
            decided: false,
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

    /// Branch picked in the current cycle, if decided.
    pub fn chosen(&self) -> Option<usize> {
        self.chosen
    }
}

#[async_trait]
impl Process for SwitchProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if !self.decided {
            self.decided = true;
            let index = (self.switcher)(self.group.as_ref());
            if index >= self.children.len() {
                return Err(ProcessError::SwitchIndex {
                    index,
                    len: self.children.len(),
                });
            }
            debug!(switch = %self.name, branch = index, "branch selected");
            self.chosen = Some(index);
        }
        match self.chosen {
            Some(index) => self.children[index].commit(scheduler),
            None => Ok(false),
        }
    }

    fn is_pending(&self) -> bool {
        self.chosen
            .and_then(|i| self.children.get(i))
            .map(|c| c.is_pending())
            .unwrap_or(false)
    }

    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        match self.chosen {
            Some(index) => self.children[index].join(scheduler).await,
            None => Ok(false),
        }
    }

    fn has_more(&self) -> bool {
        match self.chosen {
            Some(index) => self.children[index].is_pending() || self.children[index].has_more(),
            None => !self.decided && !self.children.is_empty(),
        }
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
        self.chosen = None;
        self.decided = false;
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
            "SwitchProcess",
            &self.name,
            self.is_pending(),
            self.has_more(),
        )
        .with_children(self.children.iter().map(|c| c.snapshot()).collect())
    }
}
