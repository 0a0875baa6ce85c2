use async_trait::async_trait;
use tracing::debug;

use labflow_scheduler::Scheduler;

use crate::data::DataGroup;
use crate::error::ProcessError;
use crate::process::{Process, ProcessSnapshot};

/// Repeats a body process, re-arming it between iterations.
///
/// Before every iteration the sweeper inspects the data group and mutates
/// the body (typically stepping a setpoint). Returning `false` ends the
/// sweep. The body is reset before each iteration, so each pass starts
/// from its initial state with whatever the sweeper changed still applied.
pub struct SweepProcess<P: Process> {
    name: String,
    body: P,
    sweeper: Box<dyn FnMut(Option<&DataGroup>, &mut P) -> bool + Send>,
    in_loop: bool,
    finished: bool,
    group: Option<DataGroup>,
}

impl<P: Process> SweepProcess<P> {
    pub fn new(
        name: impl Into<String>,
        body: P,
        sweeper: impl FnMut(Option<&DataGroup>, &mut P) -> bool + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            sweeper: Box::new(sweeper),
            in_loop: false,
            finished: false,
            group: None,
        }
    }

    pub fn body(&self) -> &P {
        &self.body
    }
}

#[async_trait]
impl<P: Process> Process for SweepProcess<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn commit(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if self.finished || self.body.is_pending() {
            return Ok(false);
        }
        if !self.in_loop {
            if (self.sweeper)(self.group.as_ref(), &mut self.body) {
                self.body.reset();
                self.in_loop = true;
            } else {
                debug!(sweep = %self.name, "sweeper declined, sweep finished");
                self.finished = true;
                return Ok(false);
            }
        }
        self.body.commit(scheduler)
    }

    fn is_pending(&self) -> bool {
        self.body.is_pending()
    }

    async fn join(&mut self, scheduler: &Scheduler) -> Result<bool, ProcessError> {
        if !self.in_loop {
            return Ok(self.finished);
        }
        let ok = self.body.join(scheduler).await?;
        if !ok {
            self.in_loop = false;
            self.finished = true;
            return Ok(false);
        }
        if !(self.body.is_pending() || self.body.has_more()) {
            // Iteration done; the next commit consults the sweeper again.
            self.in_loop = false;
        }
        Ok(true)
    }

    fn has_more(&self) -> bool {
        !self.finished
    }

    fn reset(&mut self) {
        self.body.reset();
        self.in_loop = false;
        self.finished = false;
    }

    fn data_group(&self) -> Option<&DataGroup> {
        self.group.as_ref()
    }

    fn bind_data_group(&mut self, group: Option<DataGroup>) -> Result<(), ProcessError> {
        if self.is_pending() {
            return Err(ProcessError::MutateWhilePending("data group"));
        }
        self.body.bind_data_group(group.clone())?;
        self.group = group;
        Ok(())
    }

    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot::leaf("SweepProcess", &self.name, self.is_pending(), self.has_more())
            .with_children(vec![self.body.snapshot()])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use labflow_scheduler::SchedulerConfig;
    use serde_json::json;

    use super::*;
    use crate::process::run_process;
    use crate::simple::SimpleProcess;

    fn started() -> Scheduler {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler.start();
        scheduler
    }

    #[tokio::test]
    async fn runs_until_the_sweeper_declines() {
        let scheduler = started();
        let hits = Arc::new(AtomicUsize::new(0));
        let body = SimpleProcess::new("step", {
            let hits = hits.clone();
            move |_ctx| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        });

        let mut remaining = 3u32;
        let mut sweep = SweepProcess::new("sweep", body, move |_group, _body| {
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            true
        });

        let (ok, _) = run_process(&mut sweep, &scheduler, false).await;
        assert!(ok);
        assert!(!sweep.has_more());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sweeper_steps_the_data_group() {
        let scheduler = started();
        let group = DataGroup::new("sweep");
        group.set("setpoint", json!(0));

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let body = SimpleProcess::new("measure", {
            let seen = seen.clone();
            move |ctx| {
                let seen = seen.clone();
                async move {
                    let value = ctx
                        .data
                        .as_ref()
                        .and_then(|g| g.get("setpoint"))
                        .and_then(|v| v.as_i64())
                        .unwrap_or(-1);
                    seen.lock().unwrap().push(value);
                    Ok(())
                }
            }
        });

        let mut sweep = SweepProcess::new("sweep", body, |group: Option<&DataGroup>, _body| {
            let group = group.expect("data group bound");
            let next = group
                .get("setpoint")
                .and_then(|v| v.as_i64())
                .unwrap_or(0)
                + 1;
            if next > 3 {
                return false;
            }
            group.set("setpoint", json!(next));
            true
        });
        sweep.bind_data_group(Some(group)).unwrap();

        let (ok, _) = run_process(&mut sweep, &scheduler, false).await;
        assert!(ok);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rearm_decision_waits_for_the_next_commit() {
        let scheduler = started();
        let calls = Arc::new(AtomicUsize::new(0));
        let body = SimpleProcess::new("step", |_ctx| async { Ok(()) });

        let counted = calls.clone();
        let mut remaining = 2u32;
        let mut sweep = SweepProcess::new("sweep", body, move |_group, _body| {
            counted.fetch_add(1, Ordering::SeqCst);
            if remaining == 0 {
                false
            } else {
                remaining -= 1;
                true
            }
        });

        assert!(sweep.commit(&scheduler).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sweep.join(&scheduler).await.unwrap());
        // Iteration over, but the follow-up decision belongs to commit.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sweep.has_more());

        assert!(sweep.commit(&scheduler).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn declining_immediately_ends_cleanly() {
        let scheduler = started();
        let body = SimpleProcess::new("never", |_ctx| async { Ok(()) });
        let mut sweep = SweepProcess::new("sweep", body, |_group, _body| false);

        let (ok, _) = run_process(&mut sweep, &scheduler, false).await;
        assert!(ok);
        assert!(!sweep.has_more());
    }

    #[tokio::test]
    async fn body_failure_ends_the_sweep() {
        let scheduler = started();
        let body = SimpleProcess::new("flaky", |_ctx| async {
            Err(anyhow::anyhow!("sensor timeout"))
        });
        let mut first = true;
        let mut sweep = SweepProcess::new("sweep", body, move |_group, _body| {
            std::mem::replace(&mut first, false)
        });

        let (ok, _) = run_process(&mut sweep, &scheduler, false).await;
        assert!(!ok);
        assert!(!sweep.has_more());
    }
}
