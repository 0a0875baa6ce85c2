//! End-to-end runs of composed process trees against a live scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use labflow_process::{
    run_process, DataGroup, ParallelProcess, Process, SeriesProcess, SimpleProcess, SweepProcess,
    SwitchProcess,
};
use labflow_scheduler::{Scheduler, SchedulerConfig};

fn started() -> Scheduler {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.start();
    scheduler
}

fn tracing_leaf(name: &str, log: Arc<Mutex<Vec<String>>>) -> SimpleProcess {
    let entry = name.to_string();
    SimpleProcess::new(name, move |_ctx| {
        let log = log.clone();
        let entry = entry.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            log.lock().unwrap().push(entry);
            Ok(())
        }
    })
}

#[tokio::test]
async fn series_of_three_runs_exactly_three_rounds() {
    let scheduler = started();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut series = SeriesProcess::new("recipe");
    for name in ["deposit", "anneal", "measure"] {
        series.push(Box::new(tracing_leaf(name, log.clone())));
    }

    let (ok, _) = run_process(&mut series, &scheduler, false).await;
    assert!(ok);
    assert_eq!(*log.lock().unwrap(), vec!["deposit", "anneal", "measure"]);
    let snap = scheduler.snapshot();
    assert_eq!(snap.runner_count, 0);
}

#[tokio::test]
async fn nested_series_and_parallel_tree() {
    let scheduler = started();
    let log = Arc::new(Mutex::new(Vec::new()));

    let fan_out = ParallelProcess::new("probes")
        .with_child(tracing_leaf("probe-a", log.clone()))
        .with_child(tracing_leaf("probe-b", log.clone()));
    let mut tree = SeriesProcess::new("experiment")
        .with_child(tracing_leaf("setup", log.clone()))
        .with_child(fan_out)
        .with_child(tracing_leaf("teardown", log.clone()));

    let (ok, _) = run_process(&mut tree, &scheduler, false).await;
    assert!(ok);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "setup");
    assert_eq!(log[3], "teardown");
    assert!(log[1..3].contains(&"probe-a".to_string()));
    assert!(log[1..3].contains(&"probe-b".to_string()));
}

#[tokio::test]
async fn failure_in_one_branch_fails_the_whole_run() {
    let scheduler = started();
    let mut tree = SeriesProcess::new("experiment")
        .with_child(SimpleProcess::new("good", |_ctx| async { Ok(()) }))
        .with_child(SimpleProcess::new("broken", |_ctx| async {
            Err(anyhow::anyhow!("shutter stuck"))
        }))
        .with_child(SimpleProcess::new("unreached", |_ctx| async {
            panic!("must not run after a failed stage")
        }));

    let (ok, _) = run_process(&mut tree, &scheduler, false).await;
    assert!(!ok);
    assert!(scheduler.is_running(), "one failed run must not kill the scheduler");
}

#[tokio::test]
async fn switch_inside_series_follows_the_data_group() {
    let scheduler = started();
    let group = DataGroup::new("run");
    group.set("mode", json!("fast"));
    let log = Arc::new(Mutex::new(Vec::new()));

    let switch = SwitchProcess::new("scan-mode", |group: Option<&DataGroup>| {
        match group.and_then(|g| g.get("mode")) {
            Some(v) if v == "fast" => 0,
            _ => 1,
        }
    })
    .with_child(tracing_leaf("fast-scan", log.clone()))
    .with_child(tracing_leaf("slow-scan", log.clone()));

    let mut tree = SeriesProcess::new("scan")
        .with_child(tracing_leaf("arm", log.clone()))
        .with_child(switch);
    tree.bind_data_group(Some(group)).unwrap();

    let (ok, _) = run_process(&mut tree, &scheduler, false).await;
    assert!(ok);
    assert_eq!(*log.lock().unwrap(), vec!["arm", "fast-scan"]);
}

#[tokio::test]
async fn sweep_drives_a_series_body_each_iteration() {
    let scheduler = started();
    let group = DataGroup::new("temps");
    group.set("kelvin", json!(0));
    let rounds = Arc::new(AtomicUsize::new(0));

    let body = SeriesProcess::new("cycle")
        .with_child(SimpleProcess::new("set-temp", |_ctx| async { Ok(()) }))
        .with_child(SimpleProcess::new("read-out", {
            let rounds = rounds.clone();
            move |_ctx| {
                let rounds = rounds.clone();
                async move {
                    rounds.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }));

    let mut sweep = SweepProcess::new("temp-sweep", body, |group: Option<&DataGroup>, _body| {
        let group = group.expect("group bound");
        let next = group.get("kelvin").and_then(|v| v.as_i64()).unwrap_or(0) + 50;
        if next > 150 {
            return false;
        }
        group.set("kelvin", json!(next));
        true
    });
    sweep.bind_data_group(Some(group.clone())).unwrap();

    let (ok, _) = run_process(&mut sweep, &scheduler, false).await;
    assert!(ok);
    assert_eq!(rounds.load(Ordering::SeqCst), 3);
    assert_eq!(group.get("kelvin"), Some(json!(150)));
}

#[tokio::test]
async fn rerunning_a_tree_after_success_starts_fresh() {
    let scheduler = started();
    let hits = Arc::new(AtomicUsize::new(0));

    let mut series = SeriesProcess::new("repeatable").with_child(SimpleProcess::new("step", {
        let hits = hits.clone();
        move |_ctx| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }));

    let (first, _) = run_process(&mut series, &scheduler, false).await;
    let (second, _) = run_process(&mut series, &scheduler, false).await;
    assert!(first && second);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stopping_the_scheduler_mid_run_fails_the_process() {
    let scheduler = started();
    let mut series = SeriesProcess::new("interrupted").with_child(SimpleProcess::new(
        "long-soak",
        |_ctx| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        },
    ));

    assert!(series.commit(&scheduler).unwrap());
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.stop();

    assert!(series.join(&scheduler).await.is_err());
}
