//! labflow-demo — exercises the scheduler and the process algebra end
//! to end against simulated instruments.
//!
//! # Usage
//!
//! ```bash
//! # Run everything
//! labflow-demo
//!
//! # Only the raw action-graph demo, chatty
//! labflow-demo --demo graph --verbose
//!
//! # Longer sweep
//! LABFLOW_SWEEP_STEPS=10 labflow-demo --demo sweep
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;

use labflow_process::{
    run_process, DataGroup, ParallelProcess, Process, SeriesProcess, SimpleProcess, SweepProcess,
    SwitchProcess,
};
use labflow_scheduler::{load_dotenv, Action, PointStatus, Scheduler, SchedulerConfig};

/// Demonstration driver for the labflow scheduler and process algebra.
#[derive(Parser, Debug)]
#[command(name = "labflow-demo", version, about)]
struct Cli {
    /// Which demo to run: "graph", "series", "parallel", "switch", "sweep" or "all".
    #[arg(long, env = "LABFLOW_DEMO", default_value = "all")]
    demo: String,

    /// Number of sweep iterations.
    #[arg(long, env = "LABFLOW_SWEEP_STEPS", default_value_t = 4)]
    sweep_steps: u64,

    /// Log every process round.
    #[arg(long)]
    verbose: bool,
}

async fn settle(name: &str, millis: u64) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    info!(step = name, "instrument settled");
    Ok(())
}

/// Raw action graphs: three acquisition flows share one scheduler, each a
/// prepare stage fanning out to two measurements that fan back in before a
/// final readout.
async fn graph_demo(scheduler: &Scheduler) -> anyhow::Result<()> {
    let mut finals = Vec::new();
    for flow in ["alpha", "beta", "gamma"] {
        let prepared = scheduler.acquire_point();
        let measured = scheduler.acquire_point();
        let done = scheduler.acquire_point();

        scheduler.commit_action(
            Action::new("", prepared.clone(), {
                let flow = flow.to_string();
                async move { settle(&format!("{flow}/prepare"), 10).await }
            })
            .with_label(format!("{flow}/prepare")),
        )?;
        for probe in ["voltage", "current"] {
            scheduler.commit_action(
                Action::new(prepared.clone(), measured.clone(), {
                    let step = format!("{flow}/{probe}");
                    async move { settle(&step, 15).await }
                })
                .with_label(format!("{flow}/{probe}")),
            )?;
        }
        scheduler.commit_action(
            Action::new(measured.clone(), done.clone(), {
                let flow = flow.to_string();
                async move { settle(&format!("{flow}/readout"), 5).await }
            })
            .with_label(format!("{flow}/readout")),
        )?;
        finals.push((flow, done));
    }

    for (flow, point) in finals {
        let status = scheduler
            .wait_point(&point, Some(Duration::from_secs(5)))
            .await?;
        anyhow::ensure!(
            status == PointStatus::Succeeded,
            "flow {flow} ended with {status:?}"
        );
        info!(flow, "flow complete");
    }
    Ok(())
}

fn step_leaf(name: &str, millis: u64) -> SimpleProcess {
    let step = name.to_string();
    SimpleProcess::new(name, move |_ctx| {
        let step = step.clone();
        async move { settle(&step, millis).await }
    })
}

async fn series_demo(scheduler: &Scheduler, verbose: bool) -> anyhow::Result<()> {
    let mut series = SeriesProcess::new("warmup")
        .with_child(step_leaf("pump-down", 10))
        .with_child(step_leaf("cool", 10))
        .with_child(step_leaf("stabilize", 10));
    let (ok, elapsed) = run_process(&mut series, scheduler, verbose).await;
    anyhow::ensure!(ok, "series demo failed");
    info!(?elapsed, "series demo complete");
    Ok(())
}

async fn parallel_demo(scheduler: &Scheduler, verbose: bool) -> anyhow::Result<()> {
    let mut parallel = ParallelProcess::new("channels")
        .with_child(step_leaf("channel-a", 20))
        .with_child(step_leaf("channel-b", 20))
        .with_child(step_leaf("channel-c", 20));
    let (ok, elapsed) = run_process(&mut parallel, scheduler, verbose).await;
    anyhow::ensure!(ok, "parallel demo failed");
    info!(?elapsed, "parallel demo complete");
    Ok(())
}

async fn switch_demo(scheduler: &Scheduler, verbose: bool) -> anyhow::Result<()> {
    let group = DataGroup::new("calibration");
    group.set("range", json!("high"));

    let mut switch = SwitchProcess::new("calibrate", |group: Option<&DataGroup>| {
        match group.and_then(|g| g.get("range")) {
            Some(v) if v == "high" => 1,
            _ => 0,
        }
    })
    .with_child(step_leaf("calibrate-low", 10))
    .with_child(step_leaf("calibrate-high", 10));
    switch
        .bind_data_group(Some(group))
        .context("bind calibration data")?;

    let (ok, elapsed) = run_process(&mut switch, scheduler, verbose).await;
    anyhow::ensure!(ok, "switch demo failed");
    info!(?elapsed, branch = ?switch.chosen(), "switch demo complete");
    Ok(())
}

async fn sweep_demo(scheduler: &Scheduler, steps: u64, verbose: bool) -> anyhow::Result<()> {
    let group = DataGroup::new("field-sweep");
    group.set("setpoint", json!(0));

    let body = SimpleProcess::new("measure", |ctx| async move {
        let setpoint = ctx
            .data
            .as_ref()
            .and_then(|g| g.get("setpoint"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        settle(&format!("measure@{setpoint}"), 5).await
    });
    let mut sweep = SweepProcess::new("field-sweep", body, move |group: Option<&DataGroup>, _body| {
        let group = match group {
            Some(g) => g,
            None => return false,
        };
        let next = group
            .get("setpoint")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        if next > steps {
            return false;
        }
        group.set("setpoint", json!(next));
        true
    });
    sweep.bind_data_group(Some(group)).context("bind sweep data")?;

    let (ok, elapsed) = run_process(&mut sweep, scheduler, verbose).await;
    anyhow::ensure!(ok, "sweep demo failed");
    info!(?elapsed, steps, "sweep demo complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting labflow-demo");

    let scheduler = Scheduler::new(SchedulerConfig::from_env());
    scheduler.start();

    let all = cli.demo == "all";
    if all || cli.demo == "graph" {
        graph_demo(&scheduler).await?;
    }
    if all || cli.demo == "series" {
        series_demo(&scheduler, cli.verbose).await?;
    }
    if all || cli.demo == "parallel" {
        parallel_demo(&scheduler, cli.verbose).await?;
    }
    if all || cli.demo == "switch" {
        switch_demo(&scheduler, cli.verbose).await?;
    }
    if all || cli.demo == "sweep" {
        sweep_demo(&scheduler, cli.sweep_steps, cli.verbose).await?;
    }

    info!(snapshot = %serde_json::to_string(&scheduler.snapshot())?, "final state");
    scheduler.stop();
    Ok(())
}
