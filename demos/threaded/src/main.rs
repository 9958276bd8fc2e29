use std::{path::Path, sync::Arc, time::Duration};

use hilt_core::{CliOptions, JobRunner, RunnerConfig, TestHost};
use hilt_exec::ConsoleFactory;
use hilt_model::{JobList, ModuleConfig};
use hilt_observe::{Journal, LoggerConfig, logger_init};
use hilt_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
use hilt_report::ResultHandler;
use tracing::info;

mod suite;

const MAX_JOBS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let cfg = LoggerConfig::default().with_level("info,hilt_core=debug");
    logger_init(&cfg)?;

    // 2) Module graph + jobs
    let dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let modules = ModuleConfig::from_path(dir.join("config.json"))?;
    modules.validate()?;
    let jobs = JobList::from_path(dir.join("jobs.json"))?;

    // 3) Host with metrics
    let metrics = PrometheusMetrics::new()?;
    let report = Arc::new(ResultHandler::new());
    let host = TestHost::builder(modules)
        .name("mytest")
        .tests(suite::tests())
        .sink(report.clone())
        .subscriber(Arc::new(Journal::new()))
        .subscriber(Arc::new(metrics.clone()))
        .cli(Arc::new(ConsoleFactory), CliOptions::default())
        .build()?;

    // 4) Capped run, polling drain
    let cfg = RunnerConfig::default()
        .with_max_jobs(MAX_JOBS)
        .with_poll_interval(Duration::from_millis(500));
    let mut runner = JobRunner::new(host.clone(), cfg);
    runner.run(jobs.as_slice(), 1);
    while runner.outstanding() > 0 {
        if runner.wait(false).await {
            info!(outstanding = runner.outstanding(), running = runner.running(), "reaped");
        }
    }

    let mut buf = Vec::new();
    TextEncoder::new().encode(&metrics.gather(), &mut buf)?;
    println!("{}", String::from_utf8_lossy(&buf));

    report.write_csv(&host.log_dir().join("results.csv"), true)?;
    info!(result = host.result(), "ALL DONE");
    anyhow::ensure!(host.result(), "at least one step failed");
    Ok(())
}
