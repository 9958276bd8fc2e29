use std::{path::Path, sync::Arc};

use hilt_core::{CliOptions, JobRunner, RunnerConfig, TestHost};
use hilt_exec::ConsoleFactory;
use hilt_model::{JobList, ModuleConfig};
use hilt_observe::{Journal, LoggerConfig, logger_init};
use hilt_report::ResultHandler;
use tracing::info;

mod suite;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    logger_init(&LoggerConfig::default())?;

    // 2) Module graph + jobs
    let dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let modules = ModuleConfig::from_path(dir.join("config.json"))?;
    let jobs = JobList::from_path(dir.join("jobs.json"))?;
    info!(modules = modules.len(), jobs = jobs.len(), "configuration loaded");

    // 3) Host
    let report = Arc::new(ResultHandler::new());
    let host = TestHost::builder(modules)
        .name("mytest")
        .tests(suite::tests())
        .sink(report.clone())
        .subscriber(Arc::new(Journal::new()))
        .cli(Arc::new(ConsoleFactory), CliOptions::default())
        .build()?;

    // 4) Uncapped run, blocking wait
    let mut runner = JobRunner::new(host.clone(), RunnerConfig::default());
    runner.run(jobs.as_slice(), 1);
    runner.wait(true).await;

    report.write_csv(&host.log_dir().join("results.csv"), true)?;
    info!(result = host.result(), "ALL DONE");
    anyhow::ensure!(host.result(), "at least one step failed");
    Ok(())
}
