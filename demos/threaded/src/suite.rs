use std::sync::Arc;

use hilt_core::{Args, TestError, TestHost, TestResult, TestSet, test_fn};
use hilt_model::StepRecord;
use tracing::info;

pub fn tests() -> TestSet {
    let mut set = TestSet::new();
    set.register("sleep", test_fn(sleep))
        .register("print_sleep", test_fn(print_sleep))
        .register("print", test_fn(print));
    set
}

async fn sleep(host: Arc<TestHost>, args: Args) -> TestResult {
    let time = args.secs(0)?;
    let _guard = host
        .lock_scoped("SLEEP")
        .await
        .ok_or_else(|| TestError::Lock("SLEEP".into()))?;

    info!("sleep: started");
    tokio::time::sleep(time).await;
    info!("sleep: done");
    host.record(StepRecord::new("sleep", "SLEEP", Some(true)).with_duration(time));
    Ok(())
}

async fn print_sleep(host: Arc<TestHost>, args: Args) -> TestResult {
    let time = args.secs(0)?;
    if !host.lock("PRINT_SLEEP").await {
        return Err(TestError::Lock("PRINT_SLEEP".into()));
    }

    info!("print_sleep: I'll sleep for {:.1} s", time.as_secs_f64());
    tokio::time::sleep(time).await;
    info!("print_sleep: done");
    host.record(StepRecord::new("print_sleep", "PRINT_SLEEP", Some(true)).with_duration(time));

    host.unlock("PRINT_SLEEP");
    Ok(())
}

async fn print(host: Arc<TestHost>, args: Args) -> TestResult {
    let msg: String = args.get(0)?;
    let (locked, cli) = host.lock_and_cli("PRINT", None).await;
    if !locked {
        return Err(TestError::Lock("PRINT".into()));
    }

    let res = match cli {
        Ok(mut cli) => cli.send(&format!("test_print:{msg}"), false).await.map(|_| ()),
        Err(e) => Err(e),
    };
    host.record(
        StepRecord::new("print", "PRINT", Some(res.is_ok())).with_comment(msg),
    );

    host.unlock("PRINT");
    res.map_err(TestError::from)
}
