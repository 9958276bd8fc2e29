//! Bounded-concurrency dispatch of test jobs.
//!
//! `run` spawns one task per job and returns immediately. Every task first waits for its turn
//! at the admission gate (dispatch order), then for a slot from the batch's pool, and only then
//! calls the test body. The slot is an owned permit, released whenever the task ends: success,
//! error, panic, timeout or cancellation. A body stopped by a timeout, a cancellation or a panic
//! also gives back the modules it still held through the coordinator. `wait` reaps finished tasks.
use std::{
    any::Any,
    sync::Arc,
    time::{Duration, Instant},
};

use hilt_model::{JobSpec, StepRecord, TaskId, TaskStatus};
use tokio::{
    sync::{Semaphore, watch},
    task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, trace, warn};

use crate::{
    coordinator::{Holdings, LockCoordinator},
    event::{Event, EventKind},
    host::TestHost,
    state::TaskState,
    suite::{Args, TestFn},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Module name used for steps the runner itself records.
pub const RUNNER_MODULE: &str = "runner";

/// What the runner does with a failed test body beyond logging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and keep the failure on the task record. The report sink alone decides the run result.
    #[default]
    Detached,
    /// Additionally record a failed step in the host's report sink.
    Report,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Slots per batch. `None` or `Some(0)` sizes the pool to the batch.
    pub max_jobs: Option<usize>,
    /// Bounded wait per task in non-blocking [`JobRunner::wait`].
    pub poll_interval: Duration,
    /// Upper bound for one test body. `None` waits forever.
    pub job_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_jobs: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: None,
            failure_policy: FailurePolicy::Detached,
        }
    }
}

impl RunnerConfig {
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = Some(max_jobs);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    fn capacity(&self, batch: usize) -> usize {
        match self.max_jobs {
            Some(n) if n > 0 => n,
            _ => batch,
        }
    }
}

enum Outcome {
    Succeeded,
    Failed(String),
    TimedOut(Duration),
    Canceled,
}

struct Task {
    id: TaskId,
    func: String,
    handle: JoinHandle<()>,
}

/// Everything one spawned task needs, detached from the runner.
struct TaskCtx {
    id: TaskId,
    func: String,
    args: Args,
    ticket: u64,
    test: Arc<dyn TestFn>,
    host: Arc<TestHost>,
    slots: Arc<Semaphore>,
    gate: Arc<watch::Sender<u64>>,
    state: TaskState,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    policy: FailurePolicy,
}

/// Dispatches named test jobs onto the host with a bounded number running at once.
pub struct JobRunner {
    host: Arc<TestHost>,
    cfg: RunnerConfig,
    slots: Arc<Semaphore>,
    capacity: usize,
    tasks: Vec<Task>,
    state: TaskState,
    cancel: CancellationToken,
    seq: u64,
    span: Span,
}

impl JobRunner {
    pub fn new(host: Arc<TestHost>, cfg: RunnerConfig) -> Self {
        let span = info_span!(parent: host.span(), "runner");
        Self {
            host,
            cfg,
            slots: Arc::new(Semaphore::new(0)),
            capacity: 0,
            tasks: Vec::new(),
            state: TaskState::new(),
            cancel: CancellationToken::new(),
            seq: 0,
            span,
        }
    }

    /// Runner capped at `max_jobs` concurrent tasks (`0` = uncapped).
    pub fn with_max_jobs(host: Arc<TestHost>, max_jobs: usize) -> Self {
        Self::new(host, RunnerConfig::default().with_max_jobs(max_jobs))
    }

    pub fn host(&self) -> &Arc<TestHost> {
        &self.host
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    /// Change the cap for the next batch. Tasks already dispatched keep their pool.
    pub fn set_max_jobs(&mut self, max_jobs: Option<usize>) {
        self.cfg.max_jobs = max_jobs;
    }

    /// Dispatch `jobs`, `repeat` times over, and return once every task is spawned.
    ///
    /// The slot pool is reset to the configured cap (or to `jobs.len()` when uncapped).
    /// A cancellation from an earlier [`JobRunner::cancel`] does not carry over.
    /// Jobs naming an unregistered test are skipped with one warning each.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn run(&mut self, jobs: &[JobSpec], repeat: usize) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let capacity = self.cfg.capacity(jobs.len());
        self.slots = Arc::new(Semaphore::new(capacity));
        self.capacity = capacity;
        let (gate, _) = watch::channel(0u64);
        let gate = Arc::new(gate);
        let mut ticket = 0u64;

        debug!(capacity, jobs = jobs.len(), repeat, "dispatching batch");

        for round in 0..repeat {
            trace!(round, "dispatch round");
            for job in jobs {
                let Some(test) = self.host.test(&job.func) else {
                    warn!(func = %job.func, "no test registered under this name; job skipped");
                    self.host
                        .bus()
                        .publish(Event::new(EventKind::JobSkipped).with_func(&job.func));
                    continue;
                };
                self.spawn(test, job, ticket, Arc::clone(&gate));
                ticket += 1;
            }
        }
    }

    fn spawn(&mut self, test: Arc<dyn TestFn>, job: &JobSpec, ticket: u64, gate: Arc<watch::Sender<u64>>) {
        self.seq += 1;
        let id = TaskId::new(&job.func, self.seq);

        self.state.add_task(id.clone(), job.func.clone());
        self.host
            .bus()
            .publish(Event::new(EventKind::JobDispatched).with_task(&id).with_func(&job.func));
        trace!(task = %id, "job dispatched");

        let ctx = TaskCtx {
            id: id.clone(),
            func: job.func.clone(),
            args: Args::new(job.args.clone()),
            ticket,
            test,
            host: Arc::clone(&self.host),
            slots: Arc::clone(&self.slots),
            gate,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            timeout: self.cfg.job_timeout,
            policy: self.cfg.failure_policy,
        };
        let span = info_span!(parent: &self.span, "task", id = %id);
        let handle = tokio::spawn(execute(ctx).instrument(span));

        self.tasks.push(Task {
            id,
            func: job.func.clone(),
            handle,
        });
    }

    /// Reap finished tasks; returns whether at least one was reaped.
    ///
    /// With `blocking`, waits for every outstanding task. Otherwise each task gets at most
    /// `poll_interval`, and unfinished ones stay outstanding for the next call.
    pub async fn wait(&mut self, blocking: bool) -> bool {
        let poll = self.cfg.poll_interval;
        let mut reaped = false;
        let mut i = 0;

        while i < self.tasks.len() {
            let handle = &mut self.tasks[i].handle;
            let joined = if blocking || handle.is_finished() {
                Some(handle.await)
            } else {
                tokio::time::timeout(poll, handle).await.ok()
            };

            match joined {
                Some(result) => {
                    let task = self.tasks.remove(i);
                    self.reap(task, result);
                    reaped = true;
                }
                None => i += 1,
            }
        }
        reaped
    }

    /// Call non-blocking [`JobRunner::wait`] until nothing is outstanding.
    pub async fn drain(&mut self) {
        while !self.tasks.is_empty() {
            self.wait(false).await;
        }
    }

    fn reap(&self, task: Task, result: Result<(), JoinError>) {
        if let Err(e) = result {
            let reason = if e.is_panic() {
                format!("panicked: {}", panic_message(e.into_panic()))
            } else {
                "aborted".to_string()
            };
            error!(parent: &self.span, task = %task.id, reason = %reason, "test body did not return");
            self.state
                .update_status(&task.id, TaskStatus::Failed, Some(reason.clone()));
            self.host.bus().publish(
                Event::new(EventKind::TaskFailed)
                    .with_task(&task.id)
                    .with_func(&task.func)
                    .with_reason(&reason),
            );
            if self.cfg.failure_policy == FailurePolicy::Report {
                self.host.record(
                    StepRecord::new(&task.func, RUNNER_MODULE, Some(false)).with_comment(reason),
                );
            }
        }

        trace!(parent: &self.span, task = %task.id, "task reaped");
        self.host
            .bus()
            .publish(Event::new(EventKind::TaskReaped).with_task(&task.id).with_func(&task.func));
    }

    /// Tasks dispatched and not reaped yet.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks of the current batch holding a slot right now.
    pub fn running(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Slot pool size of the current batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Cancel every task dispatched so far that has not finished. Nothing cancels by default.
    pub fn cancel(&self) {
        info!(parent: &self.span, outstanding = self.tasks.len(), "cancelling dispatched tasks");
        self.cancel.cancel();
    }

    /// Token shared by the tasks dispatched since the last cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("cfg", &self.cfg)
            .field("capacity", &self.capacity)
            .field("outstanding", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

async fn execute(ctx: TaskCtx) {
    let admitted = tokio::select! {
        biased;
        permit = admit(&ctx) => permit,
        _ = ctx.cancel.cancelled() => None,
    };
    let Some(_permit) = admitted else {
        settle(&ctx, Outcome::Canceled, Duration::ZERO);
        return;
    };

    ctx.state.update_status(&ctx.id, TaskStatus::Running, None);
    ctx.host.bus().publish(
        Event::new(EventKind::TaskStarting)
            .with_task(&ctx.id)
            .with_func(&ctx.func),
    );
    debug!("test body starting");

    let holdings = Holdings::default();
    let mut rollback = Rollback {
        coordinator: Arc::clone(ctx.host.coordinator()),
        holdings: holdings.clone(),
        armed: true,
    };

    let started = Instant::now();
    let body = holdings.scope(ctx.test.call(Arc::clone(&ctx.host), ctx.args.clone()));
    let bounded = async {
        match ctx.timeout {
            Some(limit) => tokio::time::timeout(limit, body).await.map_err(|_| limit),
            None => Ok(body.await),
        }
    };

    let outcome = tokio::select! {
        biased;
        res = bounded => match res {
            Ok(Ok(())) => Outcome::Succeeded,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(limit) => Outcome::TimedOut(limit),
        },
        _ = ctx.cancel.cancelled() => Outcome::Canceled,
    };
    rollback.armed = matches!(outcome, Outcome::TimedOut(_) | Outcome::Canceled);
    drop(rollback);
    settle(&ctx, outcome, started.elapsed());
}

/// Gives back what a stopped body left locked. Disarmed once the body returns on its own;
/// its modules then stay held for whoever unlocks them.
struct Rollback {
    coordinator: Arc<LockCoordinator>,
    holdings: Holdings,
    armed: bool,
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed || self.holdings.is_empty() {
            return;
        }
        let released = self.coordinator.release_holdings(&self.holdings);
        warn!(released, "released modules left locked by the stopped body");
    }
}

/// Wait for this task's turn, take a slot, then let the next ticket through.
async fn admit(ctx: &TaskCtx) -> Option<tokio::sync::OwnedSemaphorePermit> {
    let mut turn = ctx.gate.subscribe();
    turn.wait_for(|t| *t == ctx.ticket).await.ok()?;
    let permit = Arc::clone(&ctx.slots).acquire_owned().await.ok();
    ctx.gate.send_modify(|t| *t += 1);
    permit
}

fn settle(ctx: &TaskCtx, outcome: Outcome, elapsed: Duration) {
    let (status, kind, reason) = match outcome {
        Outcome::Succeeded => {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "test body finished");
            (TaskStatus::Succeeded, EventKind::TaskSucceeded, None)
        }
        Outcome::Failed(reason) => {
            error!(reason = %reason, "test body failed");
            (TaskStatus::Failed, EventKind::TaskFailed, Some(reason))
        }
        Outcome::TimedOut(limit) => {
            let reason = format!("timed out after {limit:?}");
            warn!("{reason}");
            (TaskStatus::TimedOut, EventKind::TaskTimedOut, Some(reason))
        }
        Outcome::Canceled => {
            info!("task canceled");
            (TaskStatus::Canceled, EventKind::TaskCanceled, Some("canceled".to_string()))
        }
    };

    ctx.state.update_status(&ctx.id, status, reason.clone());

    let mut event = Event::new(kind).with_task(&ctx.id).with_func(&ctx.func);
    if let Some(reason) = &reason {
        event = event.with_reason(reason);
    }
    ctx.host.bus().publish(event);

    if ctx.policy == FailurePolicy::Report
        && matches!(status, TaskStatus::Failed | TaskStatus::TimedOut)
    {
        ctx.host.record(
            StepRecord::new(&ctx.func, RUNNER_MODULE, Some(false))
                .with_comment(reason.unwrap_or_default())
                .with_duration(elapsed),
        );
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
