use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use hilt_model::{ModuleConfig, StepRecord};
use tracing::{Span, debug, info, info_span};

use crate::{
    cli::{Cli, CliFactory, CliOptions},
    coordinator::{LockCoordinator, ModuleGuard},
    error::{CliError, CoreError},
    event::{Bus, Subscribe},
    registry::ModuleRegistry,
    report::{MemorySink, ReportSink},
    suite::{TestFn, TestSet},
};

pub const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Clone)]
struct CliBinding {
    factory: Arc<dyn CliFactory>,
    options: CliOptions,
}

/// Owner of the module locks, the test bodies, the CLI factory and the report sink.
///
/// Test bodies receive the host as `Arc<TestHost>` and reach shared hardware only through it.
pub struct TestHost {
    name: String,
    coordinator: Arc<LockCoordinator>,
    tests: TestSet,
    cli: RwLock<Option<CliBinding>>,
    log_dir: PathBuf,
    sink: Arc<dyn ReportSink>,
    bus: Bus,
    span: Span,
}

impl TestHost {
    pub fn builder(modules: ModuleConfig) -> HostBuilder {
        HostBuilder::new(modules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn tests(&self) -> &TestSet {
        &self.tests
    }

    pub fn test(&self, name: &str) -> Option<Arc<dyn TestFn>> {
        self.tests.get(name)
    }

    /// Lock `module` and its dependencies. See [`LockCoordinator::lock`].
    pub async fn lock(&self, module: &str) -> bool {
        self.coordinator.lock(module).await
    }

    /// Unlock `module` and its dependencies. See [`LockCoordinator::unlock`].
    pub fn unlock(&self, module: &str) -> bool {
        self.coordinator.unlock(module)
    }

    /// Lock `module` for the lifetime of the returned guard.
    pub async fn lock_scoped(&self, module: &str) -> Option<ModuleGuard> {
        self.coordinator.lock_scoped(module).await
    }

    /// Store the factory later used by [`TestHost::get_cli`].
    pub fn set_cli(&self, factory: Arc<dyn CliFactory>, options: CliOptions) {
        debug!(parent: &self.span, factory = factory.name(), "cli factory set");
        *self.cli.write().unwrap_or_else(PoisonError::into_inner) =
            Some(CliBinding { factory, options });
    }

    /// Open a fresh channel from the stored factory.
    ///
    /// The transcript goes to `<log_dir>/<logname>` unless the stored options name a file.
    pub async fn get_cli(&self, logname: &str) -> Result<Box<dyn Cli>, CliError> {
        let binding = self
            .cli
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CliError::NotConfigured)?;
        self.get_cli_with(binding.factory.as_ref(), binding.options, logname)
            .await
    }

    /// Open a channel from `factory` instead of the stored one.
    pub async fn get_cli_with(
        &self,
        factory: &dyn CliFactory,
        mut options: CliOptions,
        logname: &str,
    ) -> Result<Box<dyn Cli>, CliError> {
        if options.store_file.is_none() {
            options.store_file = Some(self.log_dir.join(logname));
        }
        debug!(parent: &self.span, factory = factory.name(), store_file = ?options.store_file, "opening cli");
        factory.open(options).await
    }

    /// Lock `module`, then open a channel logging to `logname`
    /// (default `log_cli_<module>.txt`, lower-cased).
    pub async fn lock_and_cli(
        &self,
        module: &str,
        logname: Option<&str>,
    ) -> (bool, Result<Box<dyn Cli>, CliError>) {
        let logname = match logname {
            Some(name) => name.to_string(),
            None => format!("log_cli_{}.txt", module.to_lowercase()),
        };
        let locked = self.lock(module).await;
        (locked, self.get_cli(&logname).await)
    }

    pub fn sink(&self) -> &Arc<dyn ReportSink> {
        &self.sink
    }

    pub fn record(&self, step: StepRecord) {
        self.sink.record(step);
    }

    /// `true` while no recorded step has failed.
    pub fn result(&self) -> bool {
        self.sink.global_result()
    }
}

impl std::fmt::Debug for TestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHost")
            .field("name", &self.name)
            .field("log_dir", &self.log_dir)
            .field("tests", &self.tests)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TestHost`].
pub struct HostBuilder {
    name: String,
    modules: ModuleConfig,
    tests: TestSet,
    log_dir: PathBuf,
    sink: Option<Arc<dyn ReportSink>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    cli: Option<CliBinding>,
}

impl HostBuilder {
    fn new(modules: ModuleConfig) -> Self {
        Self {
            name: "hilt".to_string(),
            modules,
            tests: TestSet::new(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            sink: None,
            subscribers: Vec::new(),
            cli: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run-scoped log directory. Wiped and recreated by [`HostBuilder::build`].
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn subscriber(mut self, sub: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(sub);
        self
    }

    pub fn test(mut self, name: impl Into<String>, test: Arc<dyn TestFn>) -> Self {
        self.tests.register(name, test);
        self
    }

    pub fn tests(mut self, tests: TestSet) -> Self {
        self.tests = tests;
        self
    }

    pub fn cli(mut self, factory: Arc<dyn CliFactory>, options: CliOptions) -> Self {
        self.cli = Some(CliBinding { factory, options });
        self
    }

    pub fn build(self) -> Result<Arc<TestHost>, CoreError> {
        recreate_dir(&self.log_dir).map_err(|source| CoreError::LogDir {
            path: self.log_dir.clone(),
            source,
        })?;

        let span = info_span!("host", name = %self.name);
        let bus = Bus::new(self.subscribers);
        let registry = ModuleRegistry::from_config(&self.modules);
        let coordinator = LockCoordinator::new(registry, bus.clone(), span.clone());

        info!(
            parent: &span,
            modules = self.modules.len(),
            tests = self.tests.len(),
            log_dir = %self.log_dir.display(),
            "test host ready"
        );

        Ok(Arc::new(TestHost {
            name: self.name,
            coordinator: Arc::new(coordinator),
            tests: self.tests,
            cli: RwLock::new(self.cli),
            log_dir: self.log_dir,
            sink: self.sink.unwrap_or_else(|| Arc::new(MemorySink::new())),
            bus,
            span,
        }))
    }
}

fn recreate_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}
