//! Test bodies and the name -> body mapping the runner dispatches through.
use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{error::TestError, host::TestHost};

pub type TestResult = Result<(), TestError>;

/// Positional arguments of one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decode argument `index` into `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, TestError> {
        let value = self.0.get(index).ok_or_else(|| TestError::BadArgument {
            index,
            reason: "missing".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| TestError::BadArgument {
            index,
            reason: e.to_string(),
        })
    }

    /// Decode argument `index` as a number of seconds.
    pub fn secs(&self, index: usize) -> Result<Duration, TestError> {
        let secs: f64 = self.get(index)?;
        Duration::try_from_secs_f64(secs).map_err(|e| TestError::BadArgument {
            index,
            reason: e.to_string(),
        })
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A test body: takes the host and positional arguments.
#[async_trait]
pub trait TestFn: Send + Sync + 'static {
    async fn call(&self, host: Arc<TestHost>, args: Args) -> TestResult;
}

struct FnTest<F>(F);

#[async_trait]
impl<F, Fut> TestFn for FnTest<F>
where
    F: Fn(Arc<TestHost>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TestResult> + Send + 'static,
{
    async fn call(&self, host: Arc<TestHost>, args: Args) -> TestResult {
        (self.0)(host, args).await
    }
}

/// Wrap an async closure as a [`TestFn`].
pub fn test_fn<F, Fut>(f: F) -> Arc<dyn TestFn>
where
    F: Fn(Arc<TestHost>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TestResult> + Send + 'static,
{
    Arc::new(FnTest(f))
}

/// Registered test bodies, keyed by the name jobs refer to.
#[derive(Clone, Default)]
pub struct TestSet {
    tests: HashMap<String, Arc<dyn TestFn>>,
}

impl TestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `test` under `name`, replacing any previous body.
    pub fn register(&mut self, name: impl Into<String>, test: Arc<dyn TestFn>) -> &mut Self {
        self.tests.insert(name.into(), test);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TestFn>> {
        self.tests.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl fmt::Debug for TestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TestSet").field("tests", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_decode_by_position() {
        let args = Args::new(vec![json!(0.25), json!("msg"), json!([1, 2])]);

        assert_eq!(args.len(), 3);
        assert_eq!(args.secs(0).unwrap(), Duration::from_millis(250));
        assert_eq!(args.get::<String>(1).unwrap(), "msg");
        assert_eq!(args.get::<Vec<u8>>(2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn args_report_missing_and_mistyped() {
        let args = Args::new(vec![json!("not a number")]);

        match args.secs(0) {
            Err(TestError::BadArgument { index: 0, .. }) => {}
            other => panic!("expected bad argument, got {other:?}"),
        }
        match args.get::<String>(3) {
            Err(TestError::BadArgument { index: 3, reason }) => assert_eq!(reason, "missing"),
            other => panic!("expected missing argument, got {other:?}"),
        }
        assert!(args.secs(0).is_err());
        assert!(Args::new(vec![json!(-1.0)]).secs(0).is_err());
    }

    #[test]
    fn register_replaces_existing() {
        let mut set = TestSet::new();
        set.register("print", test_fn(|_, _| async { Ok(()) }));
        set.register("print", test_fn(|_, _| async { Err(TestError::check("x")) }));

        assert_eq!(set.len(), 1);
        assert!(set.contains("print"));
        assert!(set.get("sleep").is_none());
    }
}
