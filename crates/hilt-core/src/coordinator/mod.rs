//! Recursive locking over the module dependency graph.
//!
//! `lock(M)` walks M's dependencies depth-first and takes every dependency before M itself.
//! `unlock(M)` walks the same order and releases dependencies before M, so release order equals
//! acquisition order rather than being its reverse. Callers pair `lock`/`unlock` by module name:
//! locking `A` (which takes its dependency `B`), then locking `B` directly, then unlocking `B` and
//! `A` releases `B` twice. The second release panics.
//!
//! The graph must be free of cycles and of shared sub-dependencies; either makes a lock call
//! wait on itself. See [`hilt_model::ModuleConfig::validate`].
//!
//! Inside a [`Holdings::scope`] every module the coordinator takes is recorded in that ledger
//! until some task releases it. The runner scopes each test body this way and gives back
//! whatever a timed-out, canceled or panicked body still holds.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::{Span, debug, error, warn};

use crate::{
    error::LockError,
    event::{Bus, Event, EventKind},
    registry::{ModuleLock, ModuleRegistry},
};

tokio::task_local! {
    static HOLDINGS: Holdings;
}

/// Modules taken through the coordinator by one task and not released yet.
#[derive(Debug, Clone, Default)]
pub struct Holdings(Arc<Mutex<Vec<String>>>);

impl Holdings {
    /// Run `fut` with its coordinator acquisitions recorded in this ledger.
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        HOLDINGS.scope(self, fut)
    }

    pub fn modules(&self) -> Vec<String> {
        self.entries().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn same(&self, other: &Holdings) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn push(&self, module: &str) {
        self.entries().push(module.to_string());
    }

    fn remove(&self, module: &str) {
        let mut entries = self.entries();
        if let Some(i) = entries.iter().position(|m| m == module) {
            entries.remove(i);
        }
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries())
    }
}

enum Visit<'a> {
    Module(&'a str, &'a ModuleLock),
    Unknown(String),
}

/// Lock/unlock of a module together with its transitive dependencies.
#[derive(Debug)]
pub struct LockCoordinator {
    registry: ModuleRegistry,
    owners: Mutex<HashMap<String, Holdings>>,
    bus: Bus,
    span: Span,
}

impl LockCoordinator {
    pub fn new(registry: ModuleRegistry, bus: Bus, span: Span) -> Self {
        Self {
            registry,
            owners: Mutex::new(HashMap::new()),
            bus,
            span,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Modules `lock(module)` takes, in the order it takes them.
    ///
    /// Undeclared dependencies are left out; the module itself is always last.
    pub fn acquisition_order(&self, module: &str) -> Result<Vec<String>, LockError> {
        Ok(self
            .plan(module)?
            .into_iter()
            .filter_map(|v| match v {
                Visit::Module(name, _) => Some(name.to_string()),
                Visit::Unknown(_) => None,
            })
            .collect())
    }

    /// Take `module` and all of its dependencies.
    ///
    /// Returns `false` without touching any lock when `module` is not declared.
    pub async fn lock(&self, module: &str) -> bool {
        let plan = match self.plan(module) {
            Ok(plan) => plan,
            Err(e) => {
                self.unknown(module, "lock", &e);
                return false;
            }
        };

        let mut locked = false;
        for visit in plan {
            match visit {
                Visit::Unknown(name) => {
                    self.unknown(&name, "lock", &LockError::UnknownModule(name.clone()))
                }
                Visit::Module(name, lock) => {
                    locked = match lock.acquire().await {
                        Ok(()) => {
                            self.note_acquired(name);
                            debug!(parent: &self.span, module = name, "locked");
                            self.bus
                                .publish(Event::new(EventKind::ModuleLocked).with_module(name));
                            true
                        }
                        Err(e) => {
                            warn!(parent: &self.span, module = name, "lock failed: {e}");
                            false
                        }
                    };
                }
            }
        }
        locked
    }

    /// Release `module` and all of its dependencies.
    ///
    /// Returns `false` without touching any lock when `module` is not declared.
    ///
    /// # Panics
    ///
    /// Panics when one of the visited modules is not currently held.
    pub fn unlock(&self, module: &str) -> bool {
        match self.release(module) {
            Ok(released) => released,
            Err(e) => {
                error!(parent: &self.span, module, "{e}");
                panic!("unlock({module}): {e}");
            }
        }
    }

    /// Take `module` and get a guard that unlocks it when dropped.
    pub async fn lock_scoped(self: &Arc<Self>, module: &str) -> Option<ModuleGuard> {
        if !self.lock(module).await {
            return None;
        }
        Some(ModuleGuard {
            coordinator: Arc::clone(self),
            module: module.to_string(),
        })
    }

    fn release(&self, module: &str) -> Result<bool, LockError> {
        let plan = match self.plan(module) {
            Ok(plan) => plan,
            Err(e) => {
                self.unknown(module, "unlock", &e);
                return Ok(false);
            }
        };

        for visit in plan {
            match visit {
                Visit::Unknown(name) => {
                    self.unknown(&name, "unlock", &LockError::UnknownModule(name.clone()))
                }
                Visit::Module(name, lock) => {
                    if !lock.is_held() {
                        return Err(LockError::NotHeld(name.to_string()));
                    }
                    self.note_released(name);
                    lock.release()?;
                    debug!(parent: &self.span, module = name, "unlocked");
                    self.bus
                        .publish(Event::new(EventKind::ModuleUnlocked).with_module(name));
                }
            }
        }
        Ok(true)
    }

    /// Release every module still recorded in `holdings`, most recent first.
    ///
    /// Modules another task has released meanwhile are left alone. Returns how many were
    /// released.
    pub fn release_holdings(&self, holdings: &Holdings) -> usize {
        let mut released = 0;
        for name in holdings.take().iter().rev() {
            let owned = {
                let mut owners = self.owners();
                match owners.get(name) {
                    Some(owner) if owner.same(holdings) => owners.remove(name).is_some(),
                    _ => false,
                }
            };
            if !owned {
                continue;
            }
            match self.registry.lock(name).and_then(ModuleLock::release) {
                Ok(()) => {
                    warn!(parent: &self.span, module = %name, "released after its holder stopped");
                    self.bus
                        .publish(Event::new(EventKind::ModuleUnlocked).with_module(name));
                    released += 1;
                }
                Err(e) => warn!(parent: &self.span, module = %name, "cannot release: {e}"),
            }
        }
        released
    }

    fn owners(&self) -> std::sync::MutexGuard<'_, HashMap<String, Holdings>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn note_acquired(&self, module: &str) {
        let _ = HOLDINGS.try_with(|holdings| {
            holdings.push(module);
            self.owners().insert(module.to_string(), holdings.clone());
        });
    }

    fn note_released(&self, module: &str) {
        if let Some(holdings) = self.owners().remove(module) {
            holdings.remove(module);
        }
    }

    fn plan(&self, module: &str) -> Result<Vec<Visit<'_>>, LockError> {
        if !self.registry.contains(module) {
            return Err(LockError::UnknownModule(module.to_string()));
        }
        let mut out = Vec::new();
        self.visit(module, &mut out);
        Ok(out)
    }

    fn visit<'a>(&'a self, name: &str, out: &mut Vec<Visit<'a>>) {
        let (Ok(depends), Ok(lock)) = (self.registry.depends(name), self.registry.lock(name))
        else {
            out.push(Visit::Unknown(name.to_string()));
            return;
        };
        for dep in depends {
            self.visit(dep, out);
        }
        out.push(Visit::Module(lock.name(), lock));
    }

    fn unknown(&self, module: &str, op: &str, e: &LockError) {
        warn!(parent: &self.span, module, "cannot {op}: {e}");
        self.bus.publish(
            Event::new(EventKind::ModuleUnknown)
                .with_module(module)
                .with_reason(op),
        );
    }
}

/// Scoped hold on a module taken through [`LockCoordinator::lock_scoped`].
///
/// Dropping the guard runs the regular `unlock` walk for the same module. A module already
/// released by hand is logged instead of panicking.
#[derive(Debug)]
pub struct ModuleGuard {
    coordinator: Arc<LockCoordinator>,
    module: String,
}

impl ModuleGuard {
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl Drop for ModuleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.coordinator.release(&self.module) {
            error!(parent: &self.coordinator.span, module = %self.module, "guard release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Mutex, time::Duration};

    use hilt_model::ModuleConfig;

    use crate::event::Subscribe;

    #[derive(Default)]
    struct Trace(Mutex<Vec<(EventKind, String)>>);

    impl Subscribe for Trace {
        fn on_event(&self, event: &Event) {
            let module = event.module.clone().unwrap_or_default();
            self.0.lock().unwrap().push((event.kind, module));
        }
        fn name(&self) -> &'static str {
            "trace"
        }
    }

    fn coordinator(cfg: &str) -> (Arc<LockCoordinator>, Arc<Trace>) {
        let cfg = ModuleConfig::from_json_str(cfg).unwrap();
        let trace = Arc::new(Trace::default());
        let bus = Bus::new(vec![trace.clone()]);
        let coord = LockCoordinator::new(ModuleRegistry::from_config(&cfg), bus, Span::none());
        (Arc::new(coord), trace)
    }

    const AB: &str = r#"{"A": {"depends": ["B"]}, "B": {"depends": []}}"#;

    #[tokio::test]
    async fn dependency_locked_before_and_released_before_self() {
        let (coord, trace) = coordinator(AB);

        assert!(coord.lock("A").await);
        assert_eq!(coord.registry().held(), vec!["A", "B"]);
        assert!(coord.unlock("A"));
        assert!(coord.registry().held().is_empty());

        let events = trace.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (EventKind::ModuleLocked, "B".to_string()),
                (EventKind::ModuleLocked, "A".to_string()),
                (EventKind::ModuleUnlocked, "B".to_string()),
                (EventKind::ModuleUnlocked, "A".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_module_acquires_nothing() {
        let (coord, trace) = coordinator(AB);

        assert!(!coord.lock("Z").await);
        assert!(coord.registry().held().is_empty());
        assert!(!coord.unlock("Z"));

        let events = trace.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (EventKind::ModuleUnknown, "Z".to_string()),
                (EventKind::ModuleUnknown, "Z".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn undeclared_dependency_is_skipped() {
        let (coord, _) = coordinator(r#"{"A": {"depends": ["GHOST", "B"]}, "B": {}}"#);

        assert_eq!(coord.acquisition_order("A").unwrap(), vec!["B", "A"]);
        assert!(coord.lock("A").await);
        assert_eq!(coord.registry().held(), vec!["A", "B"]);
        assert!(coord.unlock("A"));
        assert!(coord.registry().held().is_empty());
    }

    #[test]
    fn acquisition_order_is_depth_first_post_order() {
        let (coord, _) = coordinator(
            r#"{
                "RADIO": {"depends": ["MODEM", "POWER"]},
                "MODEM": {"depends": ["UART"]},
                "UART": {},
                "POWER": {}
            }"#,
        );
        assert_eq!(
            coord.acquisition_order("RADIO").unwrap(),
            vec!["UART", "MODEM", "POWER", "RADIO"]
        );
        assert_eq!(
            coord.acquisition_order("Z").unwrap_err(),
            LockError::UnknownModule("Z".into())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dependency_blocks_until_released() {
        let (coord, _) = coordinator(AB);

        assert!(coord.lock("B").await);

        let c = Arc::clone(&coord);
        let waiter = tokio::spawn(async move { c.lock("A").await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert!(!coord.registry().lock("A").unwrap().is_held());

        assert!(coord.unlock("B"));
        assert!(waiter.await.unwrap());
        assert_eq!(coord.registry().held(), vec!["A", "B"]);
    }

    #[tokio::test]
    #[should_panic(expected = "released while not held")]
    async fn double_unlock_of_shared_dependency_panics() {
        let (coord, _) = coordinator(AB);

        assert!(coord.lock("A").await);
        // B is already held through A; release it directly, then let A's walk hit it again.
        coord.registry().lock("B").unwrap().release().unwrap();
        coord.unlock("A");
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let (coord, _) = coordinator(AB);

        {
            let guard = coord.lock_scoped("A").await.expect("declared module");
            assert_eq!(guard.module(), "A");
            assert_eq!(coord.registry().held(), vec!["A", "B"]);
        }
        assert!(coord.registry().held().is_empty());
        assert!(coord.lock_scoped("Z").await.is_none());
    }

    #[tokio::test]
    async fn scoped_locks_are_recorded_until_released() {
        let (coord, _) = coordinator(AB);
        let holdings = Holdings::default();

        let c = coord.clone();
        holdings.clone().scope(async move { c.lock("A").await }).await;
        assert_eq!(holdings.modules(), vec!["B", "A"]);

        // Released outside the scope, the ledger still forgets them.
        assert!(coord.unlock("A"));
        assert!(holdings.is_empty());
        assert_eq!(coord.release_holdings(&holdings), 0);
    }

    #[tokio::test]
    async fn release_holdings_gives_back_what_is_left() {
        let (coord, trace) = coordinator(AB);
        let holdings = Holdings::default();

        let c = coord.clone();
        holdings.clone().scope(async move { c.lock("A").await }).await;
        assert_eq!(coord.release_holdings(&holdings), 2);
        assert!(coord.registry().held().is_empty());
        assert!(holdings.is_empty());

        let unlocked: Vec<_> = trace
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == EventKind::ModuleUnlocked)
            .map(|(_, module)| module.clone())
            .collect();
        assert_eq!(unlocked, vec!["A", "B"]);

        // Unscoped locks are never recorded.
        assert!(coord.lock("B").await);
        assert_eq!(coord.release_holdings(&holdings), 0);
        assert_eq!(coord.registry().held(), vec!["B"]);
    }

    #[tokio::test]
    async fn dropped_lock_call_keeps_partial_acquisitions_on_record() {
        let cfg = r#"{"A": {"depends": ["B", "C"]}, "B": {}, "C": {}}"#;
        let (coord, _) = coordinator(cfg);
        assert!(coord.lock("C").await);

        let holdings = Holdings::default();
        let c = coord.clone();
        let pending = holdings.clone().scope(async move { c.lock("A").await });
        assert!(tokio::time::timeout(Duration::from_millis(30), pending).await.is_err());

        assert_eq!(holdings.modules(), vec!["B"]);
        assert_eq!(coord.release_holdings(&holdings), 1);
        assert_eq!(coord.registry().held(), vec!["C"]);
    }
}
