use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use hilt_model::ModuleConfig;
use tokio::sync::Semaphore;

use crate::error::LockError;

/// Binary lock guarding one hardware module.
///
/// Acquisition and release are decoupled (no guard object): whoever holds the module
/// releases it by name later, possibly from a different task. The lock is not reentrant.
#[derive(Debug)]
pub struct ModuleLock {
    name: String,
    sem: Semaphore,
    held: AtomicBool,
}

impl ModuleLock {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sem: Semaphore::new(1),
            held: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Suspend until the module is free, then take it.
    pub async fn acquire(&self) -> Result<(), LockError> {
        let permit = self
            .sem
            .acquire()
            .await
            .map_err(|_| LockError::Closed(self.name.clone()))?;
        permit.forget();
        self.held.store(true, Ordering::Release);
        Ok(())
    }

    /// Take the module only if it is free right now.
    pub fn try_acquire(&self) -> bool {
        match self.sem.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.held.store(true, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }

    /// Give the module back.
    ///
    /// Fails with [`LockError::NotHeld`] instead of minting a second permit.
    pub fn release(&self) -> Result<(), LockError> {
        if self
            .held
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LockError::NotHeld(self.name.clone()));
        }
        self.sem.add_permits(1);
        Ok(())
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Module {
    depends: Vec<String>,
    lock: ModuleLock,
}

/// Every declared module with its lock and normalized dependency list.
///
/// Built once from a [`ModuleConfig`]; the set of modules never changes afterwards.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    pub fn from_config(cfg: &ModuleConfig) -> Self {
        let modules = cfg
            .iter()
            .map(|(name, spec)| {
                let module = Module {
                    depends: spec.depends.clone(),
                    lock: ModuleLock::new(name),
                };
                (name.to_string(), module)
            })
            .collect();
        Self { modules }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn depends(&self, name: &str) -> Result<&[String], LockError> {
        self.modules
            .get(name)
            .map(|m| m.depends.as_slice())
            .ok_or_else(|| LockError::UnknownModule(name.to_string()))
    }

    pub fn lock(&self, name: &str) -> Result<&ModuleLock, LockError> {
        self.modules
            .get(name)
            .map(|m| &m.lock)
            .ok_or_else(|| LockError::UnknownModule(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Names of the modules currently held, in name order.
    pub fn held(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, m)| m.lock.is_held())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
