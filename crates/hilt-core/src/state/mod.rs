use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use hilt_model::{TaskId, TaskInfo, TaskStatus};

/// In-memory record of every task a runner dispatched.
#[derive(Clone, Debug)]
pub struct TaskState {
    inner: Arc<RwLock<TaskStateInner>>,
}

#[derive(Debug)]
struct TaskStateInner {
    /// Tasks indexed by TaskId.
    tasks: HashMap<TaskId, TaskInfo>,
    /// Index: func -> task IDs in dispatch order.
    by_func: HashMap<String, Vec<TaskId>>,
    /// Dispatch order.
    order: Vec<TaskId>,
}

impl TaskState {
    /// Create empty task state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TaskStateInner {
                tasks: HashMap::new(),
                by_func: HashMap::new(),
                order: Vec::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskStateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskStateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly dispatched task as pending.
    pub fn add_task(&self, id: TaskId, func: impl Into<String>) {
        let mut inner = self.write();
        let func = func.into();

        let now = SystemTime::now();
        let info = TaskInfo {
            id: id.clone(),
            func: func.clone(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            error: None,
        };

        inner.tasks.insert(id.clone(), info);
        inner.by_func.entry(func).or_default().push(id.clone());
        inner.order.push(id);
    }

    /// Update task status (and keep the latest error text, if any).
    pub fn update_status(&self, id: &TaskId, status: TaskStatus, error: Option<String>) {
        let mut inner = self.write();

        if let Some(info) = inner.tasks.get_mut(id) {
            info.status = status;
            info.updated_at = SystemTime::now();
            if let Some(err) = error {
                info.error = Some(err);
            }
        }
    }

    /// Get task info by ID.
    pub fn get(&self, id: &TaskId) -> Option<TaskInfo> {
        self.read().tasks.get(id).cloned()
    }

    /// Tasks dispatched for `func`, in dispatch order.
    pub fn list_by_func(&self, func: &str) -> Vec<TaskInfo> {
        let inner = self.read();

        inner
            .by_func
            .get(func)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All tasks, in dispatch order.
    pub fn list_all(&self) -> Vec<TaskInfo> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    /// Tasks with the given status, in dispatch order.
    pub fn list_by_status(&self, status: TaskStatus) -> Vec<TaskInfo> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|info| info.status == status)
            .cloned()
            .collect()
    }

    /// Number of tasks in `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.read()
            .tasks
            .values()
            .filter(|info| info.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tasks.is_empty()
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_task() {
        let state = TaskState::new();
        let id = TaskId::new("sleep", 1);

        state.add_task(id.clone(), "sleep");

        let info = state.get(&id).expect("task should exist");
        assert_eq!(info.id, id);
        assert_eq!(info.func, "sleep");
        assert_eq!(info.status, TaskStatus::Pending);
        assert!(info.error.is_none());
    }

    #[test]
    fn update_status_with_error() {
        let state = TaskState::new();
        let id = TaskId::new("print", 1);

        state.add_task(id.clone(), "print");
        state.update_status(&id, TaskStatus::Running, None);
        state.update_status(&id, TaskStatus::Failed, Some("no prompt".to_string()));

        let info = state.get(&id).unwrap();
        assert_eq!(info.status, TaskStatus::Failed);
        assert_eq!(info.error.as_deref(), Some("no prompt"));
    }

    #[test]
    fn update_unknown_task_is_ignored() {
        let state = TaskState::new();
        state.update_status(&TaskId::from("ghost#1"), TaskStatus::Running, None);
        assert!(state.is_empty());
    }

    #[test]
    fn listings_keep_dispatch_order() {
        let state = TaskState::new();
        for (seq, func) in ["sleep", "print", "sleep", "print"].iter().enumerate() {
            state.add_task(TaskId::new(func, seq as u64 + 1), *func);
        }
        state.update_status(&TaskId::new("print", 2), TaskStatus::Succeeded, None);
        state.update_status(&TaskId::new("print", 4), TaskStatus::Succeeded, None);

        let ids: Vec<_> = state
            .list_all()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ids, vec!["sleep#1", "print#2", "sleep#3", "print#4"]);

        let sleeps: Vec<_> = state
            .list_by_func("sleep")
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(sleeps, vec!["sleep#1", "sleep#3"]);

        assert_eq!(state.list_by_status(TaskStatus::Succeeded).len(), 2);
        assert_eq!(state.count(TaskStatus::Pending), 2);
        assert!(state.list_by_func("reset").is_empty());
    }
}
