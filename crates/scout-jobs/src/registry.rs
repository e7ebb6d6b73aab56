//! In-memory task registry.
//!
//! Holds every live [`Task`] keyed by id in a sharded map, so pollers read a
//! cloned snapshot without waiting on the pipelines that write them. Terminal
//! tasks are evicted after the retention period, lazily on access and by an
//! optional background sweeper; the map is also capped at
//! `max_tracked_tasks`, dropping the oldest terminal tasks first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scout_core::{
    Error, LogLevel, Result, Task, TaskConfig, TaskKind, TaskLogEntry, TaskProgress, TaskStatus,
};

struct TaskEntry {
    task: Task,
    cancel: Arc<AtomicBool>,
    finished: Option<Instant>,
}

/// Shared, cheaply cloneable task registry.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<Uuid, TaskEntry>>,
    config: TaskConfig,
}

impl TaskRegistry {
    pub fn new(config: TaskConfig) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Register a new pending task and return its id and cancellation flag.
    pub fn create(&self, kind: TaskKind) -> (Uuid, Arc<AtomicBool>) {
        self.evict_expired();
        self.enforce_capacity();

        let task = Task::new(kind);
        let id = task.id;
        let cancel = Arc::new(AtomicBool::new(false));
        self.tasks.insert(
            id,
            TaskEntry {
                task,
                cancel: cancel.clone(),
                finished: None,
            },
        );
        debug!(task_id = %id, task_kind = kind.as_str(), "Registered task");
        (id, cancel)
    }

    /// Snapshot of a task's progress, or `None` if unknown or expired.
    pub fn progress(&self, id: Uuid) -> Option<TaskProgress> {
        self.read_live(id, |task| TaskProgress::from(task))
    }

    /// Full clone of a task, or `None` if unknown or expired.
    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.read_live(id, Task::clone)
    }

    /// Read under the shard's shared lock; only an expired entry takes the
    /// write lock to be removed.
    fn read_live<T>(&self, id: Uuid, read: impl FnOnce(&Task) -> T) -> Option<T> {
        let now = Instant::now();
        {
            let entry = self.tasks.get(&id)?;
            if !self.is_expired(&entry, now) {
                return Some(read(&entry.task));
            }
        }
        self.evict_if_expired(id);
        None
    }

    /// Snapshots of every tracked task, oldest first.
    pub fn list(&self) -> Vec<TaskProgress> {
        self.evict_expired();
        let mut tasks: Vec<Task> = self.tasks.iter().map(|e| e.task.clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks.iter().map(TaskProgress::from).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Request cooperative cancellation. False when unknown or already terminal.
    pub fn cancel(&self, id: Uuid) -> bool {
        let Some(entry) = self.tasks.get(&id) else {
            return false;
        };
        if entry.task.status.is_terminal() {
            return false;
        }
        entry.cancel.store(true, Ordering::SeqCst);
        info!(task_id = %id, "Cancellation requested");
        true
    }

    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.tasks
            .get(&id)
            .map_or(false, |entry| entry.cancel.load(Ordering::SeqCst))
    }

    /// `pending → running`, entering `step` at 0%.
    pub fn start(&self, id: Uuid, step: &str) -> Result<()> {
        self.transition(id, TaskStatus::Running, |task| {
            task.started_at = Some(Utc::now());
            task.step = step.to_string();
            task.percentage = 0;
        })
    }

    /// Move to a new step. The percentage never decreases and stays below
    /// 100 until completion.
    pub fn set_step(&self, id: Uuid, step: &str, percentage: u8) -> Result<()> {
        self.update_running(id, |task| {
            task.step = step.to_string();
            raise_percentage(task, percentage);
        })
    }

    /// Raise the percentage within the current step.
    pub fn set_percentage(&self, id: Uuid, percentage: u8) -> Result<()> {
        self.update_running(id, |task| raise_percentage(task, percentage))
    }

    /// Append a log line and mirror it as a tracing event.
    pub fn log(&self, id: Uuid, level: LogLevel, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let mut entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
        let kind = entry.task.kind.as_str();
        match level {
            LogLevel::Debug => debug!(task_id = %id, task_kind = kind, "{}", message),
            LogLevel::Info => info!(task_id = %id, task_kind = kind, "{}", message),
            LogLevel::Warn => warn!(task_id = %id, task_kind = kind, "{}", message),
            LogLevel::Error => error!(task_id = %id, task_kind = kind, "{}", message),
        }
        entry.task.logs.push(TaskLogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
        Ok(())
    }

    /// `running → completed` with the result payload.
    pub fn complete(&self, id: Uuid, result: JsonValue) -> Result<()> {
        self.transition(id, TaskStatus::Completed, |task| {
            task.percentage = 100;
            task.step = "completed".to_string();
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        })
    }

    /// `pending|running → failed` with the error message stored verbatim.
    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.transition(id, TaskStatus::Failed, |task| {
            task.step = "failed".to_string();
            task.error = Some(message);
            task.completed_at = Some(Utc::now());
        })
    }

    fn transition(&self, id: Uuid, next: TaskStatus, apply: impl FnOnce(&mut Task)) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
        let current = entry.task.status;
        if !current.can_transition_to(next) {
            return Err(Error::Task(format!(
                "Invalid transition {:?} -> {:?} for task {}",
                current, next, id
            )));
        }
        entry.task.status = next;
        apply(&mut entry.task);
        if next.is_terminal() {
            entry.finished = Some(Instant::now());
        }
        Ok(())
    }

    fn update_running(&self, id: Uuid, apply: impl FnOnce(&mut Task)) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
        if entry.task.status != TaskStatus::Running {
            return Err(Error::Task(format!(
                "Task {} is {:?}, not running",
                id, entry.task.status
            )));
        }
        apply(&mut entry.task);
        Ok(())
    }

    fn is_expired(&self, entry: &TaskEntry, now: Instant) -> bool {
        entry
            .finished
            .map_or(false, |at| now.duration_since(at) >= self.config.retention())
    }

    fn evict_if_expired(&self, id: Uuid) {
        let now = Instant::now();
        if self
            .tasks
            .remove_if(&id, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            debug!(task_id = %id, "Evicted expired task");
        }
    }

    /// Drop terminal tasks past their retention. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, entry| !self.is_expired(entry, now));
        let evicted = before.saturating_sub(self.tasks.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired tasks");
        }
        evicted
    }

    /// Make room for one more task by dropping the oldest terminal ones.
    fn enforce_capacity(&self) {
        let max = self.config.max_tracked_tasks.max(1);
        if self.tasks.len() < max {
            return;
        }

        let mut finished: Vec<(Uuid, Instant)> = self
            .tasks
            .iter()
            .filter_map(|e| e.finished.map(|at| (*e.key(), at)))
            .collect();
        finished.sort_by_key(|(_, at)| *at);

        let excess = self.tasks.len() + 1 - max;
        for (id, _) in finished.into_iter().take(excess) {
            self.tasks.remove(&id);
        }
        if self.tasks.len() >= max {
            warn!(
                tracked = self.tasks.len(),
                max, "Task registry over capacity with no finished tasks to evict"
            );
        }
    }

    /// Spawn a background loop that evicts expired tasks every sweep interval.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let registry = self.clone();
        let interval = self.config.sweep_interval();

        tokio::spawn(async move {
            info!(
                subsystem = "jobs",
                component = "registry",
                interval_secs = interval.as_secs(),
                "Task sweeper started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        registry.evict_expired();
                    }
                }
            }
            info!(subsystem = "jobs", component = "registry", "Task sweeper stopped");
        });

        SweeperHandle { shutdown_tx }
    }
}

fn raise_percentage(task: &mut Task, percentage: u8) {
    task.percentage = task.percentage.max(percentage.min(99));
}

/// Handle for stopping the background sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(retention_secs: u64, max: usize) -> TaskRegistry {
        TaskRegistry::new(
            TaskConfig::default()
                .with_retention_secs(retention_secs)
                .with_max_tracked(max),
        )
    }

    #[test]
    fn test_unknown_id_is_none() {
        let reg = registry(60, 10);
        assert!(reg.progress(Uuid::new_v4()).is_none());
        assert!(!reg.cancel(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let reg = registry(60, 10);
        let (id, _) = reg.create(TaskKind::Recommend);
        assert_eq!(reg.progress(id).unwrap().status, TaskStatus::Pending);

        reg.start(id, "fetch").unwrap();
        reg.set_step(id, "score", 10).unwrap();
        reg.set_percentage(id, 25).unwrap();
        reg.log(id, LogLevel::Info, "scored 3 papers").unwrap();
        reg.complete(id, serde_json::json!({"ok": true})).unwrap();

        let progress = reg.progress(id).unwrap();
        assert_eq!(progress.status, TaskStatus::Completed);
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.logs.len(), 1);
        assert_eq!(progress.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_percentage_never_decreases_or_reaches_100_while_running() {
        let reg = registry(60, 10);
        let (id, _) = reg.create(TaskKind::Match);
        reg.start(id, "prepare").unwrap();
        reg.set_percentage(id, 40).unwrap();
        reg.set_percentage(id, 20).unwrap();
        assert_eq!(reg.progress(id).unwrap().percentage, 40);
        reg.set_percentage(id, 100).unwrap();
        assert_eq!(reg.progress(id).unwrap().percentage, 99);
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let reg = registry(60, 10);
        let (id, _) = reg.create(TaskKind::Recommend);
        reg.start(id, "fetch").unwrap();
        reg.fail(id, "Fetch error: boom").unwrap();

        assert!(reg.complete(id, JsonValue::Null).is_err());
        assert!(reg.start(id, "fetch").is_err());
        assert!(reg.set_percentage(id, 50).is_err());
        assert!(!reg.cancel(id));

        let progress = reg.progress(id).unwrap();
        assert_eq!(progress.status, TaskStatus::Failed);
        assert_eq!(progress.error.as_deref(), Some("Fetch error: boom"));
    }

    #[tokio::test]
    async fn test_pending_can_fail_directly() {
        let reg = registry(60, 10);
        let (id, _) = reg.create(TaskKind::Recommend);
        reg.fail(id, "Configuration error: no key").unwrap();
        assert_eq!(reg.progress(id).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_sets_flag() {
        let reg = registry(60, 10);
        let (id, flag) = reg.create(TaskKind::Recommend);
        assert!(reg.cancel(id));
        assert!(flag.load(Ordering::SeqCst));
        assert!(reg.is_cancelled(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_tasks_expire() {
        let reg = registry(30, 10);
        let (done, _) = reg.create(TaskKind::Recommend);
        let (live, _) = reg.create(TaskKind::Recommend);
        reg.start(done, "fetch").unwrap();
        reg.complete(done, JsonValue::Null).unwrap();
        reg.start(live, "fetch").unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(reg.progress(done).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(reg.progress(done).is_none());
        assert!(reg.progress(live).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_live_task_keeps_it() {
        let reg = registry(30, 10);
        let (id, _) = reg.create(TaskKind::Recommend);
        reg.start(id, "fetch").unwrap();
        for _ in 0..3 {
            assert_eq!(reg.progress(id).unwrap().status, TaskStatus::Running);
            tokio::time::advance(Duration::from_secs(60)).await;
        }

        reg.complete(id, JsonValue::Null).unwrap();
        assert!(reg.get(id).is_some());
        assert_eq!(reg.len(), 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(reg.progress(id).is_none());
        assert_eq!(reg.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_finished_first() {
        let reg = registry(3600, 3);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (id, _) = reg.create(TaskKind::Match);
            reg.start(id, "prepare").unwrap();
            ids.push(id);
        }
        reg.fail(ids[1], "x").unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        reg.fail(ids[0], "y").unwrap();

        let (newest, _) = reg.create(TaskKind::Match);
        assert_eq!(reg.len(), 3);
        assert!(reg.get(ids[1]).is_none());
        assert!(reg.get(ids[0]).is_some());
        assert!(reg.get(ids[2]).is_some());
        assert!(reg.get(newest).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_stops() {
        let reg = TaskRegistry::new(TaskConfig {
            retention_secs: 5,
            max_tracked_tasks: 10,
            sweep_interval_secs: 1,
        });
        let (id, _) = reg.create(TaskKind::Recommend);
        reg.start(id, "fetch").unwrap();
        reg.complete(id, JsonValue::Null).unwrap();

        let handle = reg.start_sweeper();
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(reg.len(), 0);
        handle.shutdown().await.unwrap();
    }
}
