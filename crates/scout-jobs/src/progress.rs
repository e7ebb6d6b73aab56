//! Weighted stage progress for a single running task.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use scout_core::{defaults, Error, LogLevel, Result};

use crate::registry::TaskRegistry;

pub const STAGE_FETCH: &str = "fetch";
pub const STAGE_SCORE: &str = "score";
pub const STAGE_ANALYZE: &str = "analyze";
pub const STAGE_PREPARE: &str = "prepare";
pub const STAGE_RECORD: &str = "record";

/// A named pipeline stage and its share of the overall progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub weight: u32,
}

/// Ordered stages of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWeights {
    stages: Vec<Stage>,
}

impl StageWeights {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// fetch → score → analyze.
    pub fn recommend() -> Self {
        let [fetch, score, analyze] = defaults::RECOMMEND_STAGE_WEIGHTS;
        Self::new(vec![
            Stage { name: STAGE_FETCH, weight: fetch },
            Stage { name: STAGE_SCORE, weight: score },
            Stage { name: STAGE_ANALYZE, weight: analyze },
        ])
    }

    /// prepare → score → record.
    pub fn matching() -> Self {
        let [prepare, score, record] = defaults::MATCH_STAGE_WEIGHTS;
        Self::new(vec![
            Stage { name: STAGE_PREPARE, weight: prepare },
            Stage { name: STAGE_SCORE, weight: score },
            Stage { name: STAGE_RECORD, weight: record },
        ])
    }

    pub fn first(&self) -> Option<&'static str> {
        self.stages.first().map(|s| s.name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    fn total_weight(&self) -> u64 {
        self.stages.iter().map(|s| s.weight as u64).sum::<u64>().max(1)
    }

    /// Floor of the overall percentage after `done` of `total` items of
    /// stage `index`.
    pub fn percent_at(&self, index: usize, done: usize, total: usize) -> u8 {
        let before: u64 = self.stages[..index.min(self.stages.len())]
            .iter()
            .map(|s| s.weight as u64)
            .sum();
        let weight = self.stages.get(index).map_or(0, |s| s.weight as u64);
        let (done, total) = if total == 0 {
            (0, 1)
        } else {
            (done.min(total) as u64, total as u64)
        };
        let numerator = (before * total + weight * done) * 100;
        let percent = numerator / (self.total_weight() * total);
        percent.min(100) as u8
    }
}

/// Writes one task's step, percentage and logs into the registry.
///
/// Log writes never fail the pipeline: if the task has vanished the line is
/// only emitted as a tracing event.
pub struct ProgressTracker {
    task_id: Uuid,
    registry: TaskRegistry,
    cancel: Arc<AtomicBool>,
    stages: StageWeights,
    current: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(
        task_id: Uuid,
        registry: TaskRegistry,
        cancel: Arc<AtomicBool>,
        stages: StageWeights,
    ) -> Self {
        Self {
            task_id,
            registry,
            cancel,
            stages,
            current: AtomicUsize::new(0),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// `pending → running` at the first stage.
    pub fn start(&self) -> Result<()> {
        let first = self
            .stages
            .first()
            .ok_or_else(|| Error::Internal("Pipeline has no stages".into()))?;
        self.registry.start(self.task_id, first)?;
        self.info(format!("Task started: {}", first));
        Ok(())
    }

    /// Enter `name`, moving the percentage to the stage boundary.
    pub fn enter_stage(&self, name: &str) -> Result<()> {
        let index = self
            .stages
            .index_of(name)
            .ok_or_else(|| Error::Internal(format!("Unknown stage: {}", name)))?;
        self.current.store(index, Ordering::SeqCst);
        let percentage = self.stages.percent_at(index, 0, 1);
        self.registry.set_step(self.task_id, name, percentage)?;
        self.info(format!("Stage {} started ({}%)", name, percentage));
        Ok(())
    }

    /// Record `done` of `total` items finished in the current stage.
    pub fn item_progress(&self, done: usize, total: usize) {
        let index = self.current.load(Ordering::SeqCst);
        let percentage = self.stages.percent_at(index, done, total);
        if let Err(e) = self.registry.set_percentage(self.task_id, percentage) {
            debug!(task_id = %self.task_id, error = %e, "Progress update skipped");
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if let Err(e) = self.registry.log(self.task_id, level, message) {
            debug!(task_id = %self.task_id, error = %e, "Task log line dropped");
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// `running → completed` with the result payload at 100%.
    pub fn complete(&self, result: JsonValue) -> Result<()> {
        self.info("Task completed");
        self.registry.complete(self.task_id, result)
    }

    /// Log `error` and move the task to `failed` with its message.
    pub fn fail(&self, error: &Error) -> Result<()> {
        let message = error.to_string();
        self.log(LogLevel::Error, format!("Task failed: {}", message));
        self.registry.fail(self.task_id, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::{TaskConfig, TaskKind, TaskStatus};

    #[test]
    fn test_stage_boundaries() {
        let weights = StageWeights::recommend();
        assert_eq!(weights.percent_at(0, 0, 1), 0);
        assert_eq!(weights.percent_at(1, 0, 1), 10);
        assert_eq!(weights.percent_at(2, 0, 1), 40);
        assert_eq!(weights.percent_at(2, 1, 1), 100);

        let matching = StageWeights::matching();
        assert_eq!(matching.percent_at(1, 0, 1), 10);
        assert_eq!(matching.percent_at(2, 0, 1), 90);
    }

    #[test]
    fn test_within_stage_progress_floors() {
        let weights = StageWeights::recommend();
        // score stage: 10 + 30 * 1/3 = 20
        assert_eq!(weights.percent_at(1, 1, 3), 20);
        // 10 + 30 * 2/7 = 18.57
        assert_eq!(weights.percent_at(1, 2, 7), 18);
        assert_eq!(weights.percent_at(1, 0, 0), 10);
    }

    #[test]
    fn test_custom_weights() {
        let weights = StageWeights::new(vec![
            Stage { name: "a", weight: 1 },
            Stage { name: "b", weight: 2 },
        ]);
        assert_eq!(weights.percent_at(1, 0, 1), 33);
        assert_eq!(weights.index_of("b"), Some(1));
        assert_eq!(weights.index_of("z"), None);
    }

    #[tokio::test]
    async fn test_tracker_drives_registry() {
        let registry = TaskRegistry::new(TaskConfig::default());
        let (id, cancel) = registry.create(TaskKind::Recommend);
        let tracker = ProgressTracker::new(id, registry.clone(), cancel, StageWeights::recommend());

        tracker.start().unwrap();
        assert_eq!(registry.progress(id).unwrap().step, STAGE_FETCH);

        tracker.enter_stage(STAGE_SCORE).unwrap();
        tracker.item_progress(3, 6);
        let progress = registry.progress(id).unwrap();
        assert_eq!(progress.step, STAGE_SCORE);
        assert_eq!(progress.percentage, 25);

        tracker.enter_stage(STAGE_ANALYZE).unwrap();
        tracker.item_progress(1, 1);
        assert_eq!(registry.progress(id).unwrap().percentage, 99);

        tracker.complete(JsonValue::Null).unwrap();
        let progress = registry.progress(id).unwrap();
        assert_eq!(progress.status, TaskStatus::Completed);
        assert_eq!(progress.percentage, 100);
    }

    #[tokio::test]
    async fn test_fail_logs_before_transition() {
        let registry = TaskRegistry::new(TaskConfig::default());
        let (id, cancel) = registry.create(TaskKind::Match);
        let tracker = ProgressTracker::new(id, registry.clone(), cancel, StageWeights::matching());
        tracker.start().unwrap();
        tracker.fail(&Error::Cancelled).unwrap();

        let progress = registry.progress(id).unwrap();
        assert_eq!(progress.status, TaskStatus::Failed);
        assert_eq!(progress.error.as_deref(), Some("Task cancelled"));
        let last = progress.logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.contains("Task cancelled"));
    }

    #[tokio::test]
    async fn test_unknown_stage_rejected() {
        let registry = TaskRegistry::new(TaskConfig::default());
        let (id, cancel) = registry.create(TaskKind::Match);
        let tracker = ProgressTracker::new(id, registry, cancel, StageWeights::matching());
        tracker.start().unwrap();
        assert!(tracker.enter_stage(STAGE_FETCH).is_err());
    }

    #[test]
    fn test_check_cancelled() {
        let registry = TaskRegistry::new(TaskConfig::default());
        let (id, cancel) = registry.create(TaskKind::Match);
        let tracker = ProgressTracker::new(id, registry.clone(), cancel, StageWeights::matching());
        assert!(tracker.check_cancelled().is_ok());
        registry.cancel(id);
        assert_eq!(tracker.check_cancelled().unwrap_err(), Error::Cancelled);
    }
}
