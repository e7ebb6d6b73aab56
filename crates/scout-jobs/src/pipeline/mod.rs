//! Task pipelines and the executor that drives them.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use scout_core::{Error, Result, TaskKind};

use crate::progress::{ProgressTracker, StageWeights};

pub mod matching;
pub mod recommend;

pub use matching::MatchPipeline;
pub use recommend::{RecommendParams, RecommendPipeline};

/// One submitted unit of work.
#[async_trait]
pub trait TaskPipeline: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Stages reported through the tracker, in order.
    fn stages(&self) -> StageWeights;

    /// Reject the submission before any external call is made.
    fn validate(&self) -> Result<()>;

    /// Run every stage and return the task's result payload.
    async fn run(&self, tracker: &ProgressTracker) -> Result<JsonValue>;
}

/// Run `pipeline` to a terminal state, recording the outcome on `tracker`.
pub async fn execute(pipeline: Arc<dyn TaskPipeline>, tracker: Arc<ProgressTracker>) {
    let start = Instant::now();
    let task_id = tracker.task_id();
    let task_kind = pipeline.kind().as_str();

    if let Err(e) = tracker.start() {
        error!(%task_id, task_kind, error = %e, "Task could not be started");
        return;
    }
    info!(%task_id, task_kind, "Processing task");

    let runner = {
        let pipeline = pipeline.clone();
        let tracker = tracker.clone();
        tokio::spawn(async move {
            tracker.check_cancelled()?;
            pipeline.run(&tracker).await
        })
    };
    let outcome = match runner.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(%task_id, task_kind, error = ?e, "Task pipeline panicked");
            Err(Error::Internal(format!("Task pipeline aborted: {}", e)))
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(result) => match tracker.complete(result) {
            Ok(()) => info!(%task_id, task_kind, duration_ms, "Task completed successfully"),
            Err(e) => error!(%task_id, error = %e, "Failed to mark task as completed"),
        },
        Err(failure) => match tracker.fail(&failure) {
            Ok(()) => warn!(%task_id, task_kind, error = %failure, duration_ms, "Task failed"),
            Err(e) => error!(%task_id, error = %e, "Failed to mark task as failed"),
        },
    }
}
