//! Public facade: submit tasks, poll them, cancel them and manage category
//! records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use scout_core::{
    AnalysisClient, CategoryFilter, CategoryInfo, CategoryMatchRecord, CategoryRecordPatch, Error,
    PaperSource, PipelineConfig, Result, ScoutConfig, TaskConfig, TaskProgress, UserProfile,
};
use scout_inference::ModelAnalyst;
use scout_store::CategoryStore;

use crate::fetcher::RetryingFetcher;
use crate::pipeline::{self, MatchPipeline, RecommendParams, RecommendPipeline, TaskPipeline};
use crate::pool::WorkerPool;
use crate::progress::ProgressTracker;
use crate::registry::{SweeperHandle, TaskRegistry};

/// A unit of work accepted by [`ScoutService::submit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskRequest {
    /// Recommend and summarize new papers for a profile.
    Recommend {
        profile: UserProfile,
        #[serde(default)]
        params: RecommendParams,
    },
    /// Rank candidate categories against a research description.
    Match {
        username: String,
        user_input: String,
        candidates: Vec<CategoryInfo>,
    },
}

pub struct ScoutService {
    registry: TaskRegistry,
    pool: WorkerPool,
    fetcher: RetryingFetcher,
    analyst: Arc<dyn AnalysisClient>,
    store: Arc<CategoryStore>,
    config: PipelineConfig,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ScoutService {
    /// Assemble a service from configuration, opening the category store
    /// and building both model backends.
    pub async fn from_config(config: &ScoutConfig, source: Arc<dyn PaperSource>) -> Result<Self> {
        config.pipeline.validate()?;
        let store = match config.category_store_path {
            Some(ref path) => CategoryStore::open(path.clone()).await?,
            None => CategoryStore::in_memory(),
        };
        let analyst = ModelAnalyst::from_config(&config.inference)?;
        info!(
            subsystem = "jobs",
            component = "service",
            light_model = analyst.light_model(),
            heavy_model = analyst.heavy_model(),
            max_workers = config.pipeline.max_workers,
            "Scout service configured"
        );

        Ok(ScoutServiceBuilder::new(source, Arc::new(analyst))
            .with_pipeline_config(config.pipeline.clone())
            .with_task_config(config.tasks.clone())
            .with_store(store)
            .with_sweeper(true)
            .build())
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn store(&self) -> &Arc<CategoryStore> {
        &self.store
    }

    /// Register a task and start it in the background.
    ///
    /// Configuration and input problems fail the task before any external
    /// call is made; the id is returned either way.
    #[instrument(skip(self, request), fields(subsystem = "jobs", component = "service", op = "submit"))]
    pub fn submit(&self, request: TaskRequest) -> Uuid {
        let task = self.pipeline_for(request);
        let task_kind = task.kind().as_str();
        let (task_id, cancel) = self.registry.create(task.kind());
        let tracker = Arc::new(ProgressTracker::new(
            task_id,
            self.registry.clone(),
            cancel,
            task.stages(),
        ));

        if let Err(e) = task.validate() {
            let e = if matches!(e, Error::Unauthorized(_)) {
                Error::Config(e.to_string())
            } else {
                e
            };
            warn!(%task_id, task_kind, error = %e, "Task rejected at submission");
            if let Err(fail_err) = tracker.fail(&e) {
                warn!(%task_id, error = %fail_err, "Failed to record rejected task");
            }
            return task_id;
        }

        info!(%task_id, task_kind, "Task submitted");
        tokio::spawn(pipeline::execute(task, tracker));
        task_id
    }

    fn pipeline_for(&self, request: TaskRequest) -> Arc<dyn TaskPipeline> {
        match request {
            TaskRequest::Recommend { profile, params } => Arc::new(RecommendPipeline::new(
                self.fetcher.clone(),
                self.analyst.clone(),
                self.pool.clone(),
                self.config.clone(),
                profile,
                params,
            )),
            TaskRequest::Match {
                username,
                user_input,
                candidates,
            } => Arc::new(MatchPipeline::new(
                self.analyst.clone(),
                self.pool.clone(),
                self.store.clone(),
                self.config.clone(),
                username,
                user_input,
                candidates,
            )),
        }
    }

    /// Snapshot of a task; `None` when unknown or expired.
    pub fn progress(&self, task_id: Uuid) -> Option<TaskProgress> {
        self.registry.progress(task_id)
    }

    /// Request cancellation. `false` when unknown or already terminal.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let cancelled = self.registry.cancel(task_id);
        if cancelled {
            info!(%task_id, "Cancellation requested");
        }
        cancelled
    }

    pub fn list_tasks(&self) -> Vec<TaskProgress> {
        self.registry.list()
    }

    pub async fn list_category_records(
        &self,
        filter: Option<CategoryFilter>,
    ) -> Vec<CategoryMatchRecord> {
        self.store.list(filter.as_ref()).await
    }

    pub async fn update_category_record(
        &self,
        index: usize,
        patch: CategoryRecordPatch,
    ) -> Result<CategoryMatchRecord> {
        self.store.patch(index, &patch).await
    }

    pub async fn delete_category_record(&self, index: usize) -> Result<CategoryMatchRecord> {
        self.store.delete(index).await
    }

    pub async fn delete_category_records(&self, indices: &[usize]) -> Result<usize> {
        self.store.delete_many(indices).await
    }

    /// Stop the eviction sweeper. Running tasks are left to finish.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.shutdown().await?;
        }
        info!(subsystem = "jobs", component = "service", "Scout service shut down");
        Ok(())
    }
}

/// Builder for a [`ScoutService`] with injected collaborators.
pub struct ScoutServiceBuilder {
    source: Arc<dyn PaperSource>,
    analyst: Arc<dyn AnalysisClient>,
    pipeline: PipelineConfig,
    tasks: TaskConfig,
    store: Option<CategoryStore>,
    sweeper: bool,
}

impl ScoutServiceBuilder {
    pub fn new(source: Arc<dyn PaperSource>, analyst: Arc<dyn AnalysisClient>) -> Self {
        Self {
            source,
            analyst,
            pipeline: PipelineConfig::default(),
            tasks: TaskConfig::default(),
            store: None,
            sweeper: false,
        }
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    pub fn with_task_config(mut self, config: TaskConfig) -> Self {
        self.tasks = config;
        self
    }

    /// Use `store` instead of an in-memory one.
    pub fn with_store(mut self, store: CategoryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Run the background eviction sweeper. Requires a Tokio runtime at
    /// [`build`](Self::build) time.
    pub fn with_sweeper(mut self, enabled: bool) -> Self {
        self.sweeper = enabled;
        self
    }

    pub fn build(self) -> ScoutService {
        let registry = TaskRegistry::new(self.tasks);
        let sweeper = self.sweeper.then(|| registry.start_sweeper());
        ScoutService {
            pool: WorkerPool::new(self.pipeline.max_workers),
            fetcher: RetryingFetcher::from_config(self.source, &self.pipeline),
            analyst: self.analyst,
            store: Arc::new(self.store.unwrap_or_else(CategoryStore::in_memory)),
            config: self.pipeline,
            registry,
            sweeper: Mutex::new(sweeper),
        }
    }
}
