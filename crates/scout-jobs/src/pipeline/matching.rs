//! Category matching: prepare → score → record.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::instrument;

use scout_core::{
    AnalysisClient, CategoryInfo, CategoryMatchRecord, Error, MatchReport, PipelineConfig, Result,
    TaskKind,
};
use scout_store::CategoryStore;

use crate::pool::WorkerPool;
use crate::progress::{ProgressTracker, StageWeights, STAGE_PREPARE, STAGE_RECORD, STAGE_SCORE};
use crate::stages;

pub struct MatchPipeline {
    analyst: Arc<dyn AnalysisClient>,
    pool: WorkerPool,
    store: Arc<CategoryStore>,
    config: PipelineConfig,
    username: String,
    user_input: String,
    candidates: Vec<CategoryInfo>,
}

impl MatchPipeline {
    pub fn new(
        analyst: Arc<dyn AnalysisClient>,
        pool: WorkerPool,
        store: Arc<CategoryStore>,
        config: PipelineConfig,
        username: String,
        user_input: String,
        candidates: Vec<CategoryInfo>,
    ) -> Self {
        Self {
            analyst,
            pool,
            store,
            config,
            username,
            user_input,
            candidates,
        }
    }

    /// Candidates with duplicate ids removed, first occurrence wins.
    fn prepare(&self) -> Vec<CategoryInfo> {
        let mut seen = HashSet::new();
        self.candidates
            .iter()
            .filter(|c| seen.insert(c.id.as_str()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl super::TaskPipeline for MatchPipeline {
    fn kind(&self) -> TaskKind {
        TaskKind::Match
    }

    fn stages(&self) -> StageWeights {
        StageWeights::matching()
    }

    fn validate(&self) -> Result<()> {
        self.analyst.validate()?;
        if self.username.trim().is_empty() {
            return Err(Error::InvalidInput("Username is required".into()));
        }
        if self.user_input.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Research description must not be empty".into(),
            ));
        }
        if self.candidates.is_empty() {
            return Err(Error::InvalidInput("No candidate categories given".into()));
        }
        Ok(())
    }

    #[instrument(skip(self, tracker), fields(subsystem = "jobs", component = "matching", op = "run", task_id = %tracker.task_id(), username = %self.username))]
    async fn run(&self, tracker: &ProgressTracker) -> Result<JsonValue> {
        tracker.enter_stage(STAGE_PREPARE)?;
        let categories = self.prepare();
        if categories.len() < self.candidates.len() {
            tracker.info(format!(
                "Dropped {} duplicate categor(ies)",
                self.candidates.len() - categories.len()
            ));
        }
        tracker.check_cancelled()?;

        tracker.enter_stage(STAGE_SCORE)?;
        let analyst = &self.analyst;
        let user_input = self.user_input.as_str();
        let items: Vec<&CategoryInfo> = categories.iter().collect();
        let outcomes = self
            .pool
            .run_all(
                items,
                tracker.cancel_flag(),
                |done, total| tracker.item_progress(done, total),
                |category| async move { analyst.match_category(user_input, category).await },
            )
            .await;
        tracker.check_cancelled()?;

        let mut scored = Vec::with_capacity(categories.len());
        let mut failed = 0;
        let mut last_error = None;
        for (category, outcome) in categories.iter().zip(outcomes) {
            match outcome.result {
                Ok(score) => scored.push((category.clone(), score)),
                Err(e) => {
                    tracker.warn(format!("Matching failed for {}: {}", category.id, e));
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }
        if scored.is_empty() {
            return Err(Error::Task(format!(
                "Matching failed for all {} categories (last error: {})",
                categories.len(),
                last_error.map(|e| e.to_string()).unwrap_or_default()
            )));
        }

        let matches = stages::rank_categories(scored, self.config.num_category_matches.max(1));
        tracker.info(format!(
            "Ranked {} categor(ies), {} failed",
            matches.len(),
            failed
        ));
        tracker.check_cancelled()?;

        tracker.enter_stage(STAGE_RECORD)?;
        let record_index = match matches.first() {
            Some(best) => {
                let record = CategoryMatchRecord {
                    username: self.username.clone(),
                    category_id: best.category.id.clone(),
                    user_input: self.user_input.clone(),
                    score: best.score,
                    timestamp: Utc::now(),
                };
                let index = self.store.append(record).await?;
                tracker.info(format!(
                    "Recorded best match {} at index {}",
                    best.category.id, index
                ));
                Some(index)
            }
            None => None,
        };

        let report = MatchReport {
            username: self.username.clone(),
            user_input: self.user_input.clone(),
            matches,
            failed,
            record_index,
        };
        Ok(serde_json::to_value(report)?)
    }
}
