//! Fetch → score → filter/rank/tier → analyze.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use scout_core::{
    AnalysisClient, CandidateItem, Error, PipelineConfig, RecommendationReport, Result,
    ScoredItem, TaskKind, Tier, UnscoredItem, UserProfile,
};

use crate::fetcher::RetryingFetcher;
use crate::pool::WorkerPool;
use crate::progress::{ProgressTracker, StageWeights, STAGE_ANALYZE, STAGE_FETCH, STAGE_SCORE};
use crate::stages;

/// Per-submission overrides for a recommendation task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendParams {
    /// Paper source query; defaults to the profile's category.
    #[serde(default)]
    pub query: Option<String>,
    /// Candidate cap; defaults to and never exceeds `MAX_ENTRIES`.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

pub struct RecommendPipeline {
    fetcher: RetryingFetcher,
    analyst: Arc<dyn AnalysisClient>,
    pool: WorkerPool,
    config: PipelineConfig,
    profile: UserProfile,
    params: RecommendParams,
}

impl RecommendPipeline {
    pub fn new(
        fetcher: RetryingFetcher,
        analyst: Arc<dyn AnalysisClient>,
        pool: WorkerPool,
        config: PipelineConfig,
        profile: UserProfile,
        params: RecommendParams,
    ) -> Self {
        Self {
            fetcher,
            analyst,
            pool,
            config,
            profile,
            params,
        }
    }

    fn query(&self) -> &str {
        self.params
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&self.profile.category_id)
    }

    fn limit(&self) -> usize {
        self.params
            .max_entries
            .map_or(self.config.max_entries, |n| n.min(self.config.max_entries))
    }

    /// Score every candidate, applying the negative-interest penalty.
    async fn score_all(
        &self,
        tracker: &ProgressTracker,
        candidates: &[CandidateItem],
    ) -> Result<(Vec<(CandidateItem, f32)>, Vec<UnscoredItem>)> {
        let profile = &self.profile;
        let analyst = &self.analyst;
        let items: Vec<&CandidateItem> = candidates.iter().collect();
        let outcomes = self
            .pool
            .run_all(
                items,
                tracker.cancel_flag(),
                |done, total| tracker.item_progress(done, total),
                |item| async move { analyst.score(profile, item).await },
            )
            .await;
        tracker.check_cancelled()?;

        let mut scored = Vec::with_capacity(candidates.len());
        let mut unscored = Vec::new();
        let mut penalized = 0;
        for (item, outcome) in candidates.iter().zip(outcomes) {
            match outcome.result {
                Ok(raw) => {
                    let score = stages::apply_negative_penalty(
                        profile,
                        item,
                        raw,
                        self.config.negative_interest_penalty,
                    );
                    if score < raw {
                        penalized += 1;
                    }
                    scored.push((item.clone(), score));
                }
                Err(e) => {
                    tracker.warn(format!("Scoring failed for {}: {}", item.id, e));
                    unscored.push(UnscoredItem {
                        id: item.id.clone(),
                        title: item.title.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if scored.is_empty() && !candidates.is_empty() {
            let last = unscored
                .last()
                .map(|u| u.error.clone())
                .unwrap_or_default();
            return Err(Error::Task(format!(
                "Scoring failed for all {} candidates (last error: {})",
                candidates.len(),
                last
            )));
        }
        if penalized > 0 {
            tracker.info(format!(
                "Applied negative-interest penalty to {} paper(s)",
                penalized
            ));
        }
        Ok((scored, unscored))
    }

    /// Summarize every reported item at its tier's depth.
    async fn analyze_all(
        &self,
        tracker: &ProgressTracker,
        reported: &[ScoredItem],
    ) -> Result<Vec<std::result::Result<String, Error>>> {
        let profile = &self.profile;
        let analyst = &self.analyst;
        let items: Vec<&ScoredItem> = reported.iter().collect();
        let outcomes = self
            .pool
            .run_all(
                items,
                tracker.cancel_flag(),
                |done, total| tracker.item_progress(done, total),
                |scored| async move {
                    match scored.tier.depth() {
                        Some(depth) => analyst.summarize(profile, &scored.item, depth).await,
                        None => Err(Error::Internal(format!(
                            "Paper {} is not in a reported tier",
                            scored.item.id
                        ))),
                    }
                },
            )
            .await;
        tracker.check_cancelled()?;

        let summaries: Vec<_> = reported
            .iter()
            .zip(outcomes)
            .map(|(scored, outcome)| {
                if let Err(ref e) = outcome.result {
                    tracker.warn(format!("Analysis failed for {}: {}", scored.item.id, e));
                }
                outcome.result
            })
            .collect();

        if !summaries.is_empty() && summaries.iter().all(|s| s.is_err()) {
            return Err(Error::Task(format!(
                "Analysis failed for all {} reported papers",
                summaries.len()
            )));
        }
        Ok(summaries)
    }
}

#[async_trait]
impl super::TaskPipeline for RecommendPipeline {
    fn kind(&self) -> TaskKind {
        TaskKind::Recommend
    }

    fn stages(&self) -> StageWeights {
        StageWeights::recommend()
    }

    fn validate(&self) -> Result<()> {
        self.analyst.validate()?;
        self.config.validate()?;
        if self.profile.username.trim().is_empty() {
            return Err(Error::InvalidInput("Profile has no username".into()));
        }
        if self.profile.positive_interests.iter().all(|i| i.trim().is_empty()) {
            return Err(Error::InvalidInput(
                "Profile needs at least one research interest".into(),
            ));
        }
        if self.query().trim().is_empty() {
            return Err(Error::InvalidInput("No query or category to search".into()));
        }
        if self.limit() == 0 {
            return Err(Error::InvalidInput("max_entries must be at least 1".into()));
        }
        Ok(())
    }

    #[instrument(skip(self, tracker), fields(subsystem = "jobs", component = "recommend", op = "run", task_id = %tracker.task_id(), username = %self.profile.username))]
    async fn run(&self, tracker: &ProgressTracker) -> Result<JsonValue> {
        // Stage 1: fetch
        tracker.enter_stage(STAGE_FETCH)?;
        let query = self.query().to_string();
        let candidates = self
            .fetcher
            .fetch(&query, self.limit(), tracker.cancel_flag())
            .await?;
        if candidates.is_empty() {
            tracker.warn(format!("No candidates found for {}", query));
        } else {
            tracker.info(format!("Fetched {} candidate(s) for {}", candidates.len(), query));
        }
        tracker.check_cancelled()?;

        // Stage 2: score, filter, rank, tier
        tracker.enter_stage(STAGE_SCORE)?;
        let (scored, unscored) = self.score_all(tracker, &candidates).await?;
        let scored_count = scored.len();
        let ranking = stages::filter_rank_tier(scored, &self.config);
        tracker.info(format!(
            "Ranked {} paper(s): {} detailed, {} brief, {} excluded, {} below threshold",
            scored_count,
            ranking.count(Tier::Detailed),
            ranking.count(Tier::Brief),
            ranking.count(Tier::Excluded),
            ranking.discarded
        ));
        tracker.check_cancelled()?;

        // Stage 3: analyze
        tracker.enter_stage(STAGE_ANALYZE)?;
        let reported: Vec<ScoredItem> = ranking.reported().cloned().collect();
        let summaries = self.analyze_all(tracker, &reported).await?;
        let failed = summaries.iter().filter(|s| s.is_err()).count();
        let items = stages::assemble(reported, summaries);
        tracker.info(format!(
            "Summarized {} paper(s), {} failed",
            items.len() - failed,
            failed
        ));

        let report = RecommendationReport {
            username: self.profile.username.clone(),
            query,
            fetched: candidates.len(),
            scored: scored_count,
            discarded: ranking.discarded,
            unscored,
            items,
            generated_at: Utc::now(),
        };
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TaskPipeline;
    use scout_core::{CategoryInfo, PaperSource, RetryPolicy, SummaryDepth};
    use std::time::Duration;

    struct EmptySource;

    #[async_trait]
    impl PaperSource for EmptySource {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<CandidateItem>> {
            Ok(Vec::new())
        }
    }

    struct FlatAnalyst;

    #[async_trait]
    impl AnalysisClient for FlatAnalyst {
        async fn score(&self, _: &UserProfile, _: &CandidateItem) -> Result<f32> {
            Ok(50.0)
        }

        async fn summarize(&self, _: &UserProfile, _: &CandidateItem, _: SummaryDepth) -> Result<String> {
            Ok(String::new())
        }

        async fn match_category(&self, _: &str, _: &CategoryInfo) -> Result<f32> {
            Ok(0.0)
        }
    }

    fn pipeline(params: RecommendParams) -> RecommendPipeline {
        RecommendPipeline::new(
            RetryingFetcher::new(
                Arc::new(EmptySource),
                RetryPolicy::new(1, Duration::from_millis(1)),
            ),
            Arc::new(FlatAnalyst),
            WorkerPool::new(1),
            PipelineConfig::default().with_max_entries(20),
            UserProfile {
                username: "ada".to_string(),
                positive_interests: vec!["vision".to_string()],
                negative_interests: Vec::new(),
                category_id: "cs.CV".to_string(),
                updated_at: Utc::now(),
            },
            params,
        )
    }

    #[test]
    fn test_limit_defaults_to_configured_cap() {
        assert_eq!(pipeline(RecommendParams::default()).limit(), 20);
    }

    #[test]
    fn test_limit_never_exceeds_configured_cap() {
        let larger = pipeline(RecommendParams {
            max_entries: Some(500),
            ..Default::default()
        });
        assert_eq!(larger.limit(), 20);

        let smaller = pipeline(RecommendParams {
            max_entries: Some(5),
            ..Default::default()
        });
        assert_eq!(smaller.limit(), 5);
    }

    #[test]
    fn test_blank_query_falls_back_to_category() {
        let p = pipeline(RecommendParams {
            query: Some("  ".to_string()),
            ..Default::default()
        });
        assert_eq!(p.query(), "cs.CV");
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let p = pipeline(RecommendParams {
            max_entries: Some(0),
            ..Default::default()
        });
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));
    }
}
