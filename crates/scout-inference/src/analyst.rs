//! Dual-model analysis client.
//!
//! Relevance scoring and category matching go to the light model; summaries
//! go to the heavy model. Every call is bounded by a timeout and retried on
//! transient failures according to the configured [`RetryPolicy`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use scout_core::{
    defaults, AnalysisClient, CandidateItem, CategoryInfo, Error, GenerationBackend,
    InferenceConfig, Result, RetryPolicy, SummaryDepth, UserProfile,
};

use crate::prompts::{self, MATCHING_SYSTEM, SCORING_SYSTEM, SUMMARY_SYSTEM};
use crate::provider::build_backend;

/// [`AnalysisClient`] backed by a light and a heavy generation model.
#[derive(Clone)]
pub struct ModelAnalyst {
    light: Arc<dyn GenerationBackend>,
    heavy: Arc<dyn GenerationBackend>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ModelAnalyst {
    pub fn new(light: Arc<dyn GenerationBackend>, heavy: Arc<dyn GenerationBackend>) -> Self {
        Self {
            light,
            heavy,
            timeout: Duration::from_secs(defaults::MODEL_TIMEOUT_SECS),
            policy: RetryPolicy::default(),
        }
    }

    /// Build both backends from configuration.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let light = build_backend(config, &config.light_model)?;
        let heavy = build_backend(config, &config.heavy_model)?;
        Ok(Self::new(light, heavy)
            .with_timeout(config.timeout())
            .with_retry_policy(config.retry_policy()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn light_model(&self) -> &str {
        self.light.model_name()
    }

    pub fn heavy_model(&self) -> &str {
        self.heavy.model_name()
    }

    async fn call(
        &self,
        backend: &Arc<dyn GenerationBackend>,
        label: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String> {
        let timeout = self.timeout;
        self.policy
            .run(label, |attempt| async move {
                let start = Instant::now();
                let reply = tokio::time::timeout(timeout, backend.generate_with_system(system, prompt))
                    .await
                    .map_err(|_| {
                        Error::Timeout(format!(
                            "{} on {} exceeded {}s",
                            label,
                            backend.model_name(),
                            timeout.as_secs()
                        ))
                    })??;
                debug!(
                    op = label,
                    model = backend.model_name(),
                    attempt,
                    duration_ms = start.elapsed().as_millis() as u64,
                    response_len = reply.len(),
                    "Model call complete"
                );
                Ok(reply)
            })
            .await
    }
}

#[async_trait]
impl AnalysisClient for ModelAnalyst {
    #[instrument(skip(self, profile, item), fields(subsystem = "inference", component = "analyst", op = "score", paper_id = %item.id))]
    async fn score(&self, profile: &UserProfile, item: &CandidateItem) -> Result<f32> {
        let prompt = prompts::scoring_prompt(profile, item);
        let reply = self.call(&self.light, "score", SCORING_SYSTEM, &prompt).await?;
        prompts::parse_score(&reply).map_err(|e| {
            warn!(paper_id = %item.id, error = %e, "Unusable scoring reply");
            e
        })
    }

    #[instrument(skip(self, profile, item), fields(subsystem = "inference", component = "analyst", op = "summarize", paper_id = %item.id, depth = ?depth))]
    async fn summarize(
        &self,
        profile: &UserProfile,
        item: &CandidateItem,
        depth: SummaryDepth,
    ) -> Result<String> {
        let prompt = prompts::summary_prompt(profile, item, depth);
        let reply = self
            .call(&self.heavy, "summarize", SUMMARY_SYSTEM, &prompt)
            .await?;
        let summary = prompts::strip_thinking(&reply).trim().to_string();
        if summary.is_empty() {
            return Err(Error::Inference(format!(
                "Empty summary for paper {}",
                item.id
            )));
        }
        Ok(summary)
    }

    #[instrument(skip(self, user_input, category), fields(subsystem = "inference", component = "analyst", op = "match_category", category = %category.id))]
    async fn match_category(&self, user_input: &str, category: &CategoryInfo) -> Result<f32> {
        let prompt = prompts::matching_prompt(user_input, category);
        let reply = self
            .call(&self.light, "match_category", MATCHING_SYSTEM, &prompt)
            .await?;
        prompts::parse_score(&reply)
    }

    fn validate(&self) -> Result<()> {
        self.light.validate()?;
        self.heavy.validate()
    }
}
