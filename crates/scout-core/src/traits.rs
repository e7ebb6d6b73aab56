//! Core traits for paperscout abstractions.
//!
//! These traits define the seams between the pipelines and their external
//! collaborators (paper source, language model backends).

use async_trait::async_trait;

use crate::{CandidateItem, CategoryInfo, Result, SummaryDepth, UserProfile};

// =============================================================================
// PAPER SOURCE
// =============================================================================

/// Client for the upstream paper listing service.
///
/// Implementations report temporary failures (network blips, rate limiting)
/// as [`crate::Error::Transient`] or [`crate::Error::Timeout`]; anything else
/// is treated as fatal by the fetcher.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Search for papers matching `query`, returning at most `max_results`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<CandidateItem>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;

    /// Reject obviously unusable settings (missing credentials) without a network call.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Scoring and summarization capability used by both pipelines.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Relevance of `item` to `profile` on a 0–100 scale.
    async fn score(&self, profile: &UserProfile, item: &CandidateItem) -> Result<f32>;

    /// Summary of `item` written for `profile` at the requested depth.
    async fn summarize(
        &self,
        profile: &UserProfile,
        item: &CandidateItem,
        depth: SummaryDepth,
    ) -> Result<String>;

    /// Fit of a research description to a category on a 0–100 scale.
    async fn match_category(&self, user_input: &str, category: &CategoryInfo) -> Result<f32>;

    /// Fail fast on configuration problems before any call is made.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
