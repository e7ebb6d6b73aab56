//! Centralized default constants for paperscout.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration loaders fall back to these when an environment variable is
//! missing or unparseable.

// =============================================================================
// PAPER SOURCE
// =============================================================================

/// Maximum number of candidates requested from the paper source per task.
pub const MAX_ENTRIES: usize = 100;

/// Attempts made against the paper source before the fetch stage gives up.
pub const ARXIV_RETRIES: u32 = 3;

/// Fixed delay between paper source attempts, in seconds.
pub const ARXIV_DELAY_SECS: f64 = 3.0;

// =============================================================================
// SCORING & TIERING
// =============================================================================

/// Process-wide cap on concurrent outbound model calls.
pub const MAX_WORKERS: usize = 4;

/// Papers summarized at full depth.
pub const NUM_DETAILED_PAPERS: usize = 5;

/// Papers summarized briefly after the detailed tier.
pub const NUM_BRIEF_PAPERS: usize = 10;

/// Minimum relevance on the 0–10 scale; lower-scoring papers are dropped.
pub const RELEVANCE_FILTER_THRESHOLD: f32 = 6.0;

/// Points (0–100 scale) subtracted when a negative interest is mentioned.
pub const NEGATIVE_INTEREST_PENALTY: f32 = 30.0;

/// Category matches reported by the matching pipeline.
pub const NUM_CATEGORY_MATCHES: usize = 5;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default OpenAI-compatible base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default light model (scoring and category matching) for Ollama.
pub const LIGHT_MODEL: &str = "qwen3:4b";

/// Default heavy model (summaries) for Ollama.
pub const HEAVY_MODEL: &str = "gpt-oss:20b";

/// Default light model for OpenAI-compatible endpoints.
pub const OPENAI_LIGHT_MODEL: &str = "gpt-4o-mini";

/// Default heavy model for OpenAI-compatible endpoints.
pub const OPENAI_HEAVY_MODEL: &str = "gpt-4o";

/// Per-call timeout for model requests in seconds.
pub const MODEL_TIMEOUT_SECS: u64 = 120;

/// Attempts per model call (a timeout counts as one attempt).
pub const MODEL_RETRIES: u32 = 3;

/// Fixed delay between model call attempts in milliseconds.
pub const MODEL_RETRY_DELAY_MS: u64 = 2_000;

/// Responses slower than this are logged as slow.
pub const SLOW_GENERATION_MS: u64 = 30_000;

// =============================================================================
// TASKS
// =============================================================================

/// How long terminal tasks stay pollable, in seconds.
pub const TASK_RETENTION_SECS: u64 = 3_600;

/// Upper bound on tasks kept in the registry.
pub const MAX_TRACKED_TASKS: usize = 1_000;

/// Interval of the background eviction sweep, in seconds.
pub const TASK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Stage weights for the recommendation pipeline (fetch, score, analyze).
pub const RECOMMEND_STAGE_WEIGHTS: [u32; 3] = [10, 30, 60];

/// Stage weights for the matching pipeline (prepare, score, record).
pub const MATCH_STAGE_WEIGHTS: [u32; 3] = [10, 80, 10];

/// Placeholder summary for items whose analysis failed.
pub const ANALYSIS_FAILED_PLACEHOLDER: &str = "Summary unavailable: analysis failed";

// =============================================================================
// STORAGE
// =============================================================================

/// Default path of the category match record file.
pub const CATEGORY_STORE_PATH: &str = "data/category_matches.json";
