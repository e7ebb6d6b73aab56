//! Runtime configuration loaded from environment variables.
//!
//! Every section can be built from the process environment (`from_env`), from
//! an arbitrary key lookup (`from_lookup`, used by tests), or programmatically
//! with `Default` plus the `with_*` builders.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MAX_WORKERS` | `4` | Process-wide concurrent model calls |
//! | `MAX_ENTRIES` | `100` | Candidates fetched per task |
//! | `NUM_DETAILED_PAPERS` | `5` | Detailed tier size |
//! | `NUM_BRIEF_PAPERS` | `10` | Brief tier size |
//! | `RELEVANCE_FILTER_THRESHOLD` | `6.0` | Minimum score (0–10) |
//! | `ARXIV_RETRIES` | `3` | Fetch attempts |
//! | `ARXIV_DELAY` | `3.0` | Seconds between fetch attempts |
//! | `NEGATIVE_INTEREST_PENALTY` | `30` | Points subtracted for negative interests |
//! | `NUM_CATEGORY_MATCHES` | `5` | Matches reported per match task |
//! | `LLM_PROVIDER` | `ollama` | `ollama` or `openai` |
//! | `LIGHT_MODEL` / `HEAVY_MODEL` | provider default | Scoring / summary models |
//! | `OLLAMA_BASE` / `OPENAI_BASE_URL` | provider default | Endpoint |
//! | `OPENAI_API_KEY` | (none) | Required for the OpenAI cloud endpoint |
//! | `MODEL_TIMEOUT_SECS` | `120` | Per-call timeout |
//! | `MODEL_RETRIES` | `3` | Attempts per model call |
//! | `MODEL_RETRY_DELAY_MS` | `2000` | Delay between model attempts |
//! | `TASK_RETENTION_SECS` | `3600` | Terminal task retention |
//! | `MAX_TRACKED_TASKS` | `1000` | Registry size bound |
//! | `TASK_SWEEP_INTERVAL_SECS` | `60` | Eviction sweep period |
//! | `CATEGORY_STORE_PATH` | `data/category_matches.json` | Record file |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::defaults;
use crate::{Error, Result};

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparseable configuration value");
                default
            }
        },
        None => default,
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Knobs for fetching, scoring, tiering and matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_workers: usize,
    pub max_entries: usize,
    pub num_detailed_papers: usize,
    pub num_brief_papers: usize,
    /// Minimum relevance on the 0–10 scale.
    pub relevance_filter_threshold: f32,
    pub arxiv_retries: u32,
    pub arxiv_delay: Duration,
    /// Points on the 0–100 scale.
    pub negative_interest_penalty: f32,
    pub num_category_matches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            max_entries: defaults::MAX_ENTRIES,
            num_detailed_papers: defaults::NUM_DETAILED_PAPERS,
            num_brief_papers: defaults::NUM_BRIEF_PAPERS,
            relevance_filter_threshold: defaults::RELEVANCE_FILTER_THRESHOLD,
            arxiv_retries: defaults::ARXIV_RETRIES,
            arxiv_delay: Duration::from_secs_f64(defaults::ARXIV_DELAY_SECS),
            negative_interest_penalty: defaults::NEGATIVE_INTEREST_PENALTY,
            num_category_matches: defaults::NUM_CATEGORY_MATCHES,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let delay_secs = parsed(&lookup, "ARXIV_DELAY", defaults::ARXIV_DELAY_SECS).max(0.0);
        let arxiv_delay = Duration::try_from_secs_f64(delay_secs).unwrap_or_else(|_| {
            warn!(
                key = "ARXIV_DELAY",
                value = delay_secs,
                "Ignoring out-of-range configuration value"
            );
            Duration::from_secs_f64(defaults::ARXIV_DELAY_SECS)
        });
        Self {
            max_workers: parsed(&lookup, "MAX_WORKERS", defaults::MAX_WORKERS).max(1),
            max_entries: parsed(&lookup, "MAX_ENTRIES", defaults::MAX_ENTRIES),
            num_detailed_papers: parsed(
                &lookup,
                "NUM_DETAILED_PAPERS",
                defaults::NUM_DETAILED_PAPERS,
            ),
            num_brief_papers: parsed(&lookup, "NUM_BRIEF_PAPERS", defaults::NUM_BRIEF_PAPERS),
            relevance_filter_threshold: parsed(
                &lookup,
                "RELEVANCE_FILTER_THRESHOLD",
                defaults::RELEVANCE_FILTER_THRESHOLD,
            ),
            arxiv_retries: parsed(&lookup, "ARXIV_RETRIES", defaults::ARXIV_RETRIES).max(1),
            arxiv_delay,
            negative_interest_penalty: parsed(
                &lookup,
                "NEGATIVE_INTEREST_PENALTY",
                defaults::NEGATIVE_INTEREST_PENALTY,
            ),
            num_category_matches: parsed(
                &lookup,
                "NUM_CATEGORY_MATCHES",
                defaults::NUM_CATEGORY_MATCHES,
            ),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_tiers(mut self, detailed: usize, brief: usize) -> Self {
        self.num_detailed_papers = detailed;
        self.num_brief_papers = brief;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.relevance_filter_threshold = threshold;
        self
    }

    pub fn with_fetch_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.arxiv_retries = retries;
        self.arxiv_delay = delay;
        self
    }

    pub fn with_negative_penalty(mut self, penalty: f32) -> Self {
        self.negative_interest_penalty = penalty;
        self
    }

    pub fn with_category_matches(mut self, count: usize) -> Self {
        self.num_category_matches = count;
        self
    }

    /// Attempt policy for the paper source.
    pub fn fetch_retry_policy(&self) -> crate::RetryPolicy {
        crate::RetryPolicy::new(self.arxiv_retries, self.arxiv_delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("MAX_WORKERS must be at least 1".into()));
        }
        if self.arxiv_retries == 0 {
            return Err(Error::Config("ARXIV_RETRIES must be at least 1".into()));
        }
        if !(0.0..=10.0).contains(&self.relevance_filter_threshold) {
            return Err(Error::Config(format!(
                "RELEVANCE_FILTER_THRESHOLD must be within 0-10, got {}",
                self.relevance_filter_threshold
            )));
        }
        if !self.negative_interest_penalty.is_finite() || self.negative_interest_penalty < 0.0 {
            return Err(Error::Config(format!(
                "NEGATIVE_INTEREST_PENALTY must be a non-negative number, got {}",
                self.negative_interest_penalty
            )));
        }
        Ok(())
    }
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Which model server family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" | "openai-compatible" => Ok(LlmProvider::OpenAI),
            other => Err(Error::Config(format!("Unknown LLM_PROVIDER: {}", other))),
        }
    }
}

/// Backend selection and call policy for the light and heavy models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub light_model: String,
    pub heavy_model: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: defaults::OLLAMA_URL.to_string(),
            api_key: None,
            light_model: defaults::LIGHT_MODEL.to_string(),
            heavy_model: defaults::HEAVY_MODEL.to_string(),
            timeout_secs: defaults::MODEL_TIMEOUT_SECS,
            retries: defaults::MODEL_RETRIES,
            retry_delay_ms: defaults::MODEL_RETRY_DELAY_MS,
        }
    }
}

impl InferenceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = match non_empty(&lookup, "LLM_PROVIDER") {
            Some(raw) => raw.parse::<LlmProvider>()?,
            None => LlmProvider::Ollama,
        };

        let (base_url, light_default, heavy_default) = match provider {
            LlmProvider::Ollama => (
                non_empty(&lookup, "OLLAMA_BASE").unwrap_or_else(|| defaults::OLLAMA_URL.into()),
                defaults::LIGHT_MODEL,
                defaults::HEAVY_MODEL,
            ),
            LlmProvider::OpenAI => (
                non_empty(&lookup, "OPENAI_BASE_URL")
                    .unwrap_or_else(|| defaults::OPENAI_URL.into()),
                defaults::OPENAI_LIGHT_MODEL,
                defaults::OPENAI_HEAVY_MODEL,
            ),
        };

        let config = Self {
            provider,
            base_url,
            api_key: non_empty(&lookup, "OPENAI_API_KEY"),
            light_model: non_empty(&lookup, "LIGHT_MODEL")
                .unwrap_or_else(|| light_default.to_string()),
            heavy_model: non_empty(&lookup, "HEAVY_MODEL")
                .unwrap_or_else(|| heavy_default.to_string()),
            timeout_secs: parsed(&lookup, "MODEL_TIMEOUT_SECS", defaults::MODEL_TIMEOUT_SECS)
                .max(1),
            retries: parsed(&lookup, "MODEL_RETRIES", defaults::MODEL_RETRIES).max(1),
            retry_delay_ms: parsed(
                &lookup,
                "MODEL_RETRY_DELAY_MS",
                defaults::MODEL_RETRY_DELAY_MS,
            ),
        };

        debug!(
            provider = ?config.provider,
            light = %config.light_model,
            heavy = %config.heavy_model,
            "Loaded inference configuration"
        );
        Ok(config)
    }

    pub fn with_models(mut self, light: impl Into<String>, heavy: impl Into<String>) -> Self {
        self.light_model = light.into();
        self.heavy_model = heavy.into();
        self
    }

    pub fn with_retry_policy(mut self, retries: u32, retry_delay_ms: u64) -> Self {
        self.retries = retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Attempt policy for a single model call.
    pub fn retry_policy(&self) -> crate::RetryPolicy {
        crate::RetryPolicy::new(self.retries, self.retry_delay())
    }
}

// =============================================================================
// TASKS
// =============================================================================

/// Retention and bounds for the task registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub retention_secs: u64,
    pub max_tracked_tasks: usize,
    pub sweep_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            retention_secs: defaults::TASK_RETENTION_SECS,
            max_tracked_tasks: defaults::MAX_TRACKED_TASKS,
            sweep_interval_secs: defaults::TASK_SWEEP_INTERVAL_SECS,
        }
    }
}

impl TaskConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            retention_secs: parsed(&lookup, "TASK_RETENTION_SECS", defaults::TASK_RETENTION_SECS),
            max_tracked_tasks: parsed(&lookup, "MAX_TRACKED_TASKS", defaults::MAX_TRACKED_TASKS)
                .max(1),
            sweep_interval_secs: parsed(
                &lookup,
                "TASK_SWEEP_INTERVAL_SECS",
                defaults::TASK_SWEEP_INTERVAL_SECS,
            )
            .max(1),
        }
    }

    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    pub fn with_max_tracked(mut self, max: usize) -> Self {
        self.max_tracked_tasks = max;
        self
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// =============================================================================
// AGGREGATE
// =============================================================================

/// Everything needed to assemble a running service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    pub pipeline: PipelineConfig,
    pub inference: InferenceConfig,
    pub tasks: TaskConfig,
    /// `None` keeps category records in memory only.
    pub category_store_path: Option<PathBuf>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            inference: InferenceConfig::default(),
            tasks: TaskConfig::default(),
            category_store_path: Some(PathBuf::from(defaults::CATEGORY_STORE_PATH)),
        }
    }
}

impl ScoutConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a `.env` file (if present) into the environment, then read it.
    pub fn from_env_file() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => return Err(Error::Config(format!("Failed to read .env: {}", e))),
        }
        Self::from_env()
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            pipeline: PipelineConfig::from_lookup(&lookup),
            inference: InferenceConfig::from_lookup(&lookup)?,
            tasks: TaskConfig::from_lookup(&lookup),
            category_store_path: Some(
                non_empty(&lookup, "CATEGORY_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(defaults::CATEGORY_STORE_PATH)),
            ),
        };
        config.pipeline.validate()?;
        Ok(config)
    }
}
