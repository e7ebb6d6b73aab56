//! # scout-jobs
//!
//! Background tasks for paperscout.
//!
//! This crate provides:
//! - Paper fetching with fixed-delay retries
//! - A process-wide bounded worker pool for model calls
//! - Filtering, ranking, tiering and report assembly
//! - A TTL-bounded task registry with weighted stage progress
//! - The recommendation and category-matching pipelines
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use scout_jobs::{ScoutService, TaskRequest};
//! use scout_core::ScoutConfig;
//!
//! let config = ScoutConfig::from_env_file()?;
//! let service = ScoutService::from_config(&config, Arc::new(my_source)).await?;
//!
//! let task_id = service.submit(TaskRequest::Recommend {
//!     profile,
//!     params: Default::default(),
//! });
//!
//! // Poll until terminal
//! if let Some(progress) = service.progress(task_id) {
//!     println!("{} {}%", progress.step, progress.percentage);
//! }
//!
//! service.shutdown().await?;
//! ```

pub mod fetcher;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod service;
pub mod stages;

// Re-export core types
pub use scout_core::*;

pub use fetcher::RetryingFetcher;
pub use pipeline::{execute, MatchPipeline, RecommendParams, RecommendPipeline, TaskPipeline};
pub use pool::{ItemOutcome, WorkerPool};
pub use progress::{ProgressTracker, Stage, StageWeights};
pub use registry::{SweeperHandle, TaskRegistry};
pub use service::{ScoutService, ScoutServiceBuilder, TaskRequest};
pub use stages::Ranking;
