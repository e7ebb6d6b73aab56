//! # scout-core
//!
//! Core types, traits, and configuration for paperscout.
//!
//! This crate provides the data model shared by the recommendation and
//! category-matching pipelines, the error taxonomy, the traits at the seams
//! (paper source, generation backend, analysis client), and the env-driven
//! configuration the other crates consume.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::{InferenceConfig, LlmProvider, PipelineConfig, ScoutConfig, TaskConfig};
pub use error::{Error, Result};
pub use models::*;
pub use retry::RetryPolicy;
pub use traits::*;
