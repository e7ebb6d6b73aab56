//! # scout-inference
//!
//! Language model access for paperscout.
//!
//! This crate provides:
//! - Ollama backend (default, feature `ollama`)
//! - OpenAI-compatible backend (feature `openai`)
//! - Prompt builders and score extraction
//! - [`ModelAnalyst`], the dual-model [`scout_core::AnalysisClient`] with
//!   per-call timeouts and transient-failure retries
//! - A mock backend for tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use scout_core::{AnalysisClient, InferenceConfig};
//! use scout_inference::ModelAnalyst;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = InferenceConfig::from_env().unwrap();
//!     let analyst = ModelAnalyst::from_config(&config).unwrap();
//!     analyst.validate().unwrap();
//! }
//! ```

pub mod analyst;
pub mod prompts;
pub mod provider;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use analyst::ModelAnalyst;
pub use prompts::parse_score;
pub use provider::build_backend;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};
