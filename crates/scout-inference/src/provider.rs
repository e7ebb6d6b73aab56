//! Backend construction from [`InferenceConfig`].
//!
//! The light (scoring) and heavy (summary) models share one provider and
//! endpoint; only the model name differs.

use std::sync::Arc;

use tracing::info;

use scout_core::{Error, GenerationBackend, InferenceConfig, LlmProvider, Result};

/// Build a generation backend for `model` on the configured provider.
pub fn build_backend(config: &InferenceConfig, model: &str) -> Result<Arc<dyn GenerationBackend>> {
    if model.trim().is_empty() {
        return Err(Error::Config("Model name must not be empty".into()));
    }

    match config.provider {
        #[cfg(feature = "ollama")]
        LlmProvider::Ollama => {
            let backend =
                crate::ollama::OllamaBackend::with_config(&config.base_url, model, config.timeout_secs)?;
            info!(provider = "ollama", model, "Built generation backend");
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "openai")]
        LlmProvider::OpenAI => {
            let backend = crate::openai::OpenAIBackend::new(crate::openai::OpenAIConfig {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
                model: model.to_string(),
                temperature: Some(0.0),
                timeout_secs: config.timeout_secs,
            })?;
            info!(provider = "openai", model, "Built generation backend");
            Ok(Arc::new(backend))
        }
        #[allow(unreachable_patterns)]
        other => Err(Error::Config(format!(
            "LLM provider {:?} is not compiled into this build",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ollama_backend() {
        let config = InferenceConfig::default();
        let backend = build_backend(&config, "qwen3:4b").unwrap();
        assert_eq!(backend.model_name(), "qwen3:4b");
        assert!(backend.validate().is_ok());
    }

    #[test]
    fn test_build_openai_backend_without_key_fails_validation() {
        let config = InferenceConfig {
            provider: LlmProvider::OpenAI,
            base_url: "https://api.openai.com/v1".to_string(),
            ..Default::default()
        };
        let backend = build_backend(&config, "gpt-4o-mini").unwrap();
        assert_eq!(backend.model_name(), "gpt-4o-mini");
        assert!(backend.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_empty_model_rejected() {
        let err = build_backend(&InferenceConfig::default(), "  ")
            .err()
            .unwrap();
        assert!(err.is_config());
    }
}
