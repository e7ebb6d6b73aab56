//! Ollama inference backend implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use scout_core::{defaults, Error, GenerationBackend, Result};

/// One model served by an Ollama instance.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaBackend {
    /// `model` on the default local endpoint.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_config(defaults::OLLAMA_URL, model, defaults::MODEL_TIMEOUT_SECS)
    }

    pub fn with_config(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %base_url,
            model = %model,
            "Ollama backend ready"
        );
        Ok(Self {
            client,
            base_url,
            model,
            timeout_secs,
        })
    }

    /// Endpoint this backend talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map a non-success HTTP status to the error taxonomy.
    fn status_error(status: StatusCode, body: &str) -> Error {
        let message = format!("Ollama returned {}: {}", status, body);
        match status.as_u16() {
            401 | 403 => Error::Unauthorized(message),
            404 => Error::Config(message),
            408 | 429 | 500..=599 => Error::Transient(message),
            _ => Error::Inference(message),
        }
    }

    /// Uses `/api/chat`, which keeps reasoning output of thinking models out
    /// of the returned content.
    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, &body));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > defaults::SLOW_GENERATION_MS {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt).await
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5));
        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Ollama health check error");
                Ok(false)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("Ollama model name is empty".into()));
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
