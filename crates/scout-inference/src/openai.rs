//! OpenAI-compatible chat completions backend.
//!
//! Talks to the hosted OpenAI API or any server exposing
//! `/chat/completions` (vLLM, LM Studio, Ollama's `/v1` shim).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use scout_core::{defaults, Error, GenerationBackend, Result};

/// Connection and sampling settings for one model.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    /// Sent as a bearer token when present. Local servers usually need none.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_URL.to_string(),
            api_key: None,
            model: defaults::OPENAI_LIGHT_MODEL.to_string(),
            temperature: None,
            timeout_secs: defaults::MODEL_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// The hosted API rejects keyless requests; self-hosted servers don't.
    pub fn is_hosted(&self) -> bool {
        self.base_url.contains("api.openai.com")
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), route)
    }
}

pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.model,
            "OpenAI-compatible backend ready"
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// Map a failed completion call onto the error taxonomy. Rate limits and
/// server faults are transient; a missing model is a configuration problem.
fn classify(status: StatusCode, detail: &ApiErrorDetail) -> Error {
    let message = format!("OpenAI returned {}: {}", status, detail.message);
    match status.as_u16() {
        401 | 403 => Error::Unauthorized(message),
        404 => Error::Config(message),
        _ if detail.kind == "model_not_found" => Error::Config(message),
        408 | 429 | 500..=599 => Error::Transient(message),
        _ => Error::Inference(message),
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "openai", op = "generate", model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream: false,
        };
        let response = self
            .authorized(self.client.post(self.config.endpoint("/chat/completions")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| ApiErrorDetail {
                    message: "no error body".to_string(),
                    kind: String::new(),
                });
            return Err(classify(status, &detail));
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Unreadable completion: {}", e)))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Inference("Completion had no choices".into()))?;

        debug!(
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .authorized(self.client.get(self.config.endpoint("/models")))
            .timeout(Duration::from_secs(5));
        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(status = %resp.status(), "OpenAI health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "OpenAI health check error");
                Ok(false)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.config.model.trim().is_empty() {
            return Err(Error::Config("Model name is empty".into()));
        }
        if self.config.is_hosted() && self.config.api_key.is_none() {
            return Err(Error::Config(
                "OPENAI_API_KEY is required for the hosted OpenAI endpoint".into(),
            ));
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}
