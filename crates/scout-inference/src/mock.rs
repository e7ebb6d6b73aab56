//! Mock generation backend for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scout_inference::mock::MockGenerationBackend;
//!
//! let light = MockGenerationBackend::new("light")
//!     .with_fixed_response("SCORE: 40")
//!     .with_response_containing("Graph Transformers", "SCORE: 95")
//!     .with_latency_ms(20);
//! ```
//!
//! Clones share the call log and scripted failures, so a test can hand one
//! clone to the code under test and assert on the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;

use scout_core::{Error, GenerationBackend, Result};

/// Mock generation backend for testing.
#[derive(Clone)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    model: String,
    default_response: String,
    /// `(needle, reply)`: first needle found in the prompt wins.
    mapped_responses: Vec<(String, String)>,
    /// `(needle, error)`: prompts containing the needle always fail.
    mapped_failures: Vec<(String, Error)>,
    latency_ms: u64,
    max_random_latency_ms: u64,
    failure_rate: f64,
    invalid_config: Option<String>,
}

#[derive(Default)]
struct MockState {
    call_log: Mutex<Vec<MockCall>>,
    scripted_failures: Mutex<VecDeque<Error>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// One recorded generation request.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub prompt: String,
    pub timestamp: Instant,
}

impl MockGenerationBackend {
    /// Create a mock that answers "Mock response" to everything.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            config: Arc::new(MockConfig {
                model: model.into(),
                default_response: "Mock response".to_string(),
                mapped_responses: Vec::new(),
                mapped_failures: Vec::new(),
                latency_ms: 0,
                max_random_latency_ms: 0,
                failure_rate: 0.0,
                invalid_config: None,
            }),
            state: Arc::new(MockState::default()),
        }
    }

    /// Reply used when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Reply with `response` whenever the prompt contains `needle`.
    pub fn with_response_containing(
        mut self,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mapped_responses
            .push((needle.into(), response.into()));
        self
    }

    /// Fail with `error` whenever the prompt contains `needle`.
    pub fn with_failure_containing(mut self, needle: impl Into<String>, error: Error) -> Self {
        Arc::make_mut(&mut self.config)
            .mapped_failures
            .push((needle.into(), error));
        self
    }

    /// Fail the next calls, in order, with these errors.
    pub fn with_failures(self, errors: Vec<Error>) -> Self {
        self.lock_failures().extend(errors);
        self
    }

    /// Fixed simulated latency for every call.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Additional random latency in `0..=max_ms` per call.
    pub fn with_random_latency_ms(mut self, max_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).max_random_latency_ms = max_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Make [`GenerationBackend::validate`] fail with a configuration error.
    pub fn with_invalid_config(mut self, reason: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).invalid_config = Some(reason.into());
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.lock_calls().clear()
    }

    /// Get number of generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Number of calls whose prompt contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.lock_calls()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.state
            .call_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_failures(&self) -> MutexGuard<'_, VecDeque<Error>> {
        self.state
            .scripted_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn log_call(&self, system: &str, prompt: &str) {
        self.lock_calls().push(MockCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            timestamp: Instant::now(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        let mut latency_ms = self.config.latency_ms;
        if self.config.max_random_latency_ms > 0 {
            use rand::Rng;
            latency_ms += rand::thread_rng().gen_range(0..=self.config.max_random_latency_ms);
        }
        if latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency_ms)).await;
        }
    }

    fn respond(&self, prompt: &str) -> Result<String> {
        if let Some(error) = self.lock_failures().pop_front() {
            return Err(error);
        }
        if let Some((_, error)) = self
            .config
            .mapped_failures
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Err(error.clone());
        }
        if self.should_fail() {
            return Err(Error::Transient("Simulated failure".into()));
        }
        Ok(self
            .config
            .mapped_responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.config.default_response.clone()))
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.log_call(system, prompt);

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.state.in_flight);
        self.state.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        self.simulate_latency().await;
        self.respond(prompt)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn validate(&self) -> Result<()> {
        match self.config.invalid_config {
            Some(ref reason) => Err(Error::Config(reason.clone())),
            None => Ok(()),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
