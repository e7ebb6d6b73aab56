//! Paper source access with bounded, fixed-delay retries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use scout_core::{CandidateItem, Error, PaperSource, PipelineConfig, Result, RetryPolicy};

/// Wraps a [`PaperSource`], retrying transient failures.
#[derive(Clone)]
pub struct RetryingFetcher {
    source: Arc<dyn PaperSource>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(source: Arc<dyn PaperSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Build with `ARXIV_RETRIES` attempts and `ARXIV_DELAY` between them.
    pub fn from_config(source: Arc<dyn PaperSource>, config: &PipelineConfig) -> Self {
        Self::new(source, config.fetch_retry_policy())
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch at most `limit` distinct candidates for `query`.
    ///
    /// Duplicate ids keep their first occurrence and `raw_rank` is the
    /// position in the returned list. Any failure is reported as
    /// [`Error::Fetch`]; a raised `cancel` flag stops further attempts with
    /// [`Error::Cancelled`].
    #[instrument(skip(self, cancel), fields(subsystem = "jobs", component = "fetcher", op = "fetch"))]
    pub async fn fetch(
        &self,
        query: &str,
        limit: usize,
        cancel: &AtomicBool,
    ) -> Result<Vec<CandidateItem>> {
        let mut attempts_made = 0;
        let result = self
            .policy
            .run_unless(
                "fetch",
                || cancel.load(Ordering::SeqCst),
                |attempt| {
                    attempts_made = attempt;
                    self.source.search(query, limit)
                },
            )
            .await;

        let raw = match result {
            Ok(items) => items,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) if e.is_transient() => {
                warn!(attempts = attempts_made, error = %e, "Paper source retries exhausted");
                return Err(Error::Fetch(format!(
                    "fetch stage failed after {} attempt(s): {}",
                    attempts_made, e
                )));
            }
            Err(e) => {
                warn!(error = %e, "Paper source failed permanently");
                return Err(Error::Fetch(format!("fetch stage failed: {}", e)));
            }
        };

        let received = raw.len();
        let items = normalize(raw, limit);
        info!(
            received,
            item_count = items.len(),
            attempts = attempts_made,
            "Fetched candidates"
        );
        Ok(items)
    }
}

/// Drop repeated ids, cap at `limit` and renumber `raw_rank`.
fn normalize(raw: Vec<CandidateItem>, limit: usize) -> Vec<CandidateItem> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .take(limit)
        .enumerate()
        .map(|(rank, mut item)| {
            item.raw_rank = rank;
            item
        })
        .collect()
}
