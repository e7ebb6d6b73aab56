//! End-to-end tests for `ScoutService` with a scripted paper source and
//! mock model backends.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use scout_core::{
    defaults, CandidateItem, CategoryFilter, CategoryInfo, CategoryRecordPatch, Error, MatchReport,
    PaperSource, PipelineConfig, RecommendationReport, Result, RetryPolicy, TaskProgress,
    TaskStatus, UserProfile,
};
use scout_inference::mock::MockGenerationBackend;
use scout_inference::ModelAnalyst;
use scout_jobs::{RecommendParams, ScoutService, ScoutServiceBuilder, TaskRequest};
use scout_store::CategoryStore;

const TITLES: [&str; 10] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliet",
];
const SCORES: [u32; 10] = [90, 80, 70, 60, 50, 90, 40, 80, 30, 70];

/// Paper source returning a fixed list, optionally failing first or
/// blocking until released.
struct ScriptedSource {
    papers: Vec<CandidateItem>,
    failures: Mutex<VecDeque<Error>>,
    calls: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedSource {
    fn new(papers: Vec<CandidateItem>) -> Self {
        Self {
            papers,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn failing(self, errors: Vec<Error>) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    /// Signal `entered` on each call, then wait for `release`.
    fn gated(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperSource for ScriptedSource {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<CandidateItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(e) = self.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(self.papers.iter().take(max_results).cloned().collect())
    }
}

fn papers() -> Vec<CandidateItem> {
    TITLES
        .iter()
        .enumerate()
        .map(|(i, title)| CandidateItem {
            id: format!("2601.{:05}", i),
            title: title.to_string(),
            abstract_text: format!("An abstract about {}.", title.to_lowercase()),
            authors: vec!["A. Researcher".to_string()],
            source_categories: vec!["cs.LG".to_string()],
            raw_rank: i,
        })
        .collect()
}

fn profile() -> UserProfile {
    UserProfile {
        username: "ada".to_string(),
        positive_interests: vec!["representation learning".to_string()],
        negative_interests: vec![],
        category_id: "cs.LG".to_string(),
        updated_at: Utc::now(),
    }
}

fn needle(title: &str) -> String {
    format!("Paper title: {}\n", title)
}

/// Light model scoring each title from `SCORES`.
fn scoring_backend() -> MockGenerationBackend {
    TITLES.iter().zip(SCORES).fold(
        MockGenerationBackend::new("light").with_fixed_response("SCORE: 0"),
        |backend, (title, score)| {
            backend.with_response_containing(needle(title), format!("SCORE: {}\nREASON: ok", score))
        },
    )
}

fn summary_backend() -> MockGenerationBackend {
    MockGenerationBackend::new("heavy").with_fixed_response("A concise summary.")
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_max_workers(2)
        .with_tiers(2, 3)
        .with_threshold(6.0)
        .with_fetch_retries(3, Duration::from_millis(5))
}

fn service(
    source: Arc<ScriptedSource>,
    light: &MockGenerationBackend,
    heavy: &MockGenerationBackend,
    store: CategoryStore,
) -> ScoutService {
    let analyst = ModelAnalyst::new(Arc::new(light.clone()), Arc::new(heavy.clone()))
        .with_retry_policy(RetryPolicy::new(1, Duration::ZERO));
    ScoutServiceBuilder::new(source, Arc::new(analyst))
        .with_pipeline_config(pipeline_config())
        .with_store(store)
        .build()
}

fn recommend() -> TaskRequest {
    TaskRequest::Recommend {
        profile: profile(),
        params: RecommendParams::default(),
    }
}

/// Poll until the task is terminal, recording every percentage seen.
async fn wait_for(service: &ScoutService, id: Uuid) -> (TaskProgress, Vec<(TaskStatus, u8)>) {
    let mut seen = Vec::new();
    let poll = async {
        loop {
            let progress = service.progress(id).expect("task should be tracked");
            seen.push((progress.status, progress.percentage));
            if progress.status.is_terminal() {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    let progress = tokio::time::timeout(Duration::from_secs(10), poll)
        .await
        .expect("task did not finish in time");
    (progress, seen)
}

#[tokio::test]
async fn test_recommend_end_to_end() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend();
    let heavy = summary_backend();
    let service = service(source.clone(), &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;

    assert_eq!(progress.status, TaskStatus::Completed, "{:?}", progress.error);
    assert_eq!(progress.percentage, 100);
    let report: RecommendationReport = serde_json::from_value(progress.result.unwrap()).unwrap();

    let order: Vec<&str> = report.items.iter().map(|i| i.scored.item.title.as_str()).collect();
    assert_eq!(order, vec!["Alpha", "Foxtrot", "Bravo", "Hotel", "Charlie"]);
    assert_eq!(report.fetched, 10);
    assert_eq!(report.scored, 10);
    assert_eq!(report.discarded, 3);
    assert!(report.unscored.is_empty());
    assert!(report.items.iter().all(|i| !i.analysis_failed));

    assert_eq!(light.generate_call_count(), 10);
    assert_eq!(heavy.generate_call_count(), 5);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_hundred_only_when_done() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend().with_latency_ms(5);
    let heavy = summary_backend().with_latency_ms(5);
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, seen) = wait_for(&service, id).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1), "went backwards: {:?}", seen);
    for (status, percentage) in &seen {
        assert_eq!(*percentage == 100, *status == TaskStatus::Completed);
    }
}

#[tokio::test]
async fn test_pool_bounds_concurrent_model_calls() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend().with_random_latency_ms(10);
    let heavy = summary_backend().with_random_latency_ms(10);
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let first = service.submit(recommend());
    let second = service.submit(recommend());
    wait_for(&service, first).await;
    wait_for(&service, second).await;

    assert!(light.peak_concurrency() <= 2, "light peak {}", light.peak_concurrency());
    assert!(heavy.peak_concurrency() <= 2, "heavy peak {}", heavy.peak_concurrency());
    assert!(service.pool().max_workers() == 2);
}

#[tokio::test]
async fn test_cancel_between_fetch_and_score() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(ScriptedSource::new(papers()).gated(entered.clone(), release.clone()));
    let light = scoring_backend();
    let heavy = summary_backend();
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    entered.notified().await;
    assert!(service.cancel(id));
    release.notify_one();

    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Failed);
    assert_eq!(progress.error.as_deref(), Some("Task cancelled"));
    assert_eq!(light.generate_call_count(), 0);
    assert_eq!(heavy.generate_call_count(), 0);
    assert!(!service.cancel(id));
}

#[tokio::test]
async fn test_fetch_exhaustion_fails_task() {
    let failures = (0..3)
        .map(|_| Error::Transient("service unavailable".into()))
        .collect();
    let source = Arc::new(ScriptedSource::new(papers()).failing(failures));
    let light = scoring_backend();
    let heavy = summary_backend();
    let service = service(source.clone(), &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;

    assert_eq!(progress.status, TaskStatus::Failed);
    let error = progress.error.unwrap();
    assert!(error.starts_with("Fetch error"), "{}", error);
    assert!(error.contains("fetch stage"), "{}", error);
    assert_eq!(source.calls(), 3);
    assert_eq!(light.generate_call_count(), 0);
    assert!(progress.logs.iter().any(|l| l.message.contains("fetch stage")));
}

#[tokio::test]
async fn test_fetch_recovers_within_retry_budget() {
    let source = Arc::new(
        ScriptedSource::new(papers()).failing(vec![Error::Transient("rate limited".into())]),
    );
    let light = scoring_backend();
    let heavy = summary_backend();
    let service = service(source.clone(), &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_invalid_model_config_fails_at_submission() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend().with_invalid_config("OPENAI_API_KEY is not set");
    let heavy = summary_backend();
    let service = service(source.clone(), &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let progress = service.progress(id).unwrap();

    assert_eq!(progress.status, TaskStatus::Failed);
    assert!(progress.error.unwrap().starts_with("Configuration error"));
    assert!(!progress.logs.is_empty());
    assert_eq!(source.calls(), 0);
    assert_eq!(light.generate_call_count(), 0);
}

#[tokio::test]
async fn test_partial_analysis_failure_is_annotated() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend();
    let heavy = summary_backend()
        .with_failure_containing(needle("Bravo"), Error::Inference("garbled reply".into()));
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Completed);

    let report: RecommendationReport = serde_json::from_value(progress.result.unwrap()).unwrap();
    let bravo = report
        .items
        .iter()
        .find(|i| i.scored.item.title == "Bravo")
        .unwrap();
    assert!(bravo.analysis_failed);
    assert!(bravo.summary.starts_with(defaults::ANALYSIS_FAILED_PLACEHOLDER));
    assert_eq!(report.items.iter().filter(|i| i.analysis_failed).count(), 1);
}

#[tokio::test]
async fn test_scoring_failures_are_reported_as_unscored() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let light = scoring_backend()
        .with_failure_containing(needle("Alpha"), Error::Timeout("slow model".into()));
    let heavy = summary_backend();
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Completed);

    let report: RecommendationReport = serde_json::from_value(progress.result.unwrap()).unwrap();
    assert_eq!(report.scored, 9);
    assert_eq!(report.unscored.len(), 1);
    assert_eq!(report.unscored[0].title, "Alpha");
    assert_eq!(report.items[0].scored.item.title, "Foxtrot");
}

#[tokio::test]
async fn test_empty_fetch_completes_with_empty_report() {
    let source = Arc::new(ScriptedSource::new(vec![]));
    let light = scoring_backend();
    let heavy = summary_backend();
    let service = service(source, &light, &heavy, CategoryStore::in_memory());

    let id = service.submit(recommend());
    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Completed);

    let report: RecommendationReport = serde_json::from_value(progress.result.unwrap()).unwrap();
    assert_eq!(report.fetched, 0);
    assert!(report.items.is_empty());
}

#[tokio::test]
async fn test_unknown_task_is_none() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let service = service(
        source,
        &scoring_backend(),
        &summary_backend(),
        CategoryStore::in_memory(),
    );
    let unknown = Uuid::new_v4();
    assert!(service.progress(unknown).is_none());
    assert!(!service.cancel(unknown));
}

#[tokio::test]
async fn test_match_records_best_category() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("category_matches.json");
    let store = CategoryStore::open(&path).await.unwrap();

    let light = MockGenerationBackend::new("light")
        .with_fixed_response("SCORE: 15")
        .with_response_containing("(cs.CV)", "SCORE: 88")
        .with_response_containing("(cs.RO)", "SCORE: 64");
    let source = Arc::new(ScriptedSource::new(vec![]));
    let service = service(source, &light, &summary_backend(), store);

    let candidates = ["cs.CV", "cs.RO", "cs.DB"]
        .iter()
        .map(|id| CategoryInfo {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
        })
        .collect();
    let id = service.submit(TaskRequest::Match {
        username: "ada".to_string(),
        user_input: "Visual navigation for mobile robots".to_string(),
        candidates,
    });
    let (progress, _) = wait_for(&service, id).await;
    assert_eq!(progress.status, TaskStatus::Completed, "{:?}", progress.error);

    let report: MatchReport = serde_json::from_value(progress.result.unwrap()).unwrap();
    assert_eq!(report.matches[0].category.id, "cs.CV");
    assert_eq!(report.matches[1].category.id, "cs.RO");
    assert_eq!(report.record_index, Some(0));

    let records = service
        .list_category_records(Some(CategoryFilter::for_user("ada")))
        .await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category_id, "cs.CV");

    let updated = service
        .update_category_record(
            0,
            CategoryRecordPatch {
                category_id: Some("cs.RO".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.category_id, "cs.RO");

    let reopened = CategoryStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(0).await.unwrap().category_id, "cs.RO");

    service.delete_category_record(0).await.unwrap();
    assert!(service.list_category_records(None).await.is_empty());
}

#[tokio::test]
async fn test_match_rejects_empty_description() {
    let light = MockGenerationBackend::new("light");
    let source = Arc::new(ScriptedSource::new(vec![]));
    let service = service(source, &light, &summary_backend(), CategoryStore::in_memory());

    let id = service.submit(TaskRequest::Match {
        username: "ada".to_string(),
        user_input: "  ".to_string(),
        candidates: vec![],
    });
    let progress = service.progress(id).unwrap();
    assert_eq!(progress.status, TaskStatus::Failed);
    assert!(progress.error.unwrap().starts_with("Invalid input"));
    assert_eq!(light.generate_call_count(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_sweeper() {
    let source = Arc::new(ScriptedSource::new(papers()));
    let analyst = ModelAnalyst::new(
        Arc::new(scoring_backend()),
        Arc::new(summary_backend()),
    );
    let service = ScoutServiceBuilder::new(source, Arc::new(analyst))
        .with_sweeper(true)
        .build();
    assert!(service.shutdown().await.is_ok());
    // A second shutdown is a no-op.
    assert!(service.shutdown().await.is_ok());
}
