//! Core data models for paperscout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// TASK TYPES
// =============================================================================

/// Which pipeline a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fetch, score, tier and summarize papers for a user profile.
    Recommend,
    /// Score candidate categories against a research description.
    Match,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Recommend => "recommend",
            TaskKind::Match => "match",
        }
    }
}

/// Task lifecycle status.
///
/// `Pending → Running → {Completed, Failed}`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

/// Severity of a task log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of a task's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A single asynchronous pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub step: String,
    pub percentage: u8,
    pub logs: Vec<TaskLogEntry>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            status: TaskStatus::Pending,
            step: "queued".to_string(),
            percentage: 0,
            logs: Vec::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// What a poller sees for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub step: String,
    pub percentage: u8,
    pub logs: Vec<TaskLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

impl From<&Task> for TaskProgress {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            kind: task.kind,
            status: task.status,
            step: task.step.clone(),
            percentage: task.percentage,
            logs: task.logs.clone(),
            error: task.error.clone(),
            result: task.result.clone(),
        }
    }
}

// =============================================================================
// PAPER TYPES
// =============================================================================

/// A paper as returned by the paper source. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub source_categories: Vec<String>,
    /// Zero-based position in the fetched list.
    pub raw_rank: usize,
}

/// Reporting depth assigned after ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Detailed,
    Brief,
    Excluded,
}

impl Tier {
    /// Summary depth for a reported tier; `None` for excluded items.
    pub fn depth(&self) -> Option<SummaryDepth> {
        match self {
            Tier::Detailed => Some(SummaryDepth::Detailed),
            Tier::Brief => Some(SummaryDepth::Brief),
            Tier::Excluded => None,
        }
    }
}

/// How thorough a generated summary should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryDepth {
    Detailed,
    Brief,
}

/// A candidate with its relevance score (0–100) and assigned tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: CandidateItem,
    pub score: f32,
    pub tier: Tier,
}

/// A reported item with its generated summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedItem {
    #[serde(flatten)]
    pub scored: ScoredItem,
    pub summary: String,
    pub analysis_failed: bool,
}

/// A candidate whose scoring never succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscoredItem {
    pub id: String,
    pub title: String,
    pub error: String,
}

/// Result payload of a completed recommendation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub username: String,
    pub query: String,
    pub fetched: usize,
    pub scored: usize,
    pub discarded: usize,
    pub unscored: Vec<UnscoredItem>,
    /// Detailed items first, then brief, each in rank order.
    pub items: Vec<AnalyzedItem>,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// USER & CATEGORY TYPES
// =============================================================================

/// A user's stated research interests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub positive_interests: Vec<String>,
    #[serde(default)]
    pub negative_interests: Vec<String>,
    pub category_id: String,
    pub updated_at: DateTime<Utc>,
}

/// A candidate category offered to the matching pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One ranked category match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category: CategoryInfo,
    pub score: f32,
    /// One-based rank.
    pub rank: usize,
}

/// Result payload of a completed matching task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub username: String,
    pub user_input: String,
    pub matches: Vec<CategoryMatch>,
    pub failed: usize,
    /// Position of the appended store record, if one was written.
    pub record_index: Option<usize>,
}

/// A persisted category-match result. Append-only per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatchRecord {
    pub username: String,
    pub category_id: String,
    pub user_input: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
}

/// Fields that may be edited on an existing record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecordPatch {
    pub category_id: Option<String>,
    pub user_input: Option<String>,
    pub score: Option<f32>,
}

impl CategoryRecordPatch {
    /// Apply the set fields to `record`, refreshing its timestamp.
    pub fn apply_to(&self, record: &mut CategoryMatchRecord) {
        if let Some(ref category_id) = self.category_id {
            record.category_id = category_id.clone();
        }
        if let Some(ref user_input) = self.user_input {
            record.user_input = user_input.clone();
        }
        if let Some(score) = self.score {
            record.score = score;
        }
        record.timestamp = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.category_id.is_none() && self.user_input.is_none() && self.score.is_none()
    }
}

/// Optional narrowing of a record listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub username: Option<String>,
    pub category_id: Option<String>,
}

impl CategoryFilter {
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            category_id: None,
        }
    }

    pub fn matches(&self, record: &CategoryMatchRecord) -> bool {
        self.username
            .as_deref()
            .map_or(true, |u| record.username == u)
            && self
                .category_id
                .as_deref()
                .map_or(true, |c| record.category_id == c)
    }
}
