//! Structured logging schema, field name constants and subscriber setup.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Task failed, requires attention |
//! | WARN  | Recoverable issue: retry, per-item failure, fallback applied |
//! | INFO  | Lifecycle events: task start/finish, stage boundaries |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (individual scores, pool dispatch) |

use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{Error, Result};

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "inference", "store", "source"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "registry", "pool", "fetcher", "ollama", "analyst"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "fetch", "score", "summarize", "append"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Task UUID being processed.
pub const TASK_ID: &str = "task_id";

/// Task kind ("recommend", "match").
pub const TASK_KIND: &str = "task_kind";

/// Username owning the task or record.
pub const USERNAME: &str = "username";

/// Paper identifier.
pub const PAPER_ID: &str = "paper_id";

/// Paper source query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of items in a batch or result.
pub const ITEM_COUNT: &str = "item_count";

/// Attempt number (1-based) of a retried call.
pub const ATTEMPT: &str = "attempt";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

// ─── Subscriber setup ──────────────────────────────────────────────────────

/// Output options for [`init_tracing`].
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Write to a daily-rotated file instead of stdout.
    pub file: Option<String>,
    /// Force ANSI colors on or off (auto when `None`).
    pub ansi: Option<bool>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl LogConfig {
    /// Read `LOG_FORMAT`, `LOG_FILE` and `LOG_ANSI`.
    pub fn from_env() -> Self {
        Self {
            json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            file: std::env::var("LOG_FILE").ok().filter(|v| !v.is_empty()),
            ansi: std::env::var("LOG_ANSI")
                .ok()
                .map(|v| v == "true" || v == "1"),
            default_filter: "scout_jobs=info,scout_inference=info,scout_store=info".to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns the file writer guard when file output is enabled; keep it alive
/// for the lifetime of the process or buffered lines are lost.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = config.file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("paperscout.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let result = if config.json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .try_init()
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(config.ansi.unwrap_or(false)); // no ANSI in files
            registry.with(layer).try_init()
        };
        result.map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
        Some(guard)
    } else {
        let result = if config.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = config.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).try_init()
        };
        result.map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
        None
    };

    info!(
        json = config.json,
        log_file = config.file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    Ok(guard)
}
