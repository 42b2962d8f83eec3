use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_BLOCKS: i64 = 200;
pub const DEFAULT_LOCK_NAME: &str = "Semaphore";

pub const FAILURE_CLASS_NETWORK_TRANSIENT: &str = "network_transient";
pub const FAILURE_CLASS_HTTP_4XX: &str = "http_4xx";
pub const FAILURE_CLASS_PARENT: &str = "parent";
pub const FAILURE_CLASS_PAYLOAD: &str = "payload";
pub const FAILURE_CLASS_SOURCE: &str = "source";
pub const FAILURE_CLASS_SCHEMA: &str = "schema";

/// Transport-level retry behavior for remote workspace calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first attempt.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            jitter: Duration::from_millis(25),
        }
    }
}

/// Settings for one bounded uploader invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Upper bound on blocks pulled per chunk.
    pub max_blocks: i64,
    pub retry_policy: RetryPolicy,
    /// Wall-clock budget after which no new block is started in the chunk.
    pub chunk_budget: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_blocks: DEFAULT_MAX_BLOCKS,
            retry_policy: RetryPolicy::default(),
            chunk_budget: Duration::from_secs(540),
        }
    }
}

/// Process-wide limiter shared by every remote workspace call, retries included.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Normalized remote failure classes used by retry and stop decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    Network,
    RateLimited,
    UpstreamUnavailable,
    Unauthorized,
    Forbidden,
    ParentNotFound,
    InvalidParent,
    MalformedResponse,
    InvalidPayload,
    InvalidSource,
    Other,
}

/// Typed per-block failure with human-readable details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    pub kind: UploadErrorKind,
    pub message: String,
    pub failure_class: String,
}

impl UploadError {
    pub fn new(kind: UploadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            failure_class: FAILURE_CLASS_SCHEMA.to_string(),
        }
    }

    pub fn with_failure_class(mut self, failure_class: &str) -> Self {
        self.failure_class = failure_class.to_string();
        self
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            UploadErrorKind::Network
                | UploadErrorKind::RateLimited
                | UploadErrorKind::UpstreamUnavailable
        )
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for UploadError {}

/// Chunk-level and job-level verdict, serialized the way callers of the upload job expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChunkStatus {
    Success,
    Fail,
}

impl ChunkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Success => "SUCCESS",
            ChunkStatus::Fail => "FAIL",
        }
    }
}

/// The block that stopped a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFailure {
    pub block_index: i64,
    pub error: UploadError,
    pub attempts: u32,
}

/// Result of one bounded uploader invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub status: ChunkStatus,
    /// Blocks attempted in this chunk, successful or not. Zero with `Success` means the backlog
    /// is drained.
    pub processed_count: usize,
    pub success_block_count: usize,
    pub fail_block_count: usize,
    pub failure: Option<BlockFailure>,
}

impl ChunkResult {
    pub fn drained() -> Self {
        Self {
            status: ChunkStatus::Success,
            processed_count: 0,
            success_block_count: 0,
            fail_block_count: 0,
            failure: None,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.status == ChunkStatus::Success && self.processed_count == 0
    }
}

/// Output of one orchestrated upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub result: ChunkStatus,
    pub success_block_count: usize,
    pub fail_block_count: usize,
}

/// Terminal state of one orchestrator execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
            ExecutionStatus::Aborted => "ABORTED",
        }
    }

    /// Statuses the recovery sweeper acts on.
    pub fn is_abnormal(self) -> bool {
        !matches!(self, ExecutionStatus::Succeeded)
    }
}

/// Completion notice emitted once per orchestrator execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub execution_id: String,
    pub batch_id: String,
    pub lock_name: String,
    pub status: ExecutionStatus,
}

/// A source document landing in the staging location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalEvent {
    pub source_location: String,
    pub origin_container: String,
    /// ISO-8601 UTC, e.g. `2024-01-01T12:00:00.000Z`.
    pub event_time: String,
}

/// Emitted by ingestion once a batch's blocks are durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReady {
    pub batch_id: String,
    pub source_location: String,
}
