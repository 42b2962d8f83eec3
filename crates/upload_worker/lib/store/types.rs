use thiserror::Error;

/// Error type for durable store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("block ({batch_id}, {block_index}) already exists")]
    AlreadyExists { batch_id: String, block_index: i64 },
    #[error("invalid page status value in database: {0}")]
    InvalidStatus(String),
    #[error("invalid store input: {0}")]
    InvalidInput(String),
}

/// One stored block. Presence in the store means "not yet uploaded".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub batch_id: String,
    pub block_index: i64,
    pub source_location: String,
    pub payload: String,
}

/// Durable batch to destination-page association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMapping {
    pub batch_id: String,
    pub page_reference: String,
}

/// Snapshot of one named semaphore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreState {
    pub lock_name: String,
    pub current_lock_count: i64,
    pub owner_ids: Vec<String>,
}

/// Result of one conditional acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireAttempt {
    Acquired,
    /// The owner already held a slot; the count was not incremented again.
    AlreadyHeld,
    /// Every slot is taken.
    Full { current_lock_count: i64 },
}

/// Result of removing an owner without its cooperation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOutcome {
    pub removed: bool,
    pub current_lock_count: i64,
}

/// Audit record for a source document that failed ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailRecord {
    pub source_location: String,
    pub event_time_ms: i64,
    pub origin_container: String,
}

/// Coarse per-batch pipeline state shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Stored,
    Uploading,
    Complete,
    Failed,
    Stalled,
}

impl PageStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            PageStatus::Stored => "stored",
            PageStatus::Uploading => "uploading",
            PageStatus::Complete => "complete",
            PageStatus::Failed => "failed",
            PageStatus::Stalled => "stalled",
        }
    }

    pub(crate) fn from_db_str(value: &str) -> Result<Self, StoreError> {
        match value {
            "stored" => Ok(PageStatus::Stored),
            "uploading" => Ok(PageStatus::Uploading),
            "complete" => Ok(PageStatus::Complete),
            "failed" => Ok(PageStatus::Failed),
            "stalled" => Ok(PageStatus::Stalled),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Materialized row from `page_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStatusRecord {
    pub batch_id: String,
    pub source_location: Option<String>,
    pub status: PageStatus,
    pub status_time_ms: i64,
}
