use crate::staging::StagingError;
use crate::store::StoreError;
use crate::workspace_client::WorkspaceClientErr;
use thiserror::Error;
use tokio::task::JoinError;
use wiki_core::PayloadError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    ConnectError(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task join error: {0}")]
    TaskJoinError(#[from] JoinError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceClientErr),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("could not acquire semaphore `{lock_name}` after {attempts} attempts")]
    LockTimeout { lock_name: String, attempts: u32 },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}
