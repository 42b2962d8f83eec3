pub mod error_mapping;
mod page_resolver;
mod retry;
mod uploader;
mod writer;

pub use page_resolver::{PageResolver, ResolveError};
pub use retry::{compute_backoff_delay, run_with_retry, RetryTerminal};
pub use uploader::{BlockUploader, ChunkWorker};
pub use writer::{HttpWorkspaceWriter, WorkspaceWriter};

#[cfg(test)]
mod test_support;
