use std::sync::Arc;

use futures::future::BoxFuture;
use wiki_core::RenderedBlock;

use crate::workspace_client::{ParentContainer, WorkspaceClient};

use super::super::types::{GlobalRateLimiter, UploadError};
use super::error_mapping::{map_workspace_error, RemoteOperation};

/// Remote write surface used by the page resolver and the block uploader.
///
/// Failures are already normalized into `UploadError`, so callers only decide retry vs stop.
pub trait WorkspaceWriter: Send + Sync {
    fn fetch_parent<'a>(
        &'a self,
        parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>>;

    /// Creates the child page and returns its reference.
    fn create_child<'a>(
        &'a self,
        parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>>;

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>>;
}

impl<T> WorkspaceWriter for Arc<T>
where
    T: WorkspaceWriter + ?Sized,
{
    fn fetch_parent<'a>(
        &'a self,
        parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>> {
        (**self).fetch_parent(parent_reference)
    }

    fn create_child<'a>(
        &'a self,
        parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        (**self).create_child(parent, title)
    }

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        (**self).append_block(page_reference, block)
    }
}

/// HTTP-backed writer used by the production runtime.
///
/// Every call, retries included, first waits on the shared rate limiter.
pub struct HttpWorkspaceWriter {
    client: Arc<WorkspaceClient>,
    rate_limiter: GlobalRateLimiter,
}

impl HttpWorkspaceWriter {
    pub fn new(client: Arc<WorkspaceClient>, rate_limiter: GlobalRateLimiter) -> Self {
        Self {
            client,
            rate_limiter,
        }
    }
}

impl WorkspaceWriter for HttpWorkspaceWriter {
    fn fetch_parent<'a>(
        &'a self,
        parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>> {
        Box::pin(async move {
            self.rate_limiter.until_ready().await;
            self.client
                .fetch_parent(parent_reference)
                .await
                .map_err(|err| map_workspace_error(err, RemoteOperation::FetchParent))
        })
    }

    fn create_child<'a>(
        &'a self,
        parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        Box::pin(async move {
            self.rate_limiter.until_ready().await;
            self.client
                .create_page(parent, title)
                .await
                .map_err(|err| map_workspace_error(err, RemoteOperation::CreateChild))
        })
    }

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            self.rate_limiter.until_ready().await;
            self.client
                .append_block(page_reference, block)
                .await
                .map_err(|err| map_workspace_error(err, RemoteOperation::AppendBlock))
        })
    }
}
