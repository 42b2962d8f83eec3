use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wiki_core::decode_block;

use crate::server::monitoring::UPLOAD_METRICS;
use crate::staging::SourceCatalog;
use crate::store::{delete_block, list_blocks, StoredBlock};

use super::super::error::Error;
use super::super::store_handle::StoreHandle;
use super::super::types::{BlockFailure, ChunkResult, ChunkStatus, UploadError, UploaderConfig};
use super::error_mapping::{map_payload_error, map_staging_error};
use super::page_resolver::{jitter_seed, PageResolver, ResolveError};
use super::retry::run_with_retry;
use super::writer::WorkspaceWriter;

/// One bounded pass over a batch's remaining blocks.
///
/// `Ok` carries the chunk verdict, including per-block failures. `Err` means the invocation itself
/// broke (store unreachable, task panicked) and nothing can be said about the chunk.
pub trait ChunkWorker: Send + Sync {
    fn process_chunk<'a>(&'a self, batch_id: &'a str) -> BoxFuture<'a, Result<ChunkResult, Error>>;
}

impl<T> ChunkWorker for Arc<T>
where
    T: ChunkWorker + ?Sized,
{
    fn process_chunk<'a>(
        &'a self,
        batch_id: &'a str,
    ) -> BoxFuture<'a, Result<ChunkResult, Error>> {
        (**self).process_chunk(batch_id)
    }
}

/// Uploads blocks in index order, deleting each one once the remote append is acknowledged.
///
/// Shutdown is only observed between blocks, so a block that reached the remote is always
/// deleted before the chunk returns.
pub struct BlockUploader<W, S> {
    resolver: PageResolver<W, S>,
    store: S,
    catalog: Arc<dyn SourceCatalog>,
    config: UploaderConfig,
    shutdown: CancellationToken,
}

impl<W, S> BlockUploader<W, S>
where
    W: WorkspaceWriter,
    S: StoreHandle,
{
    pub fn new(
        writer: W,
        store: S,
        catalog: Arc<dyn SourceCatalog>,
        config: UploaderConfig,
    ) -> Self {
        Self {
            resolver: PageResolver::new(writer, store.clone(), config.retry_policy),
            store,
            catalog,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops each chunk at the next block boundary once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn upload_chunk(&self, batch_id: &str) -> Result<ChunkResult, Error> {
        let started = Instant::now();
        let blocks = {
            let batch = batch_id.to_string();
            let limit = self.config.max_blocks;
            self.store
                .run(move |conn| Ok(list_blocks(conn, &batch, limit)?))
                .await?
        };

        if blocks.is_empty() {
            debug!(event = "chunk_backlog_empty", batch_id, "no blocks left for batch");
            return Ok(ChunkResult::drained());
        }

        let mut page_reference: Option<String> = None;
        let mut uploaded = 0usize;

        for block in &blocks {
            if self.shutdown.is_cancelled() {
                info!(
                    event = "chunk_interrupted",
                    batch_id,
                    uploaded,
                    "shutdown requested; stopping chunk at a block boundary"
                );
                break;
            }
            if uploaded > 0 && started.elapsed() >= self.config.chunk_budget {
                info!(
                    event = "chunk_budget_exhausted",
                    batch_id,
                    uploaded,
                    remaining_in_chunk = blocks.len() - uploaded,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stopping chunk early to stay inside the wall-clock budget"
                );
                break;
            }

            let rendered = match decode_block(&block.payload) {
                Ok(rendered) => rendered,
                Err(err) => {
                    let error = map_payload_error(&err);
                    return Ok(failed_chunk(batch_id, uploaded, block, error, 0));
                }
            };

            let page = match &page_reference {
                Some(page) => page.clone(),
                None => match self.resolve_page(batch_id, block).await? {
                    Ok(page) => {
                        page_reference = Some(page.clone());
                        page
                    }
                    Err((error, attempts)) => {
                        return Ok(failed_chunk(batch_id, uploaded, block, error, attempts))
                    }
                },
            };

            let seed = jitter_seed(batch_id) ^ block.block_index as u64;
            let appended = run_with_retry(&self.config.retry_policy, "append_block", seed, |_| {
                self.resolver.writer().append_block(&page, &rendered)
            })
            .await;
            let attempts = match appended {
                Ok(((), attempts)) => attempts,
                Err(terminal) => {
                    return Ok(failed_chunk(
                        batch_id,
                        uploaded,
                        block,
                        terminal.error,
                        terminal.attempts,
                    ))
                }
            };

            let deleted = {
                let batch = block.batch_id.clone();
                let index = block.block_index;
                self.store
                    .run(move |conn| Ok(delete_block(conn, &batch, index)?))
                    .await?
            };
            if !deleted {
                warn!(
                    event = "block_already_deleted",
                    batch_id,
                    block_index = block.block_index,
                    "uploaded block was already gone from the store"
                );
            }

            uploaded += 1;
            if let Some(metrics) = UPLOAD_METRICS.get() {
                metrics.blocks_uploaded_total.inc();
            }
            debug!(
                event = "block_uploaded",
                batch_id,
                block_index = block.block_index,
                attempts,
                "block appended and removed from store"
            );
        }

        info!(
            event = "chunk_completed",
            batch_id,
            processed_count = uploaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chunk finished"
        );
        Ok(ChunkResult {
            status: ChunkStatus::Success,
            processed_count: uploaded,
            success_block_count: uploaded,
            fail_block_count: 0,
            failure: None,
        })
    }

    /// Outer `Err` is a service failure. Inner `Err` is a block-level failure with its attempt count.
    async fn resolve_page(
        &self,
        batch_id: &str,
        block: &StoredBlock,
    ) -> Result<Result<String, (UploadError, u32)>, Error> {
        let descriptor = match self.catalog.describe(&block.source_location).await {
            Ok(descriptor) => descriptor,
            Err(err) => return Ok(Err((map_staging_error(&err), 0))),
        };

        match self
            .resolver
            .resolve_or_create(batch_id, &descriptor.title, &descriptor.parent_reference)
            .await
        {
            Ok(page) => Ok(Ok(page)),
            Err(ResolveError::Remote { error, attempts }) => Ok(Err((error, attempts))),
            Err(ResolveError::Service(err)) => Err(err),
        }
    }
}

impl<W, S> ChunkWorker for BlockUploader<W, S>
where
    W: WorkspaceWriter,
    S: StoreHandle,
{
    fn process_chunk<'a>(
        &'a self,
        batch_id: &'a str,
    ) -> BoxFuture<'a, Result<ChunkResult, Error>> {
        Box::pin(self.upload_chunk(batch_id))
    }
}

fn failed_chunk(
    batch_id: &str,
    uploaded: usize,
    block: &StoredBlock,
    error: UploadError,
    attempts: u32,
) -> ChunkResult {
    if let Some(metrics) = UPLOAD_METRICS.get() {
        metrics.blocks_failed_total.inc();
    }
    warn!(
        event = "block_upload_failed",
        batch_id,
        block_index = block.block_index,
        attempts,
        error_kind = ?error.kind,
        failure_class = %error.failure_class,
        error = %error.message,
        "stopping chunk at first failed block"
    );

    ChunkResult {
        status: ChunkStatus::Fail,
        processed_count: uploaded + 1,
        success_block_count: uploaded,
        fail_block_count: 1,
        failure: Some(BlockFailure {
            block_index: block.block_index,
            error,
            attempts,
        }),
    }
}
