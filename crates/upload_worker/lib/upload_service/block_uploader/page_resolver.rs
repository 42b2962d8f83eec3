use thiserror::Error;
use tracing::{info, warn};

use crate::server::monitoring::UPLOAD_METRICS;
use crate::store::{get_page_mapping, insert_page_mapping_if_absent};

use super::super::error::Error;
use super::super::store_handle::StoreHandle;
use super::super::types::{RetryPolicy, UploadError};
use super::retry::run_with_retry;
use super::writer::WorkspaceWriter;

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The remote system refused or kept failing; reported as a block failure.
    #[error("{error}")]
    Remote { error: UploadError, attempts: u32 },
    /// Local store or runtime failure; aborts the chunk.
    #[error(transparent)]
    Service(#[from] Error),
}

/// Maps a batch to its destination page, creating the page on first use.
pub struct PageResolver<W, S> {
    writer: W,
    store: S,
    retry_policy: RetryPolicy,
}

impl<W, S> PageResolver<W, S>
where
    W: WorkspaceWriter,
    S: StoreHandle,
{
    pub fn new(writer: W, store: S, retry_policy: RetryPolicy) -> Self {
        Self {
            writer,
            store,
            retry_policy,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Returns the durable page reference for `batch_id`.
    ///
    /// An existing mapping short-circuits without any remote call. When two resolvers race, both
    /// create a remote page but only the first mapping is kept; the loser's page stays orphaned
    /// and is reported, not deleted.
    pub async fn resolve_or_create(
        &self,
        batch_id: &str,
        title: &str,
        parent_reference: &str,
    ) -> Result<String, ResolveError> {
        if let Some(existing) = self.lookup(batch_id).await? {
            return Ok(existing);
        }

        let seed = jitter_seed(batch_id);
        let (parent, _) = run_with_retry(&self.retry_policy, "fetch_parent", seed, |_| {
            self.writer.fetch_parent(parent_reference)
        })
        .await
        .map_err(|terminal| ResolveError::Remote {
            error: terminal.error,
            attempts: terminal.attempts,
        })?;

        let (created, _) = run_with_retry(&self.retry_policy, "create_child", seed, |_| {
            self.writer.create_child(&parent, title)
        })
        .await
        .map_err(|terminal| ResolveError::Remote {
            error: terminal.error,
            attempts: terminal.attempts,
        })?;

        let won = {
            let batch = batch_id.to_string();
            let page = created.clone();
            self.store
                .run(move |conn| Ok(insert_page_mapping_if_absent(conn, &batch, &page)?))
                .await?
        };

        if won {
            info!(
                event = "page_created",
                batch_id,
                page_reference = %created,
                parent_id = parent.id(),
                "created destination page"
            );
            return Ok(created);
        }

        let durable = self.lookup(batch_id).await?.ok_or_else(|| {
            Error::Orchestration(format!(
                "page mapping for batch {batch_id} rejected as duplicate but not readable"
            ))
        })?;
        if let Some(metrics) = UPLOAD_METRICS.get() {
            metrics.orphaned_pages_total.inc();
        }
        warn!(
            event = "orphaned_remote_page",
            batch_id,
            orphan_page_reference = %created,
            page_reference = %durable,
            "lost the page-creation race; adopting the durable mapping"
        );
        Ok(durable)
    }

    async fn lookup(&self, batch_id: &str) -> Result<Option<String>, Error> {
        let batch = batch_id.to_string();
        let mapping = self
            .store
            .run(move |conn| Ok(get_page_mapping(conn, &batch)?))
            .await?;
        Ok(mapping.map(|mapping| mapping.page_reference))
    }
}

pub(super) fn jitter_seed(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
