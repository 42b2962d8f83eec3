use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;
use wiki_core::markdown::render_markdown;
use wiki_core::{encode_block, RenderedBlock};

use crate::logging::format_error_report;
use crate::server::monitoring::INGEST_METRICS;
use crate::staging::DocumentSource;
use crate::store::{put_block, upsert_page_status, PageStatus, StoreError, StoredBlock};

use super::dlq::record_page_fail;
use super::error::Error;
use super::store_handle::StoreHandle;
use super::types::{ArrivalEvent, BatchReady};

pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// Turns a source document into ordered blocks.
pub trait BlockRenderer: Send + Sync {
    fn render(&self, document: &str) -> Vec<RenderedBlock>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl BlockRenderer for MarkdownRenderer {
    fn render(&self, document: &str) -> Vec<RenderedBlock> {
        render_markdown(document)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub batch_id: String,
    pub source_location: String,
    pub stored: usize,
    pub skipped_artifacts: usize,
    /// Blocks already present under the same key, left untouched.
    pub duplicates: usize,
}

#[derive(Debug)]
pub enum RedriveOutcome {
    Ingested(IngestReport),
    /// Every receive failed; the arrival went to the page-fail audit trail.
    DeadLettered {
        attempts: u32,
        recorded: bool,
        last_error: String,
    },
}

/// Block Store producer: one fresh batch per arrival event.
pub struct BlockIngestor<S> {
    store: S,
    source: Arc<dyn DocumentSource>,
    renderer: Arc<dyn BlockRenderer>,
    max_receive_count: u32,
    batch_ready: Option<flume::Sender<BatchReady>>,
}

impl<S> BlockIngestor<S>
where
    S: StoreHandle,
{
    pub fn new(store: S, source: Arc<dyn DocumentSource>, renderer: Arc<dyn BlockRenderer>) -> Self {
        Self {
            store,
            source,
            renderer,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            batch_ready: None,
        }
    }

    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count.max(1);
        self
    }

    pub fn with_batch_ready(mut self, sender: flume::Sender<BatchReady>) -> Self {
        self.batch_ready = Some(sender);
        self
    }

    pub async fn ingest(&self, event: &ArrivalEvent) -> Result<IngestReport, Error> {
        let batch_id = Uuid::new_v4().to_string();
        self.ingest_as(event, &batch_id).await
    }

    /// Stores every non-artifact block of the document under `batch_id`.
    ///
    /// Block indices follow the rendered order, so skipped artifacts leave gaps. Keys that are
    /// already stored are counted as duplicates and never overwritten.
    pub async fn ingest_as(
        &self,
        event: &ArrivalEvent,
        batch_id: &str,
    ) -> Result<IngestReport, Error> {
        if event.source_location.is_empty() || batch_id.is_empty() {
            return Err(Error::InvalidEvent(
                "arrival needs a source_location and a batch_id".to_string(),
            ));
        }

        let document = self.source.read_document(&event.source_location).await?;
        let rendered = self.renderer.render(&document);

        let mut skipped_artifacts = 0usize;
        let mut blocks = Vec::with_capacity(rendered.len());
        for (index, block) in rendered.iter().enumerate() {
            if block.is_render_artifact() {
                skipped_artifacts += 1;
                continue;
            }
            blocks.push(StoredBlock {
                batch_id: batch_id.to_string(),
                block_index: index as i64,
                source_location: event.source_location.clone(),
                payload: encode_block(block)?,
            });
        }

        let (stored, duplicates) = {
            let batch = batch_id.to_string();
            let source_location = event.source_location.clone();
            let now = chrono::Utc::now().timestamp_millis();
            self.store
                .run(move |conn| {
                    let mut stored = 0usize;
                    let mut duplicates = 0usize;
                    for block in &blocks {
                        match put_block(conn, block) {
                            Ok(()) => stored += 1,
                            Err(StoreError::AlreadyExists {
                                batch_id,
                                block_index,
                            }) => {
                                duplicates += 1;
                                warn!(
                                    event = "duplicate_block_ignored",
                                    batch_id = %batch_id,
                                    block_index,
                                    "block already stored; keeping the first copy"
                                );
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                    upsert_page_status(
                        conn,
                        &batch,
                        Some(&source_location),
                        PageStatus::Stored,
                        now,
                    )?;
                    Ok((stored, duplicates))
                })
                .await?
        };

        if let Some(metrics) = INGEST_METRICS.get() {
            metrics.blocks_stored_total.inc_by(stored as u64);
            metrics.duplicate_blocks_total.inc_by(duplicates as u64);
            metrics
                .artifact_blocks_skipped_total
                .inc_by(skipped_artifacts as u64);
            metrics.pages_converted_total.inc();
        }
        info!(
            event = "page_ingested",
            batch_id,
            source_location = %event.source_location,
            stored,
            duplicates,
            skipped_artifacts,
            "source document stored as blocks"
        );

        if let Some(sender) = &self.batch_ready {
            let ready = BatchReady {
                batch_id: batch_id.to_string(),
                source_location: event.source_location.clone(),
            };
            if sender.send_async(ready).await.is_err() {
                warn!(
                    event = "batch_ready_dropped",
                    batch_id,
                    "no orchestrator trigger is listening"
                );
            }
        }

        Ok(IngestReport {
            batch_id: batch_id.to_string(),
            source_location: event.source_location.clone(),
            stored,
            skipped_artifacts,
            duplicates,
        })
    }

    /// Retries a failing arrival up to `max_receive_count` times, then dead-letters it.
    ///
    /// All receives of one arrival share a batch id, so blocks stored by a failed attempt are
    /// deduplicated by key on the next one.
    pub async fn ingest_with_redrive(&self, event: &ArrivalEvent) -> Result<RedriveOutcome, Error> {
        let batch_id = Uuid::new_v4().to_string();
        let mut last_error = String::new();

        for attempt in 1..=self.max_receive_count {
            match self.ingest_as(event, &batch_id).await {
                Ok(report) => return Ok(RedriveOutcome::Ingested(report)),
                Err(err) => {
                    if let Some(metrics) = INGEST_METRICS.get() {
                        metrics.pages_failed_total.inc();
                    }
                    warn!(
                        event = "ingest_attempt_failed",
                        source_location = %event.source_location,
                        attempt,
                        max_receive_count = self.max_receive_count,
                        error = %format_error_report(&err),
                        "ingestion attempt failed"
                    );
                    last_error = err.to_string();
                }
            }
        }

        let recorded = record_page_fail(&self.store, event).await?;
        Ok(RedriveOutcome::DeadLettered {
            attempts: self.max_receive_count,
            recorded,
            last_error,
        })
    }
}
