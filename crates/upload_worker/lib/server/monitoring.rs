use crate::build_info;
use crate::logging::SERVICE_NAME;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers build metadata as a labeled gauge fixed at `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: SERVICE_NAME,
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone)]
pub struct UploadMetrics {
    /// Blocks acknowledged by the workspace API and deleted from the store.
    pub blocks_uploaded_total: Counter,
    /// Blocks that stopped a chunk.
    pub blocks_failed_total: Counter,
    pub chunks_total: Counter,
    pub jobs_succeeded_total: Counter,
    pub jobs_failed_total: Counter,
    /// Jobs that timed out or were aborted while holding the lock.
    pub jobs_abandoned_total: Counter,
    pub lock_acquire_timeouts_total: Counter,
    /// Seconds the most recent job waited for a semaphore slot.
    pub last_lock_wait_seconds: Gauge,
    pub locks_swept_total: Counter,
    pub orphaned_pages_total: Counter,
}

impl UploadMetrics {
    fn init() -> Self {
        Self {
            blocks_uploaded_total: Counter::default(),
            blocks_failed_total: Counter::default(),
            chunks_total: Counter::default(),
            jobs_succeeded_total: Counter::default(),
            jobs_failed_total: Counter::default(),
            jobs_abandoned_total: Counter::default(),
            lock_acquire_timeouts_total: Counter::default(),
            last_lock_wait_seconds: Gauge::default(),
            locks_swept_total: Counter::default(),
            orphaned_pages_total: Counter::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "blocks_uploaded",
            "Total number of blocks appended to destination pages",
            metrics.blocks_uploaded_total.clone(),
        );
        sub_registry.register(
            "blocks_failed",
            "Total number of blocks whose upload stopped a chunk",
            metrics.blocks_failed_total.clone(),
        );
        sub_registry.register(
            "chunks",
            "Total number of bounded uploader invocations",
            metrics.chunks_total.clone(),
        );
        sub_registry.register(
            "jobs_succeeded",
            "Total number of upload jobs that drained their batch",
            metrics.jobs_succeeded_total.clone(),
        );
        sub_registry.register(
            "jobs_failed",
            "Total number of upload jobs that ended in FAIL",
            metrics.jobs_failed_total.clone(),
        );
        sub_registry.register(
            "jobs_abandoned",
            "Total number of upload jobs that timed out or aborted holding the lock",
            metrics.jobs_abandoned_total.clone(),
        );
        sub_registry.register(
            "lock_acquire_timeouts",
            "Total number of semaphore acquisitions that gave up",
            metrics.lock_acquire_timeouts_total.clone(),
        );
        sub_registry.register(
            "last_lock_wait_seconds",
            "Seconds the most recent job waited for a semaphore slot",
            metrics.last_lock_wait_seconds.clone(),
        );
        sub_registry.register(
            "locks_swept",
            "Total number of stale semaphore owners cleared by the recovery sweeper",
            metrics.locks_swept_total.clone(),
        );
        sub_registry.register(
            "orphaned_pages",
            "Total number of remote pages left unmapped by a lost resolve race",
            metrics.orphaned_pages_total.clone(),
        );
        metrics
    }
}

pub static UPLOAD_METRICS: OnceCell<UploadMetrics> = OnceCell::const_new();

#[derive(Clone)]
pub struct IngestMetrics {
    pub blocks_stored_total: Counter,
    pub duplicate_blocks_total: Counter,
    pub artifact_blocks_skipped_total: Counter,
    pub pages_converted_total: Counter,
    pub pages_failed_total: Counter,
    pub page_fails_recorded_total: Counter,
}

impl IngestMetrics {
    fn init() -> Self {
        Self {
            blocks_stored_total: Counter::default(),
            duplicate_blocks_total: Counter::default(),
            artifact_blocks_skipped_total: Counter::default(),
            pages_converted_total: Counter::default(),
            pages_failed_total: Counter::default(),
            page_fails_recorded_total: Counter::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "blocks_stored",
            "Total number of blocks written to the block store",
            metrics.blocks_stored_total.clone(),
        );
        sub_registry.register(
            "duplicate_blocks",
            "Total number of block inserts rejected as already stored",
            metrics.duplicate_blocks_total.clone(),
        );
        sub_registry.register(
            "artifact_blocks_skipped",
            "Total number of render artifacts dropped before storage",
            metrics.artifact_blocks_skipped_total.clone(),
        );
        sub_registry.register(
            "pages_converted",
            "Total number of source documents split into blocks",
            metrics.pages_converted_total.clone(),
        );
        sub_registry.register(
            "pages_failed",
            "Total number of source documents that failed an ingestion attempt",
            metrics.pages_failed_total.clone(),
        );
        sub_registry.register(
            "page_fails_recorded",
            "Total number of page-fail audit records written",
            metrics.page_fails_recorded_total.clone(),
        );
        metrics
    }
}

pub static INGEST_METRICS: OnceCell<IngestMetrics> = OnceCell::const_new();
