//! Durable pipeline state: blocks, page mappings, the distributed semaphore, page-fail audit
//! records and per-batch page status.
//!
//! Operations are synchronous and generic over `StoreDb`, so the same SQL runs against Postgres in
//! production and in-memory SQLite in tests. Async callers go through
//! `upload_service::StoreHandle`, which runs them on the blocking pool.

mod blocks;
mod db;
mod page_fails;
mod page_status;
mod pages;
mod semaphore;
mod types;

pub use blocks::{count_blocks, delete_block, list_blocks, put_block};
pub use db::StoreDb;
pub use page_fails::{insert_page_fail, list_page_fails};
pub use page_status::{get_page_status, list_page_status_between, upsert_page_status};
pub use pages::{get_page_mapping, insert_page_mapping_if_absent};
pub use semaphore::{
    ensure_semaphore, force_clear_owner, get_semaphore, reconcile_semaphore_count, release_slot,
    try_acquire_slot,
};
pub use types::{
    AcquireAttempt, ClearOutcome, PageFailRecord, PageMapping, PageStatus, PageStatusRecord,
    SemaphoreState, StoreError, StoredBlock,
};
