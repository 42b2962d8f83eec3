use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Barrier;
use wiki_core::{encode_block, RenderedBlock};

use super::super::types::{RetryPolicy, UploadError, UploaderConfig};
use super::WorkspaceWriter;
use crate::staging::{SourceCatalog, SourceDescriptor, StagingError};
use crate::store::{list_blocks, put_block, StoredBlock};
use crate::upload_service::SqliteStore;
use crate::workspace_client::ParentContainer;

pub(super) const PARENT_REFERENCE: &str = "https://www.notion.so/Wiki-0123456789abcdef0123456789abcdef";
pub(super) const SOURCE_LOCATION: &str = "history/Rome.md";

pub(super) fn test_uploader_config(max_attempts: u32, max_blocks: i64) -> UploaderConfig {
    UploaderConfig {
        max_blocks,
        retry_policy: zero_backoff(max_attempts),
        chunk_budget: Duration::from_secs(600),
    }
}

pub(super) fn zero_backoff(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        jitter: Duration::ZERO,
    }
}

pub(super) fn text_block(index: i64) -> RenderedBlock {
    RenderedBlock::Text {
        text: format!("block-{index}"),
    }
}

pub(super) fn seed_blocks(store: &SqliteStore, batch_id: &str, indices: &[i64]) {
    store.with_conn(|conn| {
        for &index in indices {
            let payload = encode_block(&text_block(index)).expect("fixture block should encode");
            put_block(
                conn,
                &StoredBlock {
                    batch_id: batch_id.to_string(),
                    block_index: index,
                    source_location: SOURCE_LOCATION.to_string(),
                    payload,
                },
            )
            .expect("fixture block should insert");
        }
    });
}

pub(super) fn remaining_indices(store: &SqliteStore, batch_id: &str) -> Vec<i64> {
    store.with_conn(|conn| {
        list_blocks(conn, batch_id, 1_000)
            .expect("list should succeed")
            .into_iter()
            .map(|block| block.block_index)
            .collect()
    })
}

/// Scripted workspace. Unscripted calls succeed.
#[derive(Default)]
pub(super) struct MockWorkspace {
    parent_outcomes: Mutex<VecDeque<Result<ParentContainer, UploadError>>>,
    create_outcomes: Mutex<VecDeque<Result<String, UploadError>>>,
    append_outcomes: Mutex<VecDeque<Result<(), UploadError>>>,
    create_barrier: Option<Barrier>,
    fetch_calls: Mutex<u32>,
    create_calls: Mutex<u32>,
    appended: Mutex<Vec<(String, RenderedBlock)>>,
    append_calls: Mutex<u32>,
}

impl MockWorkspace {
    pub(super) fn with_parent_outcomes(outcomes: Vec<Result<ParentContainer, UploadError>>) -> Self {
        Self {
            parent_outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(super) fn with_append_outcomes(outcomes: Vec<Result<(), UploadError>>) -> Self {
        Self {
            append_outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Holds every `create_child` until `parties` callers are inside it.
    pub(super) fn with_create_barrier(parties: usize) -> Self {
        Self {
            create_barrier: Some(Barrier::new(parties)),
            ..Self::default()
        }
    }

    pub(super) fn fetch_calls(&self) -> u32 {
        *self.fetch_calls.lock().expect("fetch_calls mutex poisoned")
    }

    pub(super) fn create_calls(&self) -> u32 {
        *self.create_calls.lock().expect("create_calls mutex poisoned")
    }

    pub(super) fn append_calls(&self) -> u32 {
        *self.append_calls.lock().expect("append_calls mutex poisoned")
    }

    pub(super) fn appended(&self) -> Vec<(String, RenderedBlock)> {
        self.appended.lock().expect("appended mutex poisoned").clone()
    }
}

impl WorkspaceWriter for MockWorkspace {
    fn fetch_parent<'a>(
        &'a self,
        _parent_reference: &'a str,
    ) -> BoxFuture<'a, Result<ParentContainer, UploadError>> {
        Box::pin(async move {
            *self.fetch_calls.lock().expect("fetch_calls mutex poisoned") += 1;
            self.parent_outcomes
                .lock()
                .expect("parent_outcomes mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(ParentContainer::Page {
                        id: "parent-page".to_string(),
                    })
                })
        })
    }

    fn create_child<'a>(
        &'a self,
        _parent: &'a ParentContainer,
        title: &'a str,
    ) -> BoxFuture<'a, Result<String, UploadError>> {
        Box::pin(async move {
            let call = {
                let mut calls = self.create_calls.lock().expect("create_calls mutex poisoned");
                *calls += 1;
                *calls
            };
            if let Some(barrier) = &self.create_barrier {
                barrier.wait().await;
            }
            self.create_outcomes
                .lock()
                .expect("create_outcomes mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(format!("{title}-page-{call}")))
        })
    }

    fn append_block<'a>(
        &'a self,
        page_reference: &'a str,
        block: &'a RenderedBlock,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            *self.append_calls.lock().expect("append_calls mutex poisoned") += 1;
            let next = self
                .append_outcomes
                .lock()
                .expect("append_outcomes mutex poisoned")
                .pop_front()
                .unwrap_or(Ok(()));
            if next.is_ok() {
                self.appended
                    .lock()
                    .expect("appended mutex poisoned")
                    .push((page_reference.to_string(), block.clone()));
            }
            next
        })
    }
}

pub(super) struct StaticCatalog {
    pub(super) descriptor: Option<SourceDescriptor>,
}

impl StaticCatalog {
    pub(super) fn rome() -> Self {
        Self {
            descriptor: Some(SourceDescriptor {
                title: "Rome".to_string(),
                parent_reference: PARENT_REFERENCE.to_string(),
            }),
        }
    }

    pub(super) fn missing() -> Self {
        Self { descriptor: None }
    }
}

impl SourceCatalog for StaticCatalog {
    fn describe<'a>(
        &'a self,
        source_location: &'a str,
    ) -> BoxFuture<'a, Result<SourceDescriptor, StagingError>> {
        Box::pin(async move {
            self.descriptor
                .clone()
                .ok_or_else(|| StagingError::MissingParent(source_location.to_string()))
        })
    }
}
