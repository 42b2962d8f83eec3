use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use wiki_core::RenderedBlock;

use super::convert::block_to_json;
use super::{object_id_from_reference, ParentContainer};

pub const DEFAULT_API_VERSION: &str = "2022-06-28";
pub const DEFAULT_TABLE_TITLE_PROPERTY: &str = "Name";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum WorkspaceClientErr {
    #[error("invalid workspace reference: {0}")]
    InvalidReference(String),
    #[error("unexpected HTTP status while {operation} {resource}: {status}")]
    UnexpectedStatus {
        operation: &'static str,
        resource: String,
        status: u16,
    },
    #[error("block {id} is a `{block_type}`, not a page or a table")]
    UnsupportedParent { id: String, block_type: String },
    #[error("invalid API token header value")]
    InvalidToken,
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct BlockObject {
    id: String,
    #[serde(rename = "type")]
    block_type: String,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
}

/// Thin REST client for the destination workspace API.
///
/// One instance is built at process start and shared by reference; it holds no per-call state.
pub struct WorkspaceClient {
    client: reqwest::Client,
    base_url: String,
    table_title_property: String,
}

impl WorkspaceClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        api_version: &str,
        table_title_property: impl Into<String>,
    ) -> Result<Self, WorkspaceClientErr> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| WorkspaceClientErr::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            "notion-version",
            HeaderValue::from_str(api_version).map_err(|_| WorkspaceClientErr::InvalidToken)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table_title_property: table_title_property.into(),
        })
    }

    /// Looks up the container behind `reference` and classifies it.
    pub async fn fetch_parent(
        &self,
        reference: &str,
    ) -> Result<ParentContainer, WorkspaceClientErr> {
        let id = object_id_from_reference(reference)
            .ok_or_else(|| WorkspaceClientErr::InvalidReference(reference.to_string()))?;
        let url = format!("{}/blocks/{id}", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(WorkspaceClientErr::UnexpectedStatus {
                operation: "fetching",
                resource: format!("parent {id}"),
                status: response.status().as_u16(),
            });
        }

        let block = response.json::<BlockObject>().await?;
        match block.block_type.as_str() {
            "child_page" => Ok(ParentContainer::Page { id: block.id }),
            "child_database" => Ok(ParentContainer::Table { id: block.id }),
            _ => Err(WorkspaceClientErr::UnsupportedParent {
                id: block.id,
                block_type: block.block_type,
            }),
        }
    }

    /// Creates a page titled `title` under `parent` and returns the new page id.
    pub async fn create_page(
        &self,
        parent: &ParentContainer,
        title: &str,
    ) -> Result<String, WorkspaceClientErr> {
        let url = format!("{}/pages", self.base_url);
        let body = parent.child_page_request(title, &self.table_title_property);
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(WorkspaceClientErr::UnexpectedStatus {
                operation: "creating page under",
                resource: parent.id().to_string(),
                status: response.status().as_u16(),
            });
        }

        let page = response.json::<PageObject>().await?;
        debug!(
            event = "workspace_page_created",
            parent_id = parent.id(),
            page_id = %page.id,
            "created destination page"
        );
        Ok(page.id)
    }

    /// Appends one block to the end of `page_reference`.
    pub async fn append_block(
        &self,
        page_reference: &str,
        block: &RenderedBlock,
    ) -> Result<(), WorkspaceClientErr> {
        let id = object_id_from_reference(page_reference)
            .ok_or_else(|| WorkspaceClientErr::InvalidReference(page_reference.to_string()))?;
        let url = format!("{}/blocks/{id}/children", self.base_url);
        let body = serde_json::json!({ "children": [block_to_json(block)] });
        let response = self.client.patch(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(WorkspaceClientErr::UnexpectedStatus {
                operation: "appending block to",
                resource: format!("page {id}"),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
