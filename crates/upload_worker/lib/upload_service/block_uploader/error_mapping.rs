use std::error::Error as StdError;

use crate::staging::StagingError;
use crate::workspace_client::WorkspaceClientErr;
use wiki_core::PayloadError;

use super::super::types::{
    UploadError, UploadErrorKind, FAILURE_CLASS_HTTP_4XX, FAILURE_CLASS_NETWORK_TRANSIENT,
    FAILURE_CLASS_PARENT, FAILURE_CLASS_PAYLOAD, FAILURE_CLASS_SCHEMA, FAILURE_CLASS_SOURCE,
};

/// Remote call a failure came from. A 404 means different things per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    FetchParent,
    CreateChild,
    AppendBlock,
}

impl RemoteOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteOperation::FetchParent => "fetch_parent",
            RemoteOperation::CreateChild => "create_child",
            RemoteOperation::AppendBlock => "append_block",
        }
    }
}

pub fn map_workspace_error(error: WorkspaceClientErr, operation: RemoteOperation) -> UploadError {
    match error {
        WorkspaceClientErr::UnexpectedStatus {
            resource, status, ..
        } => map_status(operation, &resource, status),
        WorkspaceClientErr::InvalidReference(reference) => match operation {
            RemoteOperation::FetchParent => UploadError::new(
                UploadErrorKind::ParentNotFound,
                format!("parent reference `{reference}` does not name a workspace object"),
            )
            .with_failure_class(FAILURE_CLASS_PARENT),
            _ => UploadError::new(
                UploadErrorKind::Other,
                format!("invalid page reference `{reference}`"),
            )
            .with_failure_class(FAILURE_CLASS_SCHEMA),
        },
        WorkspaceClientErr::UnsupportedParent { id, block_type } => UploadError::new(
            UploadErrorKind::InvalidParent,
            format!("parent {id} is a `{block_type}`, not a page or a table"),
        )
        .with_failure_class(FAILURE_CLASS_PARENT),
        WorkspaceClientErr::InvalidToken => UploadError::new(
            UploadErrorKind::Unauthorized,
            "workspace API token is not a valid header value",
        )
        .with_failure_class(FAILURE_CLASS_HTTP_4XX),
        WorkspaceClientErr::RequestError(req_err) => map_reqwest_error(&req_err, operation),
    }
}

fn map_status(operation: RemoteOperation, resource: &str, status: u16) -> UploadError {
    let op = operation.as_str();
    match status {
        401 => UploadError::new(
            UploadErrorKind::Unauthorized,
            format!("{op}: unauthorized for {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_HTTP_4XX),
        403 => UploadError::new(
            UploadErrorKind::Forbidden,
            format!("{op}: forbidden for {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_HTTP_4XX),
        404 if operation == RemoteOperation::FetchParent => UploadError::new(
            UploadErrorKind::ParentNotFound,
            format!("{op}: {resource} not found"),
        )
        .with_failure_class(FAILURE_CLASS_PARENT),
        429 => UploadError::new(
            UploadErrorKind::RateLimited,
            format!("{op}: rate limited on {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_NETWORK_TRANSIENT),
        400..=499 => UploadError::new(
            UploadErrorKind::Other,
            format!("{op}: client error {status} for {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_HTTP_4XX),
        500..=599 => UploadError::new(
            UploadErrorKind::UpstreamUnavailable,
            format!("{op}: server error {status} for {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_NETWORK_TRANSIENT),
        _ => UploadError::new(
            UploadErrorKind::Other,
            format!("{op}: unexpected HTTP status {status} for {resource}"),
        )
        .with_failure_class(FAILURE_CLASS_SCHEMA),
    }
}

fn map_reqwest_error(req_err: &reqwest::Error, operation: RemoteOperation) -> UploadError {
    if let Some(status) = req_err.status() {
        return map_status(operation, "request", status.as_u16());
    }

    let chain = render_error_chain(req_err);
    tracing::debug!(
        event = "workspace_request_error_diagnostics",
        operation = operation.as_str(),
        reqwest_url = ?req_err.url().map(|url| url.as_str()),
        reqwest_is_timeout = req_err.is_timeout(),
        reqwest_is_connect = req_err.is_connect(),
        reqwest_is_decode = req_err.is_decode(),
        reqwest_error_chain = %chain,
        "captured reqwest diagnostics for workspace call"
    );

    if req_err.is_timeout() || req_err.is_connect() || req_err.is_request() || req_err.is_body() {
        return UploadError::new(
            UploadErrorKind::Network,
            format!("{}: transport error: {chain}", operation.as_str()),
        )
        .with_failure_class(FAILURE_CLASS_NETWORK_TRANSIENT);
    }

    UploadError::new(
        UploadErrorKind::MalformedResponse,
        format!("{}: unreadable response: {chain}", operation.as_str()),
    )
    .with_failure_class(FAILURE_CLASS_SCHEMA)
}

fn render_error_chain(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(next) = source {
        parts.push(next.to_string());
        source = next.source();
    }
    parts.join(" | caused_by: ")
}

pub fn map_payload_error(error: &PayloadError) -> UploadError {
    UploadError::new(
        UploadErrorKind::InvalidPayload,
        format!("stored block payload cannot be decoded: {error}"),
    )
    .with_failure_class(FAILURE_CLASS_PAYLOAD)
}

pub fn map_staging_error(error: &StagingError) -> UploadError {
    UploadError::new(
        UploadErrorKind::InvalidSource,
        format!("source document metadata unavailable: {error}"),
    )
    .with_failure_class(FAILURE_CLASS_SOURCE)
}

#[cfg(test)]
mod tests {
    use super::{map_workspace_error, RemoteOperation};
    use crate::upload_service::types::{UploadErrorKind, FAILURE_CLASS_PARENT};
    use crate::workspace_client::WorkspaceClientErr;

    fn status(status: u16) -> WorkspaceClientErr {
        WorkspaceClientErr::UnexpectedStatus {
            operation: "fetching",
            resource: "parent x".to_string(),
            status,
        }
    }

    #[test]
    fn not_found_is_parent_failure_only_for_parent_lookup() {
        let parent = map_workspace_error(status(404), RemoteOperation::FetchParent);
        assert_eq!(parent.kind, UploadErrorKind::ParentNotFound);
        assert_eq!(parent.failure_class, FAILURE_CLASS_PARENT);
        assert!(!parent.is_retryable());

        let append = map_workspace_error(status(404), RemoteOperation::AppendBlock);
        assert_eq!(append.kind, UploadErrorKind::Other);
    }

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        for code in [429u16, 500, 502, 503, 504] {
            let mapped = map_workspace_error(status(code), RemoteOperation::AppendBlock);
            assert!(mapped.is_retryable(), "status {code} should be retryable");
        }
        for code in [400u16, 401, 403, 409] {
            let mapped = map_workspace_error(status(code), RemoteOperation::AppendBlock);
            assert!(!mapped.is_retryable(), "status {code} should be fatal");
        }
    }

    #[test]
    fn unsupported_parent_is_invalid_parent() {
        let mapped = map_workspace_error(
            WorkspaceClientErr::UnsupportedParent {
                id: "abc".to_string(),
                block_type: "paragraph".to_string(),
            },
            RemoteOperation::FetchParent,
        );
        assert_eq!(mapped.kind, UploadErrorKind::InvalidParent);
    }

    #[test]
    fn malformed_parent_reference_is_parent_not_found() {
        let mapped = map_workspace_error(
            WorkspaceClientErr::InvalidReference("nope".to_string()),
            RemoteOperation::FetchParent,
        );
        assert_eq!(mapped.kind, UploadErrorKind::ParentNotFound);
    }
}
