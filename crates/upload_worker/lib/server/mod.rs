pub mod monitoring;
use crate::dashboard::{page_status_report, validate_range, DashboardTimezone, DASHBOARD_DOCS};
use crate::state::AppState;
use crate::upload_service::StoreHandle;
use prometheus_client::encoding::text::encode;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitoring::{INGEST_METRICS, UPLOAD_METRICS};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::error;

// Health endpoint handler
async fn health_handler() -> String {
    "Healthy".to_string()
}

async fn expose_metrics<S>(state: State<Arc<AppState<S>>>) -> Response
where
    S: Send + Sync + 'static,
{
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    match encode(&mut buffer, &registry) {
        Ok(()) => buffer.into_response(),
        Err(err) => {
            error!(event = "metrics_encode_failed", error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub tz_offset_minutes: Option<i32>,
    /// Present (any value) to get the widget description instead of data.
    pub describe: Option<String>,
}

async fn dashboard_handler<S>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<DashboardQuery>,
) -> Response
where
    S: StoreHandle,
{
    if query.describe.is_some() {
        return DASHBOARD_DOCS.into_response();
    }

    let (Some(start), Some(end)) = (query.start, query.end) else {
        return (
            StatusCode::BAD_REQUEST,
            "start and end (epoch milliseconds) are required",
        )
            .into_response();
    };
    let timezone = match validate_range(start, end)
        .and_then(|()| DashboardTimezone::from_offset_minutes(query.tz_offset_minutes))
    {
        Ok(timezone) => timezone,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    match page_status_report(&state.store, start, end, timezone).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!(
                event = "dashboard_query_failed",
                error = %err,
                error_debug = ?err,
                "page status query failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router<S>(state: Arc<AppState<S>>) -> Router
where
    S: StoreHandle,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics::<S>))
        .route("/dashboard/pages", get(dashboard_handler::<S>))
        .with_state(state)
}

/// Starts the health/metrics/dashboard HTTP server on the supplied socket address.
pub async fn setup_server_with_addr<S>(
    state: Arc<AppState<S>>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error>
where
    S: StoreHandle,
{
    let listener = TcpListener::bind(addr).await?;
    Ok(setup_server_with_listener(state, listener).await)
}

pub async fn setup_server_with_listener<S>(
    state: Arc<AppState<S>>,
    listener: TcpListener,
) -> tokio::task::JoinHandle<()>
where
    S: StoreHandle,
{
    {
        let mut registry = state.registry.write().await;

        UPLOAD_METRICS
            .get_or_init(|| async { monitoring::UploadMetrics::register(&mut registry, "upload") })
            .await;

        INGEST_METRICS
            .get_or_init(|| async { monitoring::IngestMetrics::register(&mut registry, "ingest") })
            .await;

        monitoring::register_build_info_metric(&mut registry, "worker");
    }

    let shutdown_token = state.shutdown_token.clone();
    let app = router(state);

    tokio::spawn(async move {
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await;
        if let Err(err) = served {
            error!(event = "http_server_failed", error = %err, "http server stopped with an error");
        }
    })
}
