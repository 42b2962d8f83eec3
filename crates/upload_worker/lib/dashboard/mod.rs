//! Read-only page-status report.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::store::{list_page_status_between, PageStatusRecord};
use crate::upload_service::{Error, StoreHandle};

pub const DASHBOARD_DOCS: &str = "## Page Upload Status\n\
Displays the status of pages being processed by the pipeline.\n\
\n\
This widget takes no parameters.";

const TIME_FORMAT: &str = "%b %d %H:%M:%S";
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DashboardError {
    #[error("timezone offset {0} minutes is out of range")]
    InvalidOffset(i32),
    #[error("time range start ({start}) is after end ({end})")]
    InvalidRange { start: i64, end: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardTimezone {
    Utc,
    /// Fixed offset east of UTC.
    Offset(FixedOffset),
}

impl DashboardTimezone {
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self, DashboardError> {
        match minutes {
            None | Some(0) => Ok(DashboardTimezone::Utc),
            Some(minutes) if minutes.abs() <= MAX_OFFSET_MINUTES => FixedOffset::east_opt(minutes * 60)
                .map(DashboardTimezone::Offset)
                .ok_or(DashboardError::InvalidOffset(minutes)),
            Some(minutes) => Err(DashboardError::InvalidOffset(minutes)),
        }
    }

    /// Formats epoch milliseconds at whole-second precision.
    pub fn format_ms(self, epoch_ms: i64) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp(epoch_ms.div_euclid(1000), 0) else {
            return epoch_ms.to_string();
        };
        match self {
            DashboardTimezone::Utc => utc.format(TIME_FORMAT).to_string(),
            DashboardTimezone::Offset(offset) => {
                utc.with_timezone(&offset).format(TIME_FORMAT).to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardResponse {
    pub markdown: String,
}

/// Renders records as a Markdown table, keeping the order they are given in.
pub fn render_page_status_report(records: &[PageStatusRecord], timezone: DashboardTimezone) -> String {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push("| Time | Page | Status".to_string());
    lines.push("|-----|-----|-----".to_string());
    for record in records {
        let page = record
            .source_location
            .as_deref()
            .unwrap_or(record.batch_id.as_str());
        lines.push(format!(
            "| {} | {} | {} |",
            timezone.format_ms(record.status_time_ms),
            page,
            record.status.as_db_str()
        ));
    }
    lines.join("\n")
}

/// Loads records with `start_ms <= status_time_ms <= end_ms`, most recent first, and renders them.
pub async fn page_status_report<S>(
    store: &S,
    start_ms: i64,
    end_ms: i64,
    timezone: DashboardTimezone,
) -> Result<DashboardResponse, Error>
where
    S: StoreHandle,
{
    let records = store
        .run(move |conn| Ok(list_page_status_between(conn, start_ms, end_ms)?))
        .await?;
    tracing::debug!(
        event = "dashboard_query",
        start_ms,
        end_ms,
        records = records.len(),
        "page status report built"
    );
    Ok(DashboardResponse {
        markdown: render_page_status_report(&records, timezone),
    })
}

pub fn validate_range(start_ms: i64, end_ms: i64) -> Result<(), DashboardError> {
    if start_ms > end_ms {
        return Err(DashboardError::InvalidRange {
            start: start_ms,
            end: end_ms,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        page_status_report, render_page_status_report, DashboardError, DashboardTimezone,
    };
    use crate::store::{upsert_page_status, PageStatus, PageStatusRecord};
    use crate::upload_service::SqliteStore;

    // 2024-01-02T03:04:05Z
    const T: i64 = 1_704_164_645_000;

    fn record(batch: &str, location: Option<&str>, status: PageStatus, ms: i64) -> PageStatusRecord {
        PageStatusRecord {
            batch_id: batch.to_string(),
            source_location: location.map(str::to_string),
            status,
            status_time_ms: ms,
        }
    }

    #[test]
    fn renders_header_and_rows() {
        let report = render_page_status_report(
            &[
                record("b2", Some("history/Rome.md"), PageStatus::Complete, T),
                record("b1", None, PageStatus::Stalled, T - 60_000),
            ],
            DashboardTimezone::Utc,
        );
        assert_eq!(
            report,
            "| Time | Page | Status\n\
             |-----|-----|-----\n\
             | Jan 02 03:04:05 | history/Rome.md | complete |\n\
             | Jan 02 03:03:05 | b1 | stalled |"
        );
    }

    #[test]
    fn offsets_shift_the_displayed_time() {
        let east = DashboardTimezone::from_offset_minutes(Some(90)).expect("valid offset");
        assert_eq!(east.format_ms(T), "Jan 02 04:34:05");
        let west = DashboardTimezone::from_offset_minutes(Some(-300)).expect("valid offset");
        assert_eq!(west.format_ms(T), "Jan 01 22:04:05");
        assert_eq!(
            DashboardTimezone::from_offset_minutes(Some(5000)),
            Err(DashboardError::InvalidOffset(5000))
        );
    }

    #[tokio::test]
    async fn query_filters_by_range_and_sorts_newest_first() {
        let store = SqliteStore::in_memory();
        store.with_conn(|conn| {
            upsert_page_status(conn, "old", Some("a.md"), PageStatus::Complete, T - 10_000)
                .expect("insert");
            upsert_page_status(conn, "new", Some("b.md"), PageStatus::Uploading, T)
                .expect("insert");
            upsert_page_status(conn, "outside", Some("c.md"), PageStatus::Failed, T + 10_000)
                .expect("insert");
        });

        let response = page_status_report(&store, T - 10_000, T, DashboardTimezone::Utc)
            .await
            .expect("report");
        let rows: Vec<&str> = response.markdown.lines().skip(2).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("b.md"));
        assert!(rows[1].contains("a.md"));
    }
}
