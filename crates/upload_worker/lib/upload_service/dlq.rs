use chrono::{DateTime, NaiveDateTime};
use tracing::info;

use crate::server::monitoring::INGEST_METRICS;
use crate::store::{insert_page_fail, PageFailRecord};

use super::error::Error;
use super::store_handle::StoreHandle;
use super::types::ArrivalEvent;

const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Parses an arrival timestamp into epoch milliseconds.
///
/// The `Z`-suffixed form is what the staging location emits; any other RFC 3339 offset is
/// accepted as well.
pub fn parse_event_time_ms(raw: &str) -> Result<i64, Error> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, EVENT_TIME_FORMAT) {
        return Ok(naive.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.timestamp_millis())
        .map_err(|err| Error::InvalidEvent(format!("unparseable event_time `{raw}`: {err}")))
}

pub fn page_fail_record(event: &ArrivalEvent) -> Result<PageFailRecord, Error> {
    if event.source_location.is_empty() {
        return Err(Error::InvalidEvent(
            "failed arrival has no source_location".to_string(),
        ));
    }
    Ok(PageFailRecord {
        source_location: event.source_location.clone(),
        event_time_ms: parse_event_time_ms(&event.event_time)?,
        origin_container: event.origin_container.clone(),
    })
}

/// Dead-letter consumer: appends one audit record per failed arrival.
///
/// Redelivery of the same event hits the same key and writes nothing; returns `false` then.
pub async fn record_page_fail<S>(store: &S, event: &ArrivalEvent) -> Result<bool, Error>
where
    S: StoreHandle,
{
    let record = page_fail_record(event)?;
    let inserted = {
        let record = record.clone();
        store
            .run(move |conn| Ok(insert_page_fail(conn, &record)?))
            .await?
    };

    if inserted {
        if let Some(metrics) = INGEST_METRICS.get() {
            metrics.page_fails_recorded_total.inc();
        }
    }
    info!(
        event = "page_fail_recorded",
        source_location = %record.source_location,
        origin_container = %record.origin_container,
        event_time_ms = record.event_time_ms,
        duplicate = !inserted,
        "failed source document recorded for manual inspection"
    );
    Ok(inserted)
}
