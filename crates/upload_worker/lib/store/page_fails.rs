use super::db::{map_page_fail_row, quote, require_non_empty, StoreDb};
use super::types::{PageFailRecord, StoreError};

/// Appends one page-fail audit record.
///
/// Redelivery of the same `(source_location, event_time_ms)` is ignored and returns `false`.
pub fn insert_page_fail<C>(conn: &mut C, record: &PageFailRecord) -> Result<bool, StoreError>
where
    C: StoreDb,
{
    require_non_empty("source_location", &record.source_location)?;

    let sql = format!(
        "INSERT INTO page_fails (source_location, event_time_ms, origin_container) \
         VALUES ({}, {}, {}) \
         ON CONFLICT (source_location, event_time_ms) DO NOTHING",
        quote(&record.source_location),
        record.event_time_ms,
        quote(&record.origin_container),
    );
    Ok(conn.execute_sql(&sql)? > 0)
}

/// Lists the most recent page-fail records first.
pub fn list_page_fails<C>(conn: &mut C, limit: i64) -> Result<Vec<PageFailRecord>, StoreError>
where
    C: StoreDb,
{
    if limit <= 0 {
        return Err(StoreError::InvalidInput(format!(
            "limit must be > 0, got {limit}"
        )));
    }

    let sql = format!(
        "SELECT source_location, event_time_ms, origin_container \
         FROM page_fails \
         ORDER BY event_time_ms DESC, source_location ASC \
         LIMIT {limit}"
    );
    Ok(conn
        .load_page_fails(&sql)?
        .into_iter()
        .map(map_page_fail_row)
        .collect())
}
