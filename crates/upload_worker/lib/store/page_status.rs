use super::db::{map_page_status_row, quote, quote_opt, require_non_empty, StoreDb};
use super::types::{PageStatus, PageStatusRecord, StoreError};

/// Records the latest pipeline state of a batch.
///
/// A `None` source location keeps whatever location was recorded earlier.
pub fn upsert_page_status<C>(
    conn: &mut C,
    batch_id: &str,
    source_location: Option<&str>,
    status: PageStatus,
    status_time_ms: i64,
) -> Result<(), StoreError>
where
    C: StoreDb,
{
    require_non_empty("batch_id", batch_id)?;

    let sql = format!(
        "INSERT INTO page_status (batch_id, source_location, status, status_time_ms) \
         VALUES ({}, {}, {}, {status_time_ms}) \
         ON CONFLICT (batch_id) DO UPDATE SET \
           status = excluded.status, \
           status_time_ms = excluded.status_time_ms, \
           source_location = COALESCE(excluded.source_location, page_status.source_location)",
        quote(batch_id),
        quote_opt(source_location),
        quote(status.as_db_str()),
    );
    conn.execute_sql(&sql)?;
    Ok(())
}

pub fn get_page_status<C>(
    conn: &mut C,
    batch_id: &str,
) -> Result<Option<PageStatusRecord>, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT batch_id, source_location, status, status_time_ms \
         FROM page_status WHERE batch_id = {} LIMIT 1",
        quote(batch_id)
    );
    conn.load_page_status(&sql)?
        .pop()
        .map(map_page_status_row)
        .transpose()
}

/// Records whose status time lies in `[start_ms, end_ms]`, most recent first.
pub fn list_page_status_between<C>(
    conn: &mut C,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<PageStatusRecord>, StoreError>
where
    C: StoreDb,
{
    if start_ms > end_ms {
        return Err(StoreError::InvalidInput(format!(
            "start ({start_ms}) must be <= end ({end_ms})"
        )));
    }

    let sql = format!(
        "SELECT batch_id, source_location, status, status_time_ms \
         FROM page_status \
         WHERE status_time_ms BETWEEN {start_ms} AND {end_ms} \
         ORDER BY status_time_ms DESC, batch_id ASC"
    );
    conn.load_page_status(&sql)?
        .into_iter()
        .map(map_page_status_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_test::setup_in_memory_sqlite;

    #[test]
    fn upsert_keeps_earlier_source_location() {
        let mut conn = setup_in_memory_sqlite();

        upsert_page_status(&mut conn, "b1", Some("wiki/A.md"), PageStatus::Stored, 100)
            .expect("upsert failed");
        upsert_page_status(&mut conn, "b1", None, PageStatus::Complete, 200)
            .expect("upsert failed");

        let record = get_page_status(&mut conn, "b1")
            .expect("lookup failed")
            .expect("record should exist");
        assert_eq!(record.source_location.as_deref(), Some("wiki/A.md"));
        assert_eq!(record.status, PageStatus::Complete);
        assert_eq!(record.status_time_ms, 200);
    }

    #[test]
    fn range_query_is_inclusive_and_newest_first() {
        let mut conn = setup_in_memory_sqlite();
        for (batch, time) in [("b1", 100), ("b2", 300), ("b3", 200), ("b4", 400)] {
            upsert_page_status(&mut conn, batch, None, PageStatus::Stored, time)
                .expect("upsert failed");
        }

        let batches: Vec<String> = list_page_status_between(&mut conn, 100, 300)
            .expect("range query failed")
            .into_iter()
            .map(|record| record.batch_id)
            .collect();
        assert_eq!(batches, vec!["b2", "b3", "b1"]);

        assert!(matches!(
            list_page_status_between(&mut conn, 5, 1),
            Err(StoreError::InvalidInput(_))
        ));
    }
}
