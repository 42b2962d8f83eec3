use super::db::{map_page_mapping_row, now_ms, quote, require_non_empty, StoreDb};
use super::types::{PageMapping, StoreError};

pub fn get_page_mapping<C>(conn: &mut C, batch_id: &str) -> Result<Option<PageMapping>, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT batch_id, page_reference FROM page_mappings WHERE batch_id = {} LIMIT 1",
        quote(batch_id)
    );
    Ok(conn.load_page_mappings(&sql)?.pop().map(map_page_mapping_row))
}

/// Writes the mapping only when none exists for `batch_id`.
///
/// Returns `false` when another writer got there first; the existing mapping is kept.
pub fn insert_page_mapping_if_absent<C>(
    conn: &mut C,
    batch_id: &str,
    page_reference: &str,
) -> Result<bool, StoreError>
where
    C: StoreDb,
{
    require_non_empty("batch_id", batch_id)?;
    require_non_empty("page_reference", page_reference)?;

    let sql = format!(
        "INSERT INTO page_mappings (batch_id, page_reference, created_at_ms) \
         VALUES ({}, {}, {}) \
         ON CONFLICT (batch_id) DO NOTHING",
        quote(batch_id),
        quote(page_reference),
        now_ms(),
    );
    Ok(conn.execute_sql(&sql)? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_test::setup_in_memory_sqlite;

    #[test]
    fn first_writer_wins() {
        let mut conn = setup_in_memory_sqlite();

        assert!(get_page_mapping(&mut conn, "b1")
            .expect("lookup should succeed")
            .is_none());
        assert!(insert_page_mapping_if_absent(&mut conn, "b1", "page-a")
            .expect("first insert should succeed"));
        assert!(!insert_page_mapping_if_absent(&mut conn, "b1", "page-b")
            .expect("losing insert should not error"));

        let mapping = get_page_mapping(&mut conn, "b1")
            .expect("lookup should succeed")
            .expect("mapping should exist");
        assert_eq!(mapping.page_reference, "page-a");
    }

    #[test]
    fn empty_reference_is_rejected() {
        let mut conn = setup_in_memory_sqlite();
        assert!(matches!(
            insert_page_mapping_if_absent(&mut conn, "b1", ""),
            Err(StoreError::InvalidInput(_))
        ));
    }
}
