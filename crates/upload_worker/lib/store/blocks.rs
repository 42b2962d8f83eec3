use super::db::{map_block_row, now_ms, quote, require_non_empty, StoreDb};
use super::types::{StoreError, StoredBlock};

/// Stores one block under `(batch_id, block_index)`.
///
/// The insert is conditional on the key being absent. A second put for the same key fails with
/// `AlreadyExists` and leaves the first row untouched.
pub fn put_block<C>(conn: &mut C, block: &StoredBlock) -> Result<(), StoreError>
where
    C: StoreDb,
{
    require_non_empty("batch_id", &block.batch_id)?;
    if block.block_index < 0 {
        return Err(StoreError::InvalidInput(format!(
            "block_index must be >= 0, got {}",
            block.block_index
        )));
    }

    let sql = format!(
        "INSERT INTO blocks (batch_id, block_index, source_location, payload, created_at_ms) \
         VALUES ({}, {}, {}, {}, {}) \
         ON CONFLICT (batch_id, block_index) DO NOTHING",
        quote(&block.batch_id),
        block.block_index,
        quote(&block.source_location),
        quote(&block.payload),
        now_ms(),
    );

    if conn.execute_sql(&sql)? == 0 {
        return Err(StoreError::AlreadyExists {
            batch_id: block.batch_id.clone(),
            block_index: block.block_index,
        });
    }
    Ok(())
}

/// Lists up to `limit` remaining blocks of a batch in ascending index order.
pub fn list_blocks<C>(
    conn: &mut C,
    batch_id: &str,
    limit: i64,
) -> Result<Vec<StoredBlock>, StoreError>
where
    C: StoreDb,
{
    if limit <= 0 {
        return Err(StoreError::InvalidInput(format!(
            "limit must be > 0, got {limit}"
        )));
    }

    let sql = format!(
        "SELECT batch_id, block_index, source_location, payload \
         FROM blocks \
         WHERE batch_id = {} \
         ORDER BY block_index ASC \
         LIMIT {limit}",
        quote(batch_id),
    );

    Ok(conn
        .load_blocks(&sql)?
        .into_iter()
        .map(map_block_row)
        .collect())
}

/// Removes one block. Deleting an absent key is a no-op that returns `false`.
pub fn delete_block<C>(conn: &mut C, batch_id: &str, block_index: i64) -> Result<bool, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "DELETE FROM blocks WHERE batch_id = {} AND block_index = {block_index}",
        quote(batch_id),
    );
    Ok(conn.execute_sql(&sql)? > 0)
}

/// Number of blocks of a batch still waiting for upload.
pub fn count_blocks<C>(conn: &mut C, batch_id: &str) -> Result<i64, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT COUNT(*) AS count FROM blocks WHERE batch_id = {}",
        quote(batch_id)
    );
    Ok(conn.load_count(&sql)?)
}
