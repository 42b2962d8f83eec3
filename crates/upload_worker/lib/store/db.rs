use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::SqliteConnection;

use super::types::{
    PageFailRecord, PageMapping, PageStatus, PageStatusRecord, StoreError, StoredBlock,
};

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct BlockRow {
    #[diesel(sql_type = Text)]
    pub batch_id: String,
    #[diesel(sql_type = BigInt)]
    pub block_index: i64,
    #[diesel(sql_type = Text)]
    pub source_location: String,
    #[diesel(sql_type = Text)]
    pub payload: String,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct PageMappingRow {
    #[diesel(sql_type = Text)]
    pub batch_id: String,
    #[diesel(sql_type = Text)]
    pub page_reference: String,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct SemaphoreRow {
    #[diesel(sql_type = Text)]
    pub lock_name: String,
    #[diesel(sql_type = BigInt)]
    pub current_lock_count: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct OwnerRow {
    #[diesel(sql_type = Text)]
    pub owner_id: String,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct PageFailRow {
    #[diesel(sql_type = Text)]
    pub source_location: String,
    #[diesel(sql_type = BigInt)]
    pub event_time_ms: i64,
    #[diesel(sql_type = Text)]
    pub origin_container: String,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct PageStatusRow {
    #[diesel(sql_type = Text)]
    pub batch_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub source_location: Option<String>,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = BigInt)]
    pub status_time_ms: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

/// Synchronous connection surface shared by the Postgres runtime and SQLite tests.
///
/// Every store operation is written once against this trait with portable SQL.
#[doc(hidden)]
pub trait StoreDb {
    fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError>;
    fn load_blocks(&mut self, sql: &str) -> Result<Vec<BlockRow>, DieselError>;
    fn load_page_mappings(&mut self, sql: &str) -> Result<Vec<PageMappingRow>, DieselError>;
    fn load_semaphores(&mut self, sql: &str) -> Result<Vec<SemaphoreRow>, DieselError>;
    fn load_owners(&mut self, sql: &str) -> Result<Vec<OwnerRow>, DieselError>;
    fn load_page_fails(&mut self, sql: &str) -> Result<Vec<PageFailRow>, DieselError>;
    fn load_page_status(&mut self, sql: &str) -> Result<Vec<PageStatusRow>, DieselError>;
    fn load_count(&mut self, sql: &str) -> Result<i64, DieselError>;

    /// Runs `op` in one database transaction, rolling back when it returns `Err`.
    fn in_transaction<T, F>(&mut self, op: F) -> Result<T, StoreError>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, StoreError>;
}

macro_rules! impl_store_db {
    ($conn:ty) => {
        impl StoreDb for $conn {
            fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
                sql_query(sql).execute(self)
            }

            fn load_blocks(&mut self, sql: &str) -> Result<Vec<BlockRow>, DieselError> {
                sql_query(sql).load::<BlockRow>(self)
            }

            fn load_page_mappings(
                &mut self,
                sql: &str,
            ) -> Result<Vec<PageMappingRow>, DieselError> {
                sql_query(sql).load::<PageMappingRow>(self)
            }

            fn load_semaphores(&mut self, sql: &str) -> Result<Vec<SemaphoreRow>, DieselError> {
                sql_query(sql).load::<SemaphoreRow>(self)
            }

            fn load_owners(&mut self, sql: &str) -> Result<Vec<OwnerRow>, DieselError> {
                sql_query(sql).load::<OwnerRow>(self)
            }

            fn load_page_fails(&mut self, sql: &str) -> Result<Vec<PageFailRow>, DieselError> {
                sql_query(sql).load::<PageFailRow>(self)
            }

            fn load_page_status(
                &mut self,
                sql: &str,
            ) -> Result<Vec<PageStatusRow>, DieselError> {
                sql_query(sql).load::<PageStatusRow>(self)
            }

            fn load_count(&mut self, sql: &str) -> Result<i64, DieselError> {
                sql_query(sql).get_result::<CountRow>(self).map(|row| row.count)
            }

            fn in_transaction<T, F>(&mut self, op: F) -> Result<T, StoreError>
            where
                F: FnOnce(&mut Self) -> Result<T, StoreError>,
            {
                diesel::Connection::transaction(self, op)
            }
        }
    };
}

impl_store_db!(PgConnection);
impl_store_db!(SqliteConnection);

pub(crate) fn map_block_row(row: BlockRow) -> StoredBlock {
    StoredBlock {
        batch_id: row.batch_id,
        block_index: row.block_index,
        source_location: row.source_location,
        payload: row.payload,
    }
}

pub(crate) fn map_page_mapping_row(row: PageMappingRow) -> PageMapping {
    PageMapping {
        batch_id: row.batch_id,
        page_reference: row.page_reference,
    }
}

pub(crate) fn map_page_fail_row(row: PageFailRow) -> PageFailRecord {
    PageFailRecord {
        source_location: row.source_location,
        event_time_ms: row.event_time_ms,
        origin_container: row.origin_container,
    }
}

pub(crate) fn map_page_status_row(row: PageStatusRow) -> Result<PageStatusRecord, StoreError> {
    Ok(PageStatusRecord {
        batch_id: row.batch_id,
        source_location: row.source_location,
        status: PageStatus::from_db_str(&row.status)?,
        status_time_ms: row.status_time_ms,
    })
}

pub(crate) fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn quote_opt(value: Option<&str>) -> String {
    value.map(quote).unwrap_or_else(|| "NULL".to_string())
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
