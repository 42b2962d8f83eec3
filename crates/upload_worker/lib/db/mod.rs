#[cfg(any(test, feature = "sqlite-tests"))]
pub use wiki_core::db::sqlite_test;

use diesel::pg::PgConnection;
use diesel::Connection;
use tracing::info;
use wiki_core::db::migrations::run_postgres_migrations;

use crate::upload_service::Error;

/// Opens one Postgres connection and applies any pending schema migrations.
pub fn migrate(db_url: &str) -> Result<(), Error> {
    let mut conn = PgConnection::establish(db_url)
        .map_err(|err| Error::ConnectError(format!("failed to connect to postgres: {err}")))?;
    let applied = run_postgres_migrations(&mut conn)
        .map_err(|err| Error::Migration(err.to_string()))?;

    info!(
        event = "migrations_applied",
        applied, "database schema is up to date"
    );
    Ok(())
}
