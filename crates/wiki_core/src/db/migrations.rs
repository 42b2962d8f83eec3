use diesel::pg::PgConnection;
use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, FileBasedMigrations, MigrationError, MigrationHarness,
};

const SQLITE_TEST_MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sqlite_migrations");

/// Canonical Postgres migration set owned by `wiki_core`, embedded at build time so deployed
/// binaries do not depend on the source tree.
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Error returned by Diesel's migration harness.
pub type MigrationRunError = Box<dyn std::error::Error + Send + Sync>;

/// Loads the SQLite parity migration set used by DB-backed tests.
///
/// The SQLite migration stream mirrors the Postgres schema shape so store operations can be
/// validated without a live Postgres instance.
pub fn sqlite_test_migrations() -> Result<FileBasedMigrations, MigrationError> {
    FileBasedMigrations::from_path(SQLITE_TEST_MIGRATIONS_DIR)
}

/// Runs all pending Postgres migrations against an open connection.
///
/// Returns the number of migrations applied in this call.
pub fn run_postgres_migrations(conn: &mut PgConnection) -> Result<usize, MigrationRunError> {
    let applied = conn.run_pending_migrations(POSTGRES_MIGRATIONS)?;
    Ok(applied.len())
}
