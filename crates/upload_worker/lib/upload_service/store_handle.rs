use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::Connection;
use futures::future::BoxFuture;

use super::error::Error;
use crate::store::StoreDb;

/// Async entry point to the synchronous store.
///
/// Store operations are small control-plane statements. They run on Tokio's blocking pool so
/// runtime worker threads never wait on database I/O.
pub trait StoreHandle: Clone + Send + Sync + 'static {
    type Conn: StoreDb + Send;

    fn run<T, F>(&self, op: F) -> BoxFuture<'static, Result<T, Error>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Self::Conn) -> Result<T, Error> + Send + 'static;
}

/// Postgres-backed handle. Each operation opens its own connection.
#[derive(Debug, Clone)]
pub struct PgStore {
    db_url: Arc<str>,
}

impl PgStore {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: Arc::from(db_url.into()),
        }
    }
}

impl StoreHandle for PgStore {
    type Conn = PgConnection;

    fn run<T, F>(&self, op: F) -> BoxFuture<'static, Result<T, Error>>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, Error> + Send + 'static,
    {
        let db_url = self.db_url.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = PgConnection::establish(&db_url).map_err(|err| {
                    Error::ConnectError(format!("failed to connect to postgres: {err}"))
                })?;
                op(&mut conn)
            })
            .await?
        })
    }
}

#[cfg(any(test, feature = "sqlite-tests"))]
pub use sqlite::SqliteStore;

#[cfg(any(test, feature = "sqlite-tests"))]
mod sqlite {
    use std::sync::{Arc, Mutex};

    use diesel::sqlite::SqliteConnection;
    use futures::future::BoxFuture;

    use super::StoreHandle;
    use crate::db::sqlite_test::setup_in_memory_sqlite;
    use crate::upload_service::error::Error;

    /// Shared in-memory SQLite handle for tests. Operations are serialized by the mutex.
    #[derive(Clone)]
    pub struct SqliteStore {
        conn: Arc<Mutex<SqliteConnection>>,
    }

    impl SqliteStore {
        pub fn in_memory() -> Self {
            Self {
                conn: Arc::new(Mutex::new(setup_in_memory_sqlite())),
            }
        }

        /// Runs `op` synchronously on the calling thread, for test setup and assertions.
        pub fn with_conn<T>(&self, op: impl FnOnce(&mut SqliteConnection) -> T) -> T {
            let mut conn = self.conn.lock().expect("sqlite store mutex poisoned");
            op(&mut conn)
        }
    }

    impl StoreHandle for SqliteStore {
        type Conn = SqliteConnection;

        fn run<T, F>(&self, op: F) -> BoxFuture<'static, Result<T, Error>>
        where
            T: Send + 'static,
            F: FnOnce(&mut SqliteConnection) -> Result<T, Error> + Send + 'static,
        {
            let conn = self.conn.clone();
            Box::pin(async move {
                tokio::task::spawn_blocking(move || {
                    let mut guard = conn.lock().map_err(|_| {
                        Error::ConnectError("sqlite store mutex poisoned".to_string())
                    })?;
                    op(&mut guard)
                })
                .await?
            })
        }
    }
}
