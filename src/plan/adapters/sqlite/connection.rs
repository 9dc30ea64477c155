//! Connection pooling and per-connection configuration for `SQLite`.

use super::schema::SCHEMA_SQL;
use crate::plan::ports::{StoreError, StoreResult};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use std::path::Path;
use std::time::Duration;

/// `SQLite` connection pool type used by the plan store.
pub type PlanSqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Applies durability pragmas to every pooled connection.
///
/// WAL lets readers proceed while one writer commits; the busy timeout
/// makes competing `BEGIN IMMEDIATE` writers queue instead of failing.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let pragmas = format!(
            "PRAGMA busy_timeout = {}; \
             PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        );
        connection
            .batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Opens a pool for the database file at `path` and applies the schema.
///
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns [`StoreError::Persistence`] when the directory, pool or schema
/// cannot be created.
pub fn open_pool(path: &Path) -> StoreResult<PlanSqlitePool> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(StoreError::persistence)?;
    }

    let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
    let pool = Pool::builder()
        .max_size(DEFAULT_POOL_SIZE)
        .connection_customizer(Box::new(ConnectionPragmas {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }))
        .build(manager)
        .map_err(StoreError::persistence)?;

    let mut connection = pool.get().map_err(StoreError::persistence)?;
    connection
        .batch_execute(SCHEMA_SQL)
        .map_err(StoreError::persistence)?;
    Ok(pool)
}
