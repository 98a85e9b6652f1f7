//! SQLite connection pool for the reference store

pub mod models;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::SqliteConnection;
use tracing::{debug, info};

use crate::types::TrackerError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open (or create) the file-backed pool and initialize the schema
pub fn open_pool(path: &Path, max_size: u32, busy_timeout_ms: u64) -> Result<DbPool, TrackerError> {
    info!("Opening SQLite database at {:?}", path);

    let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_millis(busy_timeout_ms.max(1000)))
        .connection_customizer(Box::new(ConnectionPragmas {
            busy_timeout_ms,
            wal: true,
        }))
        .build(manager)
        .map_err(|e| TrackerError::Database(format!("Failed to build SQLite pool: {}", e)))?;

    let mut conn = pool.get()?;
    schema::init_schema(&mut conn)?;

    Ok(pool)
}

/// Open an in-memory pool (for testing and dev mode).
///
/// Every `:memory:` connection is a separate database, so the pool holds
/// exactly one connection and never recycles it.
pub fn open_in_memory_pool() -> Result<DbPool, TrackerError> {
    debug!("Opening in-memory SQLite database");

    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_customizer(Box::new(ConnectionPragmas {
            busy_timeout_ms: 5000,
            wal: false,
        }))
        .build(manager)
        .map_err(|e| TrackerError::Database(format!("Failed to build SQLite pool: {}", e)))?;

    let mut conn = pool.get()?;
    schema::init_schema(&mut conn)?;

    Ok(pool)
}
