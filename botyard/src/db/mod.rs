//! Database layer for botyard.
//!
//! SQLite persistence for container records. [`SqliteContainersRepository`]
//! implements the [`ContainersRepository`](crate::repository::ContainersRepository)
//! boundary on top of the shared [`Database`] handle.

mod containers;
mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use botyard_shared::errors::{BotyardError, BotyardResult};

pub use containers::SqliteContainersRepository;

/// Helper macro to convert rusqlite errors to BotyardError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| BotyardError::Database(e.to_string()))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
///
/// Thread-safe via `parking_lot::Mutex`. Domain-specific stores
/// wrap this to provide their APIs.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> BotyardResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;

        // - WAL mode: readers (list/inspect) don't block the executor
        // - FULL sync: fsync after each transaction
        // - Busy timeout: bounded so a stuck writer surfaces as an error
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=10000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> BotyardResult<T>
    where
        F: FnOnce(&mut Connection) -> BotyardResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.conn();
            f(&mut conn)
        })
        .await
        .map_err(|e| BotyardError::Internal(format!("database task failed: {}", e)))?
    }

    /// Initialize database schema.
    ///
    /// New databases get the full schema; an existing database must already
    /// be at [`schema::SCHEMA_VERSION`].
    fn init_schema(conn: &Connection) -> BotyardResult<()> {
        db_err!(conn.execute_batch(schema::SCHEMA_VERSION_TABLE))?;

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => Self::apply_full_schema(conn)?,
            Some(v) if v == schema::SCHEMA_VERSION => {}
            Some(v) => {
                return Err(BotyardError::Database(format!(
                    "Schema version mismatch: database has v{}, process expects v{}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
        }

        Ok(())
    }

    /// Apply full schema for new database.
    fn apply_full_schema(conn: &Connection) -> BotyardResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let now = Utc::now().to_rfc3339();
        db_err!(conn.execute(
            "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
            rusqlite::params![schema::SCHEMA_VERSION, now],
        ))?;

        tracing::info!(
            "Initialized database schema version {}",
            schema::SCHEMA_VERSION
        );
        Ok(())
    }
}
