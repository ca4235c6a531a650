//! Database connection management
//!
//! Owns the SQLite connection pool the CRUD helpers and migrations run on.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;
use tracing::debug;

use crate::config::DatabaseConfig;

/// Database error types
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Equality filter must name at least one column")]
    EmptyFilter,

    #[error("No columns to write")]
    EmptyFields,

    #[error("Update of {table} needs an id column")]
    MissingId { table: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration {0} is defined more than once")]
    DuplicateMigration(String),

    #[error("Migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Open a database file with default settings
    pub fn new<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        };
        Self::from_config(&config)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> DbResult<Self> {
        Self::from_config(&DatabaseConfig::in_memory())
    }

    /// Open the database described by `config`
    pub fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let busy_timeout = config.busy_timeout;

        let pool = if config.is_in_memory() {
            // Every connection to :memory: is a separate database, so keep exactly one alive.
            let manager = SqliteConnectionManager::memory()
                .with_init(move |conn| init_connection(conn, busy_timeout, false));
            Pool::builder()
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build(manager)?
        } else {
            let manager = SqliteConnectionManager::file(&config.path)
                .with_flags(
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI,
                )
                .with_init(move |conn| init_connection(conn, busy_timeout, true));
            Pool::builder()
                .max_size(config.max_connections)
                .build(manager)?
        };

        debug!(
            path = %config.path.display(),
            max_connections = pool.max_size(),
            "opened database"
        );

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Execute a closure with a database connection
    pub fn with_conn<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DbResult<T>,
    {
        let conn = self.get_conn()?;
        f(&conn)
    }

    /// Execute a closure with a mutable database connection (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DbResult<T>,
    {
        let mut conn = self.get_conn()?;
        f(&mut conn)
    }
}

fn init_connection(
    conn: &mut rusqlite::Connection,
    busy_timeout: Duration,
    file_backed: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if file_backed {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
    }
    Ok(())
}
