//! Database migrations
//!
//! Applies `.sql` files from the migrations directory (and migrations registered
//! in code) exactly once each, in name order, recording every applied name in the
//! `migrations` table.
//!
//! Each migration runs inside the transaction that records it, so a migration
//! file must not contain its own `BEGIN`/`COMMIT`; SQLite rejects the nested
//! transaction and the migration fails.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use super::connection::{Database, DbError, DbResult};
use crate::config::DatabaseConfig;
use crate::models::FromRow;

/// Extension of migration files picked up from the migrations directory
pub const MIGRATION_EXTENSION: &str = "sql";

/// Format SQLite's `datetime('now')` produces
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A versioned schema change, identified by its name
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the change. Runs inside the transaction that records the migration,
    /// so it must not open or commit a transaction itself.
    fn up(&self, conn: &Connection) -> DbResult<()>;
}

/// A `.sql` file from the migrations directory; its name is the file name
#[derive(Debug, Clone)]
pub struct SqlFileMigration {
    name: String,
    path: PathBuf,
}

impl SqlFileMigration {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Migration for SqlFileMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, conn: &Connection) -> DbResult<()> {
        let sql = fs::read_to_string(&self.path).map_err(|source| DbError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        conn.execute_batch(&sql)?;
        Ok(())
    }
}

/// One row of the `migrations` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub migration: String,
    pub created_at: NaiveDateTime,
}

impl FromRow for MigrationRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: String = row.get("created_at")?;
        let created_at = NaiveDateTime::parse_from_str(&created_at, SQLITE_DATETIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        Ok(Self {
            id: row.get("id")?,
            migration: row.get("migration")?,
            created_at,
        })
    }
}

/// Result of a migration run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Names applied by this run, in order
    pub applied: Vec<String>,
}

/// Applied and pending migrations
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<String>,
}

/// Finds migrations and brings a database up to date
pub struct Migrator {
    dir: Option<PathBuf>,
    registered: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Runner for the `.sql` files in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            registered: Vec::new(),
        }
    }

    /// Runner that only knows migrations registered in code
    pub fn without_directory() -> Self {
        Self {
            dir: None,
            registered: Vec::new(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.migrations_dir)
    }

    /// Add a migration defined in code. It is ordered by name together with the files.
    pub fn register(mut self, migration: impl Migration + 'static) -> Self {
        self.registered.push(Box::new(migration));
        self
    }

    /// The `.sql` files of the migrations directory, sorted by file name
    pub fn discover(&self) -> DbResult<Vec<SqlFileMigration>> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };

        let io_err = |source: std::io::Error| DbError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %path.display(), "skipping non UTF-8 file name");
                continue;
            };
            let is_sql = path.extension().and_then(|ext| ext.to_str()) == Some(MIGRATION_EXTENSION);
            if !is_sql || name.starts_with('.') {
                debug!(entry = %name, "skipping migrations directory entry");
                continue;
            }
            // metadata() follows symlinks; a dangling link is an error, not a skip.
            let metadata = fs::metadata(&path).map_err(|source| DbError::Io {
                path: path.display().to_string(),
                source,
            })?;
            if !metadata.is_file() {
                debug!(entry = %name, "skipping migrations directory entry");
                continue;
            }

            files.push(SqlFileMigration { name, path });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Every known migration in application order
    fn plan<'a>(&'a self, files: &'a [SqlFileMigration]) -> DbResult<Vec<&'a dyn Migration>> {
        let mut all: Vec<&'a dyn Migration> = Vec::with_capacity(files.len() + self.registered.len());
        for migration in files {
            all.push(migration);
        }
        for migration in &self.registered {
            all.push(&**migration);
        }
        all.sort_by(|a, b| a.name().cmp(b.name()));

        for pair in all.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(DbError::DuplicateMigration(pair[0].name().to_string()));
            }
        }
        Ok(all)
    }

    /// Names that `run` would apply, in order
    pub fn pending(&self, conn: &Connection) -> DbResult<Vec<String>> {
        let files = self.discover()?;
        let plan = self.plan(&files)?;
        let applied = applied_names(conn)?;

        Ok(plan
            .into_iter()
            .map(|m| m.name())
            .filter(|name| !applied.contains(*name))
            .map(str::to_string)
            .collect())
    }

    /// Check if the database needs migration
    pub fn needs_migration(&self, conn: &Connection) -> DbResult<bool> {
        Ok(!self.pending(conn)?.is_empty())
    }

    /// Applied and pending migrations of `db`
    pub fn status(&self, db: &Database) -> DbResult<MigrationStatus> {
        db.with_conn(|conn| {
            Ok(MigrationStatus {
                applied: applied(conn)?,
                pending: self.pending(conn)?,
            })
        })
    }

    /// Apply every pending migration.
    ///
    /// Each migration and its record commit together. On failure the failing
    /// migration is rolled back and the run stops; earlier ones stay applied.
    pub fn run(&self, db: &Database) -> DbResult<MigrationReport> {
        let files = self.discover()?;
        let plan = self.plan(&files)?;

        db.with_conn_mut(|conn| {
            ensure_migrations_table(conn)?;
            let already_applied = applied_names(conn)?;

            let mut report = MigrationReport::default();
            for migration in plan {
                if already_applied.contains(migration.name()) {
                    continue;
                }
                if apply(conn, migration)? {
                    info!("applied migration {}", migration.name());
                    report.applied.push(migration.name().to_string());
                } else {
                    debug!(migration = migration.name(), "applied concurrently, skipping");
                }
            }

            if report.applied.is_empty() {
                info!("all migrations are applied");
            }
            Ok(report)
        })
    }
}

/// Apply one migration and record it. Returns `false` if it was already recorded.
fn apply(conn: &mut Connection, migration: &dyn Migration) -> DbResult<bool> {
    let name = migration.name();
    // IMMEDIATE takes the write lock up front, so concurrent runners queue here.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if is_recorded(&tx, name)? {
        return Ok(false);
    }

    migration.up(&tx).map_err(|source| DbError::Migration {
        name: name.to_string(),
        source: Box::new(source),
    })?;
    tx.execute("INSERT INTO migrations (migration) VALUES (?1)", params![name])?;
    tx.commit()?;

    Ok(true)
}

/// Create the `migrations` table if it doesn't exist
pub fn ensure_migrations_table(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            migration TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

fn migrations_table_exists(conn: &Connection) -> DbResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'migrations')",
        [],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn is_recorded(conn: &Connection, name: &str) -> DbResult<bool> {
    let recorded: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE migration = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(recorded)
}

/// Applied migrations in the order they were applied (empty before the first run)
pub fn applied(conn: &Connection) -> DbResult<Vec<MigrationRecord>> {
    if !migrations_table_exists(conn)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT id, migration, created_at FROM migrations ORDER BY id")?;
    let records = stmt
        .query_map([], MigrationRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn applied_names(conn: &Connection) -> DbResult<HashSet<String>> {
    if !migrations_table_exists(conn)? {
        return Ok(HashSet::new());
    }

    let mut stmt = conn.prepare("SELECT migration FROM migrations")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(names)
}
