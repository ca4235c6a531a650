//! Database module
//!
//! SQLite connection pool, generic CRUD helpers, and the migration runner.

pub mod connection;
mod crud;
pub mod migrations;
pub mod query;

pub use connection::{Database, DbError, DbResult};
pub use migrations::{Migration, MigrationReport, Migrator};
pub use query::{ListOptions, OrderBy};
