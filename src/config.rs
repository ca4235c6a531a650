//! Database configuration
//!
//! Resolves the database location and migrations directory from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::{DbError, DbResult};

/// Database file path (`:memory:` for an in-memory store)
pub const ENV_DATABASE_PATH: &str = "CRUDKIT_DATABASE_PATH";
/// Directory holding `.sql` migration files
pub const ENV_MIGRATIONS_DIR: &str = "CRUDKIT_MIGRATIONS_DIR";
/// Connection pool size
pub const ENV_MAX_CONNECTIONS: &str = "CRUDKIT_MAX_CONNECTIONS";
/// SQLite busy timeout in milliseconds
pub const ENV_BUSY_TIMEOUT_MS: &str = "CRUDKIT_BUSY_TIMEOUT_MS";

/// Path value that selects an in-memory store
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_MAX_CONNECTIONS: u32 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Settings needed to open the store and find its migrations
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub migrations_dir: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let root = project_root();
        Self {
            path: root.join("data").join("crudkit.db"),
            migrations_dir: root.join("database").join("migrations"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl DatabaseConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            config.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_MIGRATIONS_DIR) {
            config.migrations_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            let max: u32 = parse_number(ENV_MAX_CONNECTIONS, &raw)?;
            if max == 0 {
                return Err(DbError::Config(format!("{ENV_MAX_CONNECTIONS} must be at least 1")));
            }
            config.max_connections = max;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            let millis: u64 = parse_number(ENV_BUSY_TIMEOUT_MS, &raw)?;
            config.busy_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Configuration for an in-memory store
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> DbResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| DbError::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Directory the default paths are resolved against.
///
/// The executable's directory, or the project root when running from
/// `target/release` or `target/debug`.
fn project_root() -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));

    // Go up from target/release or target/debug to project root
    if path.ends_with("release") || path.ends_with("debug") {
        if let Some(parent) = path.parent() {
            if let Some(grandparent) = parent.parent() {
                path = grandparent.to_path_buf();
            }
        }
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::from_lookup(|_| None).unwrap();
        assert!(config.path.ends_with("data/crudkit.db"));
        assert!(config.migrations_dir.ends_with("database/migrations"));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(5000));
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_overrides() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[
            (ENV_DATABASE_PATH, "/tmp/app.db"),
            (ENV_MIGRATIONS_DIR, "/srv/migrations"),
            (ENV_MAX_CONNECTIONS, "4"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.path, PathBuf::from("/tmp/app.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("/srv/migrations"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_memory_path() {
        let config = DatabaseConfig::from_lookup(lookup_from(&[(ENV_DATABASE_PATH, ":memory:")])).unwrap();
        assert!(config.is_in_memory());
        assert!(DatabaseConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_rejects_zero_connections() {
        let err = DatabaseConfig::from_lookup(lookup_from(&[(ENV_MAX_CONNECTIONS, "0")])).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_rejects_garbage_timeout() {
        let err = DatabaseConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(err.to_string().contains(ENV_BUSY_TIMEOUT_MS));
    }
}
