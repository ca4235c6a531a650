//! Build information module
//!
//! Package name, version and build time, shown before migration runs and in
//! `crudkit status --json`.

use serde::Serialize;

use crate::config::DatabaseConfig;

/// Build timestamp in ISO 8601 format
pub const BUILD_TIMESTAMP: &str = match option_env!("CRUDKIT_BUILD_TIMESTAMP") {
    Some(s) => s,
    None => "unknown",
};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Package description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build information structure for serialization
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub description: &'static str,
}

impl BuildInfo {
    /// Get the current build info
    pub fn current() -> Self {
        Self {
            name: NAME,
            version: VERSION,
            build_timestamp: BUILD_TIMESTAMP,
            description: DESCRIPTION,
        }
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::current()
    }
}

/// Lines of the banner shown before a migration run
pub fn banner_lines(config: &DatabaseConfig) -> Vec<String> {
    let info = BuildInfo::current();
    vec![
        format!("{} {} (built {})", info.name, info.version, info.build_timestamp),
        format!("database:   {}", config.path.display()),
        format!("migrations: {}", config.migrations_dir.display()),
    ]
}

/// Print the startup banner to stderr
pub fn print_startup_banner(config: &DatabaseConfig) {
    for line in banner_lines(config) {
        eprintln!("{}", line);
    }
}
