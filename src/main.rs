//! crudkit
//!
//! Deploy-time migration tool for a crudkit database.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crudkit::build_info::{self, BuildInfo};
use crudkit::config::{DatabaseConfig, ENV_DATABASE_PATH, ENV_MIGRATIONS_DIR};
use crudkit::db::{Database, DbResult, Migrator};

#[derive(Parser)]
#[command(name = "crudkit")]
#[command(about = "Apply and inspect database migrations", version)]
struct Args {
    /// SQLite database file
    #[arg(long, global = true, env = ENV_DATABASE_PATH)]
    database: Option<PathBuf>,

    /// Directory of .sql migrations
    #[arg(long, global = true, env = ENV_MIGRATIONS_DIR)]
    migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations
    Migrate,
    /// List applied and pending migrations
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so `status --json` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crudkit=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = resolve_config(&args, |key| std::env::var(key).ok())?;

    // Ensure data directory exists
    if !config.is_in_memory() {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let database = Database::from_config(&config)?;
    let migrator = Migrator::from_config(&config);

    match args.command {
        Command::Migrate => {
            build_info::print_startup_banner(&config);

            let report = migrator.run(&database)?;
            for name in &report.applied {
                println!("applied {}", name);
            }
            println!("{} migration(s) applied", report.applied.len());
        }
        Command::Status { json } => {
            let status = migrator.status(&database)?;
            if json {
                let out = serde_json::json!({
                    "build": BuildInfo::current(),
                    "database": config.path.display().to_string(),
                    "applied": status.applied,
                    "pending": status.pending,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for record in &status.applied {
                    println!("applied  {}  {}", record.created_at, record.migration);
                }
                for name in &status.pending {
                    println!("pending  {}", name);
                }
                if status.pending.is_empty() {
                    println!("all migrations are applied");
                }
            }
        }
    }

    Ok(())
}

/// Environment settings with the command-line paths layered on top
fn resolve_config<F>(args: &Args, lookup: F) -> DbResult<DatabaseConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = DatabaseConfig::from_lookup(lookup)?;
    if let Some(path) = &args.database {
        config.path = path.clone();
    }
    if let Some(dir) = &args.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    Ok(config)
}
