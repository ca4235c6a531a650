//! crudkit
//!
//! SQLite data accessor with equality-only CRUD helpers and a migration runner.

pub mod build_info;
pub mod config;
pub mod db;
pub mod models;
