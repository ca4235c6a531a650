//! Data models
//!
//! Column/value mappings passed into the CRUD helpers and the row types they return.

mod fields;
mod record;

pub use fields::Fields;
pub use record::{FromRow, Record};
