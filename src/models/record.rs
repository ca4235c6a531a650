//! Row mapping
//!
//! `FromRow` turns a result row into a caller type; `Record` is the untyped
//! fallback used when no mapped type is requested.

use rusqlite::types::Value;
use rusqlite::{Row, Statement};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Types that can be built from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A result row as ordered `(column, value)` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    /// Get a column value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Get an integer column (`None` if missing, NULL, or not an integer)
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get a real column, widening integers
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Real(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get a text column
    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The `id` column, if it is an integer
    pub fn id(&self) -> Option<i64> {
        self.get_i64("id")
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromRow for Record {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let stmt: &Statement<'_> = row.as_ref();
        let mut columns = Vec::with_capacity(stmt.column_count());
        for i in 0..stmt.column_count() {
            let name = stmt.column_name(i)?.to_string();
            let value: Value = row.get(i)?;
            columns.push((name, value));
        }
        Ok(Self { columns })
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Serializes as a JSON-style object; blobs become byte arrays.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            match value {
                Value::Null => map.serialize_entry(name, &())?,
                Value::Integer(n) => map.serialize_entry(name, n)?,
                Value::Real(n) => map.serialize_entry(name, n)?,
                Value::Text(s) => map.serialize_entry(name, s)?,
                Value::Blob(b) => map.serialize_entry(name, b)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn fetch(sql: &str) -> Record {
        let conn = Connection::open_in_memory().unwrap();
        conn.query_row(sql, [], Record::from_row).unwrap()
    }

    #[test]
    fn test_from_row_keeps_column_order() {
        let record = fetch("SELECT 1 AS id, 'tom' AS username, 2.5 AS score, NULL AS bio");

        let names: Vec<&str> = record.column_names().collect();
        assert_eq!(names, vec!["id", "username", "score", "bio"]);
        assert_eq!(record.id(), Some(1));
        assert_eq!(record.get_str("username"), Some("tom"));
        assert_eq!(record.get_f64("score"), Some(2.5));
        assert_eq!(record.get("bio"), Some(&Value::Null));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_typed_getters_do_not_coerce_text() {
        let record = fetch("SELECT '12' AS id");
        assert_eq!(record.id(), None);
        assert_eq!(record.get_str("id"), Some("12"));
    }

    #[test]
    fn test_serialize_as_object() {
        let record = fetch("SELECT 3 AS id, 'ann' AS name, NULL AS note");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": 3, "name": "ann", "note": null}));
    }
}
