//! Generic CRUD helpers
//!
//! Equality-only find/list/create/update/delete on any table. Each call checks out
//! one connection and issues exactly one statement.

use tracing::debug;

use super::connection::{Database, DbResult};
use super::query::{self, ListOptions, Query};
use crate::models::{Fields, FromRow};

impl Database {
    /// Fetch the first row of `table` matching every `(column, value)` in `filter`.
    ///
    /// Use `Record` as `T` for an untyped row.
    pub fn find<T: FromRow>(&self, table: &str, filter: &Fields) -> DbResult<Option<T>> {
        let q = query::select_one(table, filter)?;
        debug!(sql = %q.sql, "find");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&q.sql)?;
            let params = q.named_params();
            let result = stmt.query_row(params.as_slice(), T::from_row);
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Fetch the rows of `table` matching `filter` (all rows if empty), ordered and paged by `options`
    pub fn find_all<T: FromRow>(
        &self,
        table: &str,
        filter: &Fields,
        options: &ListOptions,
    ) -> DbResult<Vec<T>> {
        let q = query::select_list(table, filter, options)?;
        debug!(sql = %q.sql, "find_all");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&q.sql)?;
            let params = q.named_params();
            let rows = stmt
                .query_map(params.as_slice(), T::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Insert a row and return its generated id
    pub fn create(&self, table: &str, data: &Fields) -> DbResult<i64> {
        let q = query::insert(table, data)?;
        debug!(sql = %q.sql, "create");

        self.with_conn(|conn| {
            execute(conn, &q)?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update the row whose id is `data["id"]` with the remaining columns.
    ///
    /// Returns `false` when no row has that id.
    pub fn update(&self, table: &str, data: &Fields) -> DbResult<bool> {
        let q = query::update(table, data)?;
        debug!(sql = %q.sql, "update");

        self.with_conn(|conn| Ok(execute(conn, &q)? > 0))
    }

    /// Delete the row with `id`.
    ///
    /// Returns `false` when no row has that id.
    pub fn delete(&self, table: &str, id: i64) -> DbResult<bool> {
        let q = query::delete(table, id)?;
        debug!(sql = %q.sql, "delete");

        self.with_conn(|conn| Ok(execute(conn, &q)? > 0))
    }
}

fn execute(conn: &rusqlite::Connection, q: &Query) -> DbResult<usize> {
    let mut stmt = conn.prepare(&q.sql)?;
    let params = q.named_params();
    Ok(stmt.execute(params.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::OrderBy;
    use crate::db::DbError;
    use crate::models::Record;
    use rusqlite::types::Value;
    use rusqlite::Row;

    #[derive(Debug, PartialEq)]
    struct User {
        id: i64,
        username: String,
        email: Option<String>,
    }

    impl FromRow for User {
        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                username: row.get("username")?,
                email: row.get("email")?,
            })
        }
    }

    fn setup() -> Database {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT,
                    role TEXT NOT NULL DEFAULT 'member'
                )",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn user(username: &str, email: &str) -> Fields {
        Fields::new()
            .with("username", username.to_string())
            .with("email", email.to_string())
    }

    #[test]
    fn test_create_then_find() {
        let db = setup();
        let id = db.create("users", &user("tom", "tom@example.com")).unwrap();
        assert!(id > 0);

        let found: Record = db
            .find("users", &Fields::new().with("username", "tom".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), Some(id));
        assert_eq!(found.get_str("username"), Some("tom"));
        assert_eq!(found.get_str("email"), Some("tom@example.com"));
        assert_eq!(found.get_str("role"), Some("member"));
    }

    #[test]
    fn test_find_into_mapped_type() {
        let db = setup();
        let id = db.create("users", &user("ann", "ann@example.com")).unwrap();

        let found: Option<User> = db.find("users", &Fields::new().with("id", id)).unwrap();
        assert_eq!(
            found,
            Some(User {
                id,
                username: "ann".to_string(),
                email: Some("ann@example.com".to_string()),
            })
        );
    }

    #[test]
    fn test_find_matches_every_column() {
        let db = setup();
        db.create("users", &user("tom", "tom@example.com")).unwrap();

        let filter = Fields::new()
            .with("username", "tom".to_string())
            .with("email", "someone-else@example.com".to_string());
        let found: Option<Record> = db.find("users", &filter).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_find_missing_returns_none() {
        let db = setup();
        let found: Option<Record> = db.find("users", &Fields::new().with("id", 42i64)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_find_all_filters_orders_and_pages() {
        let db = setup();
        for name in ["carol", "alice", "bob", "dave"] {
            let mut data = user(name, &format!("{name}@example.com"));
            if name != "dave" {
                data.set("role", "admin".to_string());
            }
            db.create("users", &data).unwrap();
        }

        let admins = Fields::new().with("role", "admin".to_string());
        let options = ListOptions::default().order_by(OrderBy::asc("username"));
        let rows: Vec<User> = db.find_all("users", &admins, &options).unwrap();
        let names: Vec<&str> = rows.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);

        let options = ListOptions::default()
            .order_by(OrderBy::desc("username"))
            .limit(2)
            .offset(1);
        let rows: Vec<User> = db.find_all("users", &Fields::new(), &options).unwrap();
        let names: Vec<&str> = rows.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["carol", "bob"]);
    }

    #[test]
    fn test_find_all_default_order_is_first_column() {
        let db = setup();
        let first = db.create("users", &user("zed", "z@example.com")).unwrap();
        let second = db.create("users", &user("amy", "a@example.com")).unwrap();

        let rows: Vec<Record> = db
            .find_all("users", &Fields::new(), &ListOptions::default())
            .unwrap();
        let ids: Vec<i64> = rows.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_find_all_empty_table() {
        let db = setup();
        let rows: Vec<Record> = db
            .find_all("users", &Fields::new(), &ListOptions::default())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_update_changes_only_target_row() {
        let db = setup();
        let tom = db.create("users", &user("tom", "tom@example.com")).unwrap();
        let ann = db.create("users", &user("ann", "ann@example.com")).unwrap();

        let changed = db
            .update(
                "users",
                &Fields::new()
                    .with("id", tom)
                    .with("email", "tom@new.example.com".to_string()),
            )
            .unwrap();
        assert!(changed);

        let tom_row: User = db.find("users", &Fields::new().with("id", tom)).unwrap().unwrap();
        let ann_row: User = db.find("users", &Fields::new().with("id", ann)).unwrap().unwrap();
        assert_eq!(tom_row.email.as_deref(), Some("tom@new.example.com"));
        assert_eq!(tom_row.username, "tom");
        assert_eq!(ann_row.email.as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn test_update_from_fetched_record() {
        let db = setup();
        let id = db.create("users", &user("tom", "tom@example.com")).unwrap();

        let record: Record = db.find("users", &Fields::new().with("id", id)).unwrap().unwrap();
        let mut data = Fields::from(record);
        data.set("role", "admin".to_string());
        assert!(db.update("users", &data).unwrap());

        let record: Record = db.find("users", &Fields::new().with("id", id)).unwrap().unwrap();
        assert_eq!(record.get_str("role"), Some("admin"));
    }

    #[test]
    fn test_update_unknown_id_returns_false() {
        let db = setup();
        let data = Fields::new().with("id", 99i64).with("email", Value::Null);
        assert!(!db.update("users", &data).unwrap());
    }

    #[test]
    fn test_update_without_id_is_rejected() {
        let db = setup();
        let err = db.update("users", &user("tom", "x")).unwrap_err();
        assert!(matches!(err, DbError::MissingId { .. }));
    }

    #[test]
    fn test_delete_removes_exactly_one_row() {
        let db = setup();
        let tom = db.create("users", &user("tom", "tom@example.com")).unwrap();
        db.create("users", &user("ann", "ann@example.com")).unwrap();

        assert!(db.delete("users", tom).unwrap());
        assert!(!db.delete("users", tom).unwrap());

        let found: Option<Record> = db.find("users", &Fields::new().with("id", tom)).unwrap();
        assert!(found.is_none());
        let rest: Vec<Record> = db
            .find_all("users", &Fields::new(), &ListOptions::default())
            .unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_constraint_violation_surfaces_as_sqlite_error() {
        let db = setup();
        db.create("users", &user("tom", "a@example.com")).unwrap();
        let err = db.create("users", &user("tom", "b@example.com")).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[test]
    fn test_invalid_table_never_reaches_sqlite() {
        let db = setup();
        let err = db.delete("users; DROP TABLE users", 1).unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier(_)));

        // The table is still there.
        let rows: Vec<Record> = db
            .find_all("users", &Fields::new(), &ListOptions::default())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_create_with_default_values() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT NOT NULL DEFAULT 'ping')",
            )?;
            Ok(())
        })
        .unwrap();

        let id = db.create("events", &Fields::new()).unwrap();
        let row: Record = db.find("events", &Fields::new().with("id", id)).unwrap().unwrap();
        assert_eq!(row.get_str("kind"), Some("ping"));
    }
}
