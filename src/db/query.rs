//! SQL construction for the CRUD helpers
//!
//! Table and column names are interpolated after validation; values are always
//! bound as named parameters (`:column`).

use rusqlite::types::{ToSql, Value};

use super::connection::{DbError, DbResult};
use crate::models::Fields;

/// Rows returned by `find_all` when no limit is given
pub const DEFAULT_LIMIT: u32 = 100;

/// Column holding the row identifier for `update` and `delete`
pub const ID_COLUMN: &str = "id";

/// A statement and its named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Query {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, column: &str, value: &Value) -> String {
        let name = format!(":{}", column);
        self.params.push((name.clone(), value.clone()));
        name
    }

    /// Parameters in the shape `Statement::execute` and `query_map` accept
    pub fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

/// Sort order for `find_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    /// 1-based position in the select list (`ORDER BY 1`)
    Position(u32),
    Asc(String),
    Desc(String),
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy::Asc(column.into())
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy::Desc(column.into())
    }

    fn to_sql(&self) -> DbResult<String> {
        match self {
            OrderBy::Position(0) => Err(DbError::InvalidIdentifier("0".to_string())),
            OrderBy::Position(n) => Ok(n.to_string()),
            OrderBy::Asc(column) => Ok(format!("{} ASC", validate_column(column)?)),
            OrderBy::Desc(column) => Ok(format!("{} DESC", validate_column(column)?)),
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        OrderBy::Position(1)
    }
}

/// Ordering and paging for `find_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub order_by: OrderBy,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            order_by: OrderBy::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl ListOptions {
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a column name: `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_column(name: &str) -> DbResult<&str> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// Check a table name: a column-style identifier, optionally `schema.table`
pub fn validate_table(name: &str) -> DbResult<&str> {
    let valid = match name.split_once('.') {
        Some((schema, table)) => is_identifier(schema) && is_identifier(table),
        None => is_identifier(name),
    };
    if valid {
        Ok(name)
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

/// `a = :a AND b = :b`
fn where_clause(query: &mut Query, filter: &Fields) -> DbResult<String> {
    let mut parts = Vec::with_capacity(filter.len());
    for (column, value) in filter.iter() {
        let column = validate_column(column)?;
        let placeholder = query.bind(column, value);
        parts.push(format!("{} = {}", column, placeholder));
    }
    Ok(parts.join(" AND "))
}

/// `SELECT * FROM table WHERE ... LIMIT 1`
pub fn select_one(table: &str, filter: &Fields) -> DbResult<Query> {
    let table = validate_table(table)?;
    if filter.is_empty() {
        return Err(DbError::EmptyFilter);
    }

    let mut q = Query::new(String::new());
    let conditions = where_clause(&mut q, filter)?;
    q.sql = format!("SELECT * FROM {} WHERE {} LIMIT 1", table, conditions);
    Ok(q)
}

/// `SELECT * FROM table [WHERE ...] ORDER BY ... LIMIT n OFFSET m`
pub fn select_list(table: &str, filter: &Fields, options: &ListOptions) -> DbResult<Query> {
    let table = validate_table(table)?;
    let order = options.order_by.to_sql()?;

    let mut q = Query::new(String::new());
    let where_sql = if filter.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_clause(&mut q, filter)?)
    };

    q.sql = format!(
        "SELECT * FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        table, where_sql, order, options.limit, options.offset
    );
    Ok(q)
}

/// `INSERT INTO table (a, b) VALUES (:a, :b)`, or `DEFAULT VALUES` for an empty mapping
pub fn insert(table: &str, data: &Fields) -> DbResult<Query> {
    let table = validate_table(table)?;
    if data.is_empty() {
        return Ok(Query::new(format!("INSERT INTO {} DEFAULT VALUES", table)));
    }

    let mut q = Query::new(String::new());
    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    for (column, value) in data.iter() {
        let column = validate_column(column)?;
        placeholders.push(q.bind(column, value));
        columns.push(column);
    }

    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(q)
}

/// `UPDATE table SET a = :a WHERE id = :id`, the id taken from `data`
pub fn update(table: &str, data: &Fields) -> DbResult<Query> {
    let table = validate_table(table)?;
    let id = data.get(ID_COLUMN).ok_or_else(|| DbError::MissingId {
        table: table.to_string(),
    })?;

    let mut q = Query::new(String::new());
    let mut sets = Vec::with_capacity(data.len());
    for (column, value) in data.iter().filter(|(column, _)| *column != ID_COLUMN) {
        let column = validate_column(column)?;
        let placeholder = q.bind(column, value);
        sets.push(format!("{} = {}", column, placeholder));
    }
    if sets.is_empty() {
        return Err(DbError::EmptyFields);
    }

    let id_placeholder = q.bind(ID_COLUMN, id);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table,
        sets.join(", "),
        ID_COLUMN,
        id_placeholder
    );
    Ok(q)
}

/// `DELETE FROM table WHERE id = :id`
pub fn delete(table: &str, id: i64) -> DbResult<Query> {
    let table = validate_table(table)?;
    let mut q = Query::new(String::new());
    let id_placeholder = q.bind(ID_COLUMN, &Value::Integer(id));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", table, ID_COLUMN, id_placeholder);
    Ok(q)
}
