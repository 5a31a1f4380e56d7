//! Generic SQLite store adapter
//!
//! A minimal wrapper over rusqlite exposing what the indexer needs:
//! live schema reflection, dynamic column addition and removal,
//! parametrized query construction, and depth-counted transaction
//! control. Nothing in this module knows about DICOM.
//!
//! # Transactions
//!
//! Write operations happen inside an explicit transaction opened with
//! [`SqliteStore::begin`]. Begin/commit calls nest: only the outermost
//! commit actually commits, so a nested operation can request a commit
//! without cutting a caller's batch short. [`SqliteStore::checkpoint`]
//! commits pending work and reopens the transaction at the same depth;
//! the reconciler uses it between ingestion batches so an interruption
//! loses at most one batch.
//!
//! # Failure semantics
//!
//! Any failed SQL execution is logged with the failing statement and
//! parameters, then propagated. Nothing is suppressed at this layer.

use crate::error::{DbError, DbResult};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::cell::Cell;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, warn};

/// Column types supported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    /// Map a declared column type from PRAGMA table_info back to a
    /// [`SqlType`]; anything unrecognized is treated as TEXT
    pub fn from_declared(declared: &str) -> SqlType {
        match declared.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => SqlType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" => SqlType::Real,
            _ => SqlType::Text,
        }
    }
}

/// A storable scalar: what a single table cell holds
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl StoredValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoredValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StoredValue::Null)
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Null => write!(f, "NULL"),
            StoredValue::Int(v) => write!(f, "{v}"),
            StoredValue::Real(v) => write!(f, "{v}"),
            StoredValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl ToSql for StoredValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            StoredValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            StoredValue::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            StoredValue::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            StoredValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl From<SqlValue> for StoredValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => StoredValue::Null,
            SqlValue::Integer(v) => StoredValue::Int(v),
            SqlValue::Real(v) => StoredValue::Real(v),
            SqlValue::Text(v) => StoredValue::Text(v),
            SqlValue::Blob(v) => {
                // the indexer never writes blobs
                warn!(len = v.len(), "unexpected BLOB value, treating as NULL");
                StoredValue::Null
            }
        }
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::Text(value.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::Text(value)
    }
}

impl From<i64> for StoredValue {
    fn from(value: i64) -> Self {
        StoredValue::Int(value)
    }
}

impl From<f64> for StoredValue {
    fn from(value: f64) -> Self {
        StoredValue::Real(value)
    }
}

/// A single column constraint; constraints on a query are AND-combined
#[derive(Debug, Clone)]
pub enum FilterOp {
    /// Exact match
    Eq(StoredValue),
    /// SQL LIKE pattern match
    Like(String),
    /// Set membership
    In(Vec<StoredValue>),
    /// Inclusive range
    Between(StoredValue, StoredValue),
}

/// Sort order for query results
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub column: String,
    /// Cast the column to REAL before comparing. Needed where numeric
    /// strings must sort numerically (slice positions, instance
    /// numbers), not lexically.
    pub numeric: bool,
}

/// A parametrized query over one table. Filters combine with AND only;
/// there is no OR and no nested grouping.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    /// Columns to return; empty means all
    pub columns: Vec<String>,
    pub filters: Vec<(String, FilterOp)>,
    pub sort: Option<SortSpec>,
    pub distinct: bool,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, op: FilterOp) -> Self {
        self.filters.push((column.into(), op));
        self
    }

    pub fn sort_by(mut self, column: impl Into<String>, numeric: bool) -> Self {
        self.sort = Some(SortSpec {
            column: column.into(),
            numeric,
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn where_clause(&self, params: &mut Vec<StoredValue>) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = self
            .filters
            .iter()
            .map(|(column, op)| {
                let col = quote_ident(column);
                match op {
                    FilterOp::Eq(value) => {
                        params.push(value.clone());
                        format!("{col} = ?")
                    }
                    FilterOp::Like(pattern) => {
                        params.push(StoredValue::Text(format!("%{pattern}%")));
                        format!("{col} LIKE ?")
                    }
                    FilterOp::In(values) => {
                        let marks = vec!["?"; values.len()].join(", ");
                        params.extend(values.iter().cloned());
                        format!("{col} IN ({marks})")
                    }
                    FilterOp::Between(low, high) => {
                        params.push(low.clone());
                        params.push(high.clone());
                        format!("{col} BETWEEN ? AND ?")
                    }
                }
            })
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn order_clause(&self) -> String {
        match &self.sort {
            None => String::new(),
            Some(SortSpec { column, numeric }) => {
                let col = quote_ident(column);
                if *numeric {
                    format!(" ORDER BY CAST({col} AS REAL)")
                } else {
                    format!(" ORDER BY {col}")
                }
            }
        }
    }
}

/// Quote an identifier for embedding in generated SQL
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Pragmas applied on open; tuned for a single-writer workload
const OPEN_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
PRAGMA cache_size = -32000;
";

/// SQLite connection with depth-counted transaction control
pub struct SqliteStore {
    conn: Connection,
    tx_depth: Cell<u32>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(OPEN_PRAGMAS)?;
        Ok(Self {
            conn,
            tx_depth: Cell::new(0),
        })
    }

    /// Open an ephemeral in-memory database
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            tx_depth: Cell::new(0),
        })
    }

    /// Start a transaction, or join the one already open
    pub fn begin(&self) -> DbResult<()> {
        if self.tx_depth.get() == 0 {
            self.conn.execute_batch("BEGIN")?;
        }
        self.tx_depth.set(self.tx_depth.get() + 1);
        Ok(())
    }

    /// Request a commit. Only the outermost request actually commits;
    /// nested requests defer to their caller.
    pub fn commit(&self) -> DbResult<()> {
        match self.tx_depth.get() {
            0 => Err(DbError::NoTransaction),
            1 => {
                self.conn.execute_batch("COMMIT")?;
                self.tx_depth.set(0);
                Ok(())
            }
            depth => {
                self.tx_depth.set(depth - 1);
                Ok(())
            }
        }
    }

    /// Commit pending work and keep the transaction open at the same
    /// depth
    pub fn checkpoint(&self) -> DbResult<()> {
        if self.tx_depth.get() > 0 {
            self.conn.execute_batch("COMMIT; BEGIN")?;
            debug!("committed batch");
        }
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.tx_depth.get() > 0
    }

    /// Execute a statement, logging the statement and parameters on
    /// failure
    pub fn execute(&self, sql: &str, params: &[StoredValue]) -> DbResult<usize> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|err| {
                error!(sql, params = ?params, %err, "SQL execution failed");
                DbError::from(err)
            })
    }

    /// Names of all tables in the database
    pub fn table_names(&self) -> DbResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> DbResult<bool> {
        Ok(self.table_names()?.iter().any(|name| name == table))
    }

    /// Drop a table; no-op when it does not exist
    pub fn drop_table(&self, table: &str) -> DbResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), &[])?;
        Ok(())
    }

    /// Live column names for a table, in schema order. This reflects
    /// the actual schema on every call; columns are added concurrently
    /// with ingestion, so a cache would go stale.
    pub fn column_names(&self, table: &str) -> DbResult<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Column names with their declared types
    pub fn column_types(&self, table: &str) -> DbResult<Vec<(String, SqlType)>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok((name, SqlType::from_declared(&declared)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Add a column; no-op when it already exists
    pub fn add_column(&self, table: &str, column: &str, sql_type: SqlType) -> DbResult<()> {
        if self.column_names(table)?.iter().any(|name| name == column) {
            return Ok(());
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(column),
            sql_type.as_sql()
        );
        self.execute(&sql, &[])?;
        Ok(())
    }

    /// Remove a column. SQLite lacked native column drop for most of
    /// its life, so this copies the table minus the column into a
    /// temporary table, drops the original, and renames the copy.
    pub fn delete_column(&self, table: &str, column: &str) -> DbResult<()> {
        const TEMP_TABLE: &str = "minidicom_column_drop";

        let all = self.column_names(table)?;
        if !all.iter().any(|name| name == column) {
            return Ok(());
        }
        let column_list = all
            .iter()
            .filter(|name| *name != column)
            .map(|name| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");

        self.drop_table(TEMP_TABLE)?;
        if let Err(err) = self.execute(
            &format!(
                "CREATE TABLE {} AS SELECT {} FROM {}",
                quote_ident(TEMP_TABLE),
                column_list,
                quote_ident(table)
            ),
            &[],
        ) {
            self.drop_table(TEMP_TABLE)?;
            return Err(err);
        }
        self.drop_table(table)?;
        self.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(TEMP_TABLE),
                quote_ident(table)
            ),
            &[],
        )?;
        Ok(())
    }

    /// Insert a single row. The number of values must match the number
    /// of columns exactly.
    pub fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: &[StoredValue],
    ) -> DbResult<()> {
        if columns.len() != values.len() {
            return Err(DbError::ColumnCount {
                expected: columns.len(),
                actual: values.len(),
            });
        }
        let column_list = columns
            .iter()
            .map(|name| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let marks = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            marks
        );
        self.execute(&sql, values)?;
        Ok(())
    }

    /// Delete all rows where `column` equals `value`
    pub fn delete_rows(&self, table: &str, column: &str, value: &StoredValue) -> DbResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(column)
        );
        self.execute(&sql, std::slice::from_ref(value))
    }

    /// Run a query and return rows as stored values, one `Vec` per row
    /// in the order of `spec.columns`
    pub fn query(&self, table: &str, spec: &QuerySpec) -> DbResult<Vec<Vec<StoredValue>>> {
        let columns = if spec.columns.is_empty() {
            "*".to_string()
        } else {
            spec.columns
                .iter()
                .map(|name| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut params = Vec::new();
        let sql = format!(
            "SELECT {}{} FROM {}{}{}",
            if spec.distinct { "DISTINCT " } else { "" },
            columns,
            quote_ident(table),
            spec.where_clause(&mut params),
            spec.order_clause()
        );

        let mut stmt = self.conn.prepare(&sql).map_err(|err| {
            error!(sql, %err, "SQL prepare failed");
            DbError::from(err)
        })?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(StoredValue::from(row.get::<_, SqlValue>(i)?));
                }
                Ok(values)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|err| {
                error!(sql, params = ?params, %err, "SQL query failed");
                DbError::from(err)
            })?;
        Ok(rows)
    }

    /// Values of a single column, as a flat list
    pub fn query_column(&self, table: &str, spec: &QuerySpec) -> DbResult<Vec<StoredValue>> {
        Ok(self
            .query(table, spec)?
            .into_iter()
            .filter_map(|mut row| {
                if row.is_empty() {
                    None
                } else {
                    Some(row.swap_remove(0))
                }
            })
            .collect())
    }
}

impl Drop for SqliteStore {
    /// Commit pending writes on every exit path
    fn drop(&mut self) {
        if self.tx_depth.get() > 0 {
            if let Err(err) = self.conn.execute_batch("COMMIT") {
                error!(%err, "failed to commit pending transaction on close");
            }
            self.tx_depth.set(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, size INTEGER)",
                &[],
            )
            .unwrap();
        store
    }

    fn insert(store: &SqliteStore, name: &str, size: i64) {
        store
            .insert_row(
                "items",
                &["name".to_string(), "size".to_string()],
                &[StoredValue::from(name), StoredValue::Int(size)],
            )
            .unwrap();
    }

    #[test]
    fn test_add_column_is_idempotent() {
        let store = store_with_table();
        store.add_column("items", "extra", SqlType::Text).unwrap();
        store.add_column("items", "extra", SqlType::Text).unwrap();
        let names = store.column_names("items").unwrap();
        assert_eq!(names.iter().filter(|n| *n == "extra").count(), 1);
    }

    #[test]
    fn test_delete_column_preserves_data() {
        let store = store_with_table();
        insert(&store, "a", 1);
        insert(&store, "b", 2);

        store.delete_column("items", "size").unwrap();

        let names = store.column_names("items").unwrap();
        assert!(!names.contains(&"size".to_string()));
        let rows = store
            .query("items", &QuerySpec::new().columns(["name"]))
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_delete_missing_column_is_noop() {
        let store = store_with_table();
        store.delete_column("items", "ghost").unwrap();
    }

    #[test]
    fn test_drop_missing_table_is_noop() {
        let store = store_with_table();
        store.drop_table("no_such_table").unwrap();
        assert!(!store.table_exists("no_such_table").unwrap());
    }

    #[test]
    fn test_filters() {
        let store = store_with_table();
        insert(&store, "a", 1);
        insert(&store, "b", 2);
        insert(&store, "c", 3);

        let rows = store
            .query(
                "items",
                &QuerySpec::new()
                    .columns(["name"])
                    .filter("size", FilterOp::Eq(StoredValue::Int(2))),
            )
            .unwrap();
        assert_eq!(rows, vec![vec![StoredValue::Text("b".into())]]);

        let rows = store
            .query(
                "items",
                &QuerySpec::new().columns(["name"]).filter(
                    "size",
                    FilterOp::In(vec![StoredValue::Int(1), StoredValue::Int(3)]),
                ),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = store
            .query(
                "items",
                &QuerySpec::new().columns(["name"]).filter(
                    "size",
                    FilterOp::Between(StoredValue::Int(2), StoredValue::Int(3)),
                ),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_filters_combine_with_and() {
        let store = store_with_table();
        insert(&store, "a", 1);
        insert(&store, "a", 2);

        let rows = store
            .query(
                "items",
                &QuerySpec::new()
                    .columns(["name", "size"])
                    .filter("name", FilterOp::Eq(StoredValue::from("a")))
                    .filter("size", FilterOp::Eq(StoredValue::Int(2))),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_like_filter() {
        let store = store_with_table();
        insert(&store, "head_ct", 1);
        insert(&store, "chest_ct", 2);
        insert(&store, "mr", 3);

        let rows = store
            .query(
                "items",
                &QuerySpec::new()
                    .columns(["name"])
                    .filter("name", FilterOp::Like("ct".to_string())),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_numeric_sort() {
        let store = store_with_table();
        // lexically "10" < "9", numerically 9 < 10
        insert(&store, "10", 0);
        insert(&store, "9", 0);

        let rows = store
            .query(
                "items",
                &QuerySpec::new().columns(["name"]).sort_by("name", true),
            )
            .unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|row| row[0].as_text().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["9", "10"]);

        let rows = store
            .query(
                "items",
                &QuerySpec::new().columns(["name"]).sort_by("name", false),
            )
            .unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|row| row[0].as_text().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["10", "9"]);
    }

    #[test]
    fn test_insert_row_value_count_must_match() {
        let store = store_with_table();
        let err = store
            .insert_row(
                "items",
                &["name".to_string(), "size".to_string()],
                &[StoredValue::from("a")],
            )
            .unwrap_err();
        assert!(matches!(err, DbError::ColumnCount { .. }));
    }

    #[test]
    fn test_nested_commit_defers_to_outer() {
        let store = store_with_table();
        store.begin().unwrap();
        store.begin().unwrap();
        insert(&store, "a", 1);
        store.commit().unwrap();
        assert!(store.in_transaction());
        store.commit().unwrap();
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_commit_without_begin_fails() {
        let store = store_with_table();
        assert!(matches!(store.commit(), Err(DbError::NoTransaction)));
    }

    #[test]
    fn test_distinct() {
        let store = store_with_table();
        insert(&store, "a", 1);
        insert(&store, "a", 2);

        let rows = store
            .query("items", &QuerySpec::new().columns(["name"]).distinct())
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
