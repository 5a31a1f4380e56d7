//! Index schema: tables, reserved columns, version metadata
//!
//! The index holds three tables. The main table has one row per DICOM
//! file and one column per discovered tag name; it starts with only the
//! reserved columns and grows as files introduce new tags. The
//! auxiliary table records every attempted file so unreadable files are
//! not retried on the next scan. The metadata table holds the schema
//! version and the source folder, one row, replaced wholesale.

use crate::db::store::{SqlType, SqliteStore, StoredValue};
use crate::error::{DbError, DbResult};
use std::collections::BTreeMap;

/// Schema version written to the metadata table
pub const SCHEMA_VERSION: f64 = 2.0;

/// Main table: one row per indexed DICOM file
pub const MAIN_TABLE: &str = "DicomMetaData";

/// Auxiliary table: every file a scan has attempted
pub const AUX_TABLE: &str = "NonDicomFiles";

/// Metadata table: schema version and source folder
pub const META_TABLE: &str = "IndexInfo";

/// Reserved column: relative file path, unique per row
pub const FILENAME_COL: &str = "dicom_file_name";

/// Reserved column: JSON array of the tag names present in the file.
/// Columns are a superset across all files; this records which subset
/// is meaningful for the row.
pub const TAGNAMES_COL: &str = "dicom_tag_names";

/// Reserved column: file size in bytes
pub const FILESIZE_COL: &str = "file_size_bytes";

/// Row id column created by table DDL
pub const ID_COL: &str = "id";

/// Note: INTEGER PRIMARY KEY without AUTOINCREMENT still auto-assigns
/// row ids but skips the sqlite_sequence bookkeeping.
const CREATE_MAIN_TABLE: &str = "
CREATE TABLE IF NOT EXISTS DicomMetaData (
    id INTEGER PRIMARY KEY,
    dicom_file_name TEXT UNIQUE,
    dicom_tag_names TEXT,
    file_size_bytes INTEGER
)";

const CREATE_AUX_TABLE: &str = "
CREATE TABLE IF NOT EXISTS NonDicomFiles (
    id INTEGER PRIMARY KEY,
    dicom_file_name TEXT UNIQUE
)";

const CREATE_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS IndexInfo (
    schema_version REAL,
    folder TEXT
)";

/// Create all tables that do not yet exist
pub fn create_schema(store: &SqliteStore) -> DbResult<()> {
    store.execute(CREATE_MAIN_TABLE, &[])?;
    store.execute(CREATE_AUX_TABLE, &[])?;
    store.execute(CREATE_META_TABLE, &[])?;
    Ok(())
}

/// Drop all index tables; used by rebuild
pub fn drop_schema(store: &SqliteStore) -> DbResult<()> {
    for table in [MAIN_TABLE, AUX_TABLE, META_TABLE] {
        store.drop_table(table)?;
    }
    Ok(())
}

/// Replace the metadata row wholesale
pub fn write_info(store: &SqliteStore, version: f64, folder: &str) -> DbResult<()> {
    store.execute(&format!("DELETE FROM {META_TABLE}"), &[])?;
    store.insert_row(
        META_TABLE,
        &["schema_version".to_string(), "folder".to_string()],
        &[StoredValue::Real(version), StoredValue::from(folder)],
    )
}

/// Read the metadata row, if one exists
pub fn read_info(store: &SqliteStore) -> DbResult<Option<(f64, String)>> {
    let rows = store.query(
        META_TABLE,
        &crate::db::store::QuerySpec::new().columns(["schema_version", "folder"]),
    )?;
    let row = match rows.into_iter().next() {
        Some(row) => row,
        None => return Ok(None),
    };
    match (&row[0], &row[1]) {
        (StoredValue::Real(version), StoredValue::Text(folder)) => {
            Ok(Some((*version, folder.clone())))
        }
        _ => Err(DbError::Schema("malformed metadata row".to_string())),
    }
}

/// Owns the column-name-to-type map for the main table. Columns are
/// consulted and added only through this registry; nothing infers the
/// schema ad hoc from row shapes.
#[derive(Debug)]
pub struct SchemaRegistry {
    table: &'static str,
    columns: BTreeMap<String, SqlType>,
}

impl SchemaRegistry {
    /// Reflect the live schema of the main table
    pub fn reflect(store: &SqliteStore) -> DbResult<Self> {
        let columns = store.column_types(MAIN_TABLE)?.into_iter().collect();
        Ok(Self {
            table: MAIN_TABLE,
            columns,
        })
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// All known column names
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Column names that are dynamically-added tag columns, i.e. not
    /// reserved
    pub fn tag_columns(&self) -> impl Iterator<Item = &str> {
        self.column_names()
            .filter(|name| !is_reserved(name))
    }

    /// Add a column if it is missing. Returns true when the column was
    /// created.
    pub fn ensure_column(
        &mut self,
        store: &SqliteStore,
        column: &str,
        sql_type: SqlType,
    ) -> DbResult<bool> {
        if self.contains(column) {
            return Ok(false);
        }
        store.add_column(self.table, column, sql_type)?;
        self.columns.insert(column.to_string(), sql_type);
        Ok(true)
    }

    /// Drop a column and forget it
    pub fn drop_column(&mut self, store: &SqliteStore, column: &str) -> DbResult<()> {
        store.delete_column(self.table, column)?;
        self.columns.remove(column);
        Ok(())
    }
}

/// True for columns that are part of the fixed schema rather than
/// discovered tags
pub fn is_reserved(column: &str) -> bool {
    matches!(column, ID_COL | FILENAME_COL | TAGNAMES_COL | FILESIZE_COL)
}
