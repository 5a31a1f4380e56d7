//! SQLite storage layer
//!
//! A generic store adapter plus the index's concrete schema. The
//! adapter knows nothing about DICOM; the schema module defines the
//! tables and reserved columns and owns the dynamic column registry.

pub mod schema;
pub mod store;

pub use schema::{SchemaRegistry, SCHEMA_VERSION};
pub use store::{FilterOp, QuerySpec, SortSpec, SqlType, SqliteStore, StoredValue};
