//! Index builder / reconciler
//!
//! Owns the database lifecycle and keeps the persisted index
//! synchronized with a folder tree:
//!
//! ```text
//! open ──▶ (rebuild?) ──▶ ready ──▶ scan ──▶ ready ──▶ closed
//!
//! scan: enumerate folder ──▶ diff against persisted file list
//!       ──▶ remove stale rows ──▶ ingest new files in batches
//! ```
//!
//! Every attempted file is recorded in the auxiliary table first, so a
//! file that is not DICOM is skipped on later scans instead of being
//! re-read. A failed row insert aborts the scan: malformed *elements*
//! are tolerated by the codec, but a failed *insert* means the store
//! itself is in trouble.

pub mod scanner;

use crate::codec::{HeaderCodec, TagDictionary};
use crate::config::IndexConfig;
use crate::db::schema::{
    self, SchemaRegistry, AUX_TABLE, FILENAME_COL, FILESIZE_COL, MAIN_TABLE, TAGNAMES_COL,
};
use crate::db::store::{QuerySpec, SqliteStore, StoredValue};
use crate::error::{CodecError, Result, ScanResult};
use crate::progress::{self, ConsoleProgress, NoProgress, Progress};
use crate::reader::{DicomFileReader, HeaderReader};
use crate::selection::Selection;
use scanner::{compare, FileEnumerator, FileScanner};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters from one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Files currently present under the folder
    pub found: usize,
    /// New files successfully indexed
    pub added: usize,
    /// Stale entries removed
    pub removed: usize,
    /// New files that were not recognized as DICOM
    pub non_dicom: usize,
    pub duration: Duration,
}

/// A folder of DICOM files indexed into SQLite
pub struct DicomIndex {
    config: IndexConfig,
    folder: PathBuf,
    database_path: Option<PathBuf>,
    store: SqliteStore,
    schema: SchemaRegistry,
    codec: HeaderCodec,
    reader: Box<dyn HeaderReader>,
    enumerator: Box<dyn FileEnumerator>,
}

impl DicomIndex {
    /// Open (or create) the index for a folder with the default file
    /// reader and enumerator
    pub fn open(config: IndexConfig) -> Result<Self> {
        Self::open_with(
            config,
            Box::new(DicomFileReader),
            Box::new(FileScanner),
        )
    }

    /// Open with explicit collaborators
    pub fn open_with(
        config: IndexConfig,
        reader: Box<dyn HeaderReader>,
        enumerator: Box<dyn FileEnumerator>,
    ) -> Result<Self> {
        config.validate()?;
        let folder = config.absolute_folder()?;

        let (store, database_path) = if config.in_memory {
            (SqliteStore::open_in_memory()?, None)
        } else {
            let path = config.resolved_database_path();
            (SqliteStore::open(&path)?, Some(path))
        };

        schema::create_schema(&store)?;

        let folder_str = folder.display().to_string();
        match schema::read_info(&store)? {
            None => schema::write_info(&store, schema::SCHEMA_VERSION, &folder_str)?,
            Some((version, stored_folder)) => {
                if version != schema::SCHEMA_VERSION {
                    warn!(
                        stored = version,
                        current = schema::SCHEMA_VERSION,
                        "index was created by a different schema version; rebuild() is recommended"
                    );
                }
                if stored_folder != folder_str {
                    warn!(
                        stored = stored_folder.as_str(),
                        current = folder_str.as_str(),
                        "index was created for a different folder"
                    );
                    schema::write_info(&store, schema::SCHEMA_VERSION, &folder_str)?;
                }
            }
        }

        let registry = SchemaRegistry::reflect(&store)?;
        let codec = HeaderCodec::new(Arc::new(TagDictionary::new()));

        info!(folder = folder_str.as_str(), "opened index");
        Ok(Self {
            config,
            folder,
            database_path,
            store,
            schema: registry,
            codec,
            reader,
            enumerator,
        })
    }

    /// Drop everything and recreate the schema, then rescan the folder
    pub fn rebuild(&mut self) -> Result<ScanOutcome> {
        info!("rebuilding index");
        schema::drop_schema(&self.store)?;
        schema::create_schema(&self.store)?;
        schema::write_info(
            &self.store,
            schema::SCHEMA_VERSION,
            &self.folder.display().to_string(),
        )?;
        self.schema = SchemaRegistry::reflect(&self.store)?;
        self.scan()
    }

    /// Reconcile the index with the folder, reporting progress to the
    /// console unless the configuration is silent
    pub fn scan(&mut self) -> Result<ScanOutcome> {
        if self.config.silent {
            self.scan_with_progress(&NoProgress)
        } else {
            let bar = ConsoleProgress::new();
            let outcome = self.scan_with_progress(&bar)?;
            bar.finish("done");
            let db_size = self
                .database_path
                .as_ref()
                .and_then(|path| fs::metadata(path).ok())
                .map(|meta| meta.len());
            let db_path = self
                .database_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string());
            progress::print_summary(
                outcome.found as u64,
                outcome.added as u64,
                outcome.removed as u64,
                outcome.non_dicom as u64,
                outcome.duration,
                &db_path,
                db_size,
            );
            Ok(outcome)
        }
    }

    /// Reconcile the index with the folder, reporting progress through
    /// the given callback once per processed file
    pub fn scan_with_progress(&mut self, progress: &dyn Progress) -> Result<ScanOutcome> {
        let start = Instant::now();
        info!(folder = %self.folder.display(), "scanning folder");

        let mut found = self.enumerator.list(&self.folder, true)?;
        self.exclude_database_files(&mut found);

        let known: Vec<PathBuf> = {
            let mut set: BTreeSet<PathBuf> = self.files()?.into_iter().collect();
            set.extend(self.attempted_files()?);
            set.into_iter().collect()
        };
        let (new_files, stale) = compare(&found, &known);
        info!(
            found = found.len(),
            new = new_files.len(),
            stale = stale.len(),
            "reconciling"
        );

        self.store.begin()?;
        for file in &stale {
            self.remove_file(file)?;
        }
        self.store.commit()?;

        let total = new_files.len();
        let mut non_dicom = 0usize;
        if total > 0 {
            progress.report(0, total);
            self.store.begin()?;
            for (i, file) in new_files.iter().enumerate() {
                if !self.insert_file(file)? {
                    non_dicom += 1;
                }
                progress.report(i + 1, total);
                // commit per batch so an interruption loses at most
                // one batch of progress
                if (i + 1) % self.config.batch_size == 0 {
                    self.store.checkpoint()?;
                }
            }
            self.store.commit()?;
        }

        Ok(ScanOutcome {
            found: found.len(),
            added: total - non_dicom,
            removed: stale.len(),
            non_dicom,
            duration: start.elapsed(),
        })
    }

    /// Ingest a single new file. Returns false when the file is not
    /// recognized as DICOM; it stays recorded in the auxiliary table so
    /// later scans skip it. A database failure propagates and aborts
    /// the surrounding scan. Re-ingesting an existing file requires
    /// [`remove_file`](Self::remove_file) first.
    pub fn insert_file(&mut self, relative: &Path) -> ScanResult<bool> {
        let name = path_to_name(relative);

        // record the attempt before reading
        self.store.insert_row(
            AUX_TABLE,
            &[FILENAME_COL.to_string()],
            &[StoredValue::from(name.clone())],
        )?;

        let absolute = self.folder.join(relative);
        let object = match self.reader.read_header(&absolute) {
            Ok(object) => object,
            Err(err) => {
                debug!(%err, "skipping file");
                return Ok(false);
            }
        };

        let encoded = self
            .codec
            .encode(&object, self.config.include_private_tags);

        let tag_list: Vec<&str> = encoded.tag_names().collect();
        let tag_json = serde_json::to_string(&tag_list).map_err(CodecError::from)?;

        for (column, sql_type) in &encoded.types {
            self.schema.ensure_column(&self.store, column, *sql_type)?;
        }

        let file_size = fs::metadata(&absolute)
            .map(|meta| StoredValue::Int(meta.len() as i64))
            .unwrap_or(StoredValue::Null);

        let mut columns = vec![
            FILENAME_COL.to_string(),
            TAGNAMES_COL.to_string(),
            FILESIZE_COL.to_string(),
        ];
        let mut values = vec![
            StoredValue::from(name),
            StoredValue::from(tag_json),
            file_size,
        ];
        for (column, value) in &encoded.values {
            columns.push(column.clone());
            values.push(value.clone());
        }

        self.store.insert_row(MAIN_TABLE, &columns, &values)?;
        Ok(true)
    }

    /// Remove a file's rows from both tables
    pub fn remove_file(&self, relative: &Path) -> Result<()> {
        let name = StoredValue::from(path_to_name(relative));
        self.store.delete_rows(MAIN_TABLE, FILENAME_COL, &name)?;
        self.store.delete_rows(AUX_TABLE, FILENAME_COL, &name)?;
        Ok(())
    }

    /// Relative paths of all indexed DICOM files
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let values = self
            .store
            .query_column(MAIN_TABLE, &QuerySpec::new().columns([FILENAME_COL]))?;
        Ok(values
            .iter()
            .filter_map(|value| value.as_text().map(PathBuf::from))
            .collect())
    }

    /// Relative paths of every file a scan has attempted, DICOM or not
    pub fn attempted_files(&self) -> Result<Vec<PathBuf>> {
        let values = self
            .store
            .query_column(AUX_TABLE, &QuerySpec::new().columns([FILENAME_COL]))?;
        Ok(values
            .iter()
            .filter_map(|value| value.as_text().map(PathBuf::from))
            .collect())
    }

    /// Number of indexed DICOM files
    pub fn file_count(&self) -> Result<usize> {
        Ok(self.files()?.len())
    }

    /// Tag names present as columns, sorted. Reflects the live schema.
    pub fn tag_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .column_names(MAIN_TABLE)?
            .into_iter()
            .filter(|name| !schema::is_reserved(name))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Drop tag columns that no row references anymore. Returns the
    /// number of columns removed.
    pub fn clean_columns(&mut self) -> Result<usize> {
        let lists = self
            .store
            .query_column(MAIN_TABLE, &QuerySpec::new().columns([TAGNAMES_COL]))?;
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for list in &lists {
            if let Some(text) = list.as_text() {
                let names: Vec<String> =
                    serde_json::from_str(text).map_err(CodecError::from)?;
                referenced.extend(names);
            }
        }

        let unreferenced: Vec<String> = self
            .tag_names()?
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect();
        for column in &unreferenced {
            self.schema.drop_column(&self.store, column)?;
        }
        if !unreferenced.is_empty() {
            info!(dropped = unreferenced.len(), "removed unreferenced columns");
        }
        Ok(unreferenced.len())
    }

    /// Start an unfiltered selection over the index
    pub fn select(&self) -> Selection<'_> {
        Selection::new(self)
    }

    /// The indexed folder (absolute)
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// The header codec used by this index
    pub fn codec(&self) -> &HeaderCodec {
        &self.codec
    }

    pub(crate) fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Keep the index's own files out of the scan when the database
    /// lives inside the indexed folder
    fn exclude_database_files(&self, found: &mut Vec<PathBuf>) {
        let relative_db = self
            .database_path
            .as_ref()
            .and_then(|path| path.canonicalize().ok())
            .and_then(|path| path.strip_prefix(&self.folder).ok().map(Path::to_path_buf));
        if let Some(db) = relative_db {
            let name = path_to_name(&db);
            let wal = PathBuf::from(format!("{name}-wal"));
            let shm = PathBuf::from(format!("{name}-shm"));
            found.retain(|file| *file != db && *file != wal && *file != shm);
        }
    }
}

/// Portable string form of a relative path, used as the file identifier
fn path_to_name(path: &Path) -> String {
    path.iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_name_is_portable() {
        let path: PathBuf = ["sub", "dir", "file.dcm"].iter().collect();
        assert_eq!(path_to_name(&path), "sub/dir/file.dcm");
    }
}
