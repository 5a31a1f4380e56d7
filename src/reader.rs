//! Header reading collaborator
//!
//! The reconciler reads file headers through the [`HeaderReader`]
//! trait so the parsing library stays swappable and tests can inject
//! synthetic headers. The default implementation reads DICOM files
//! with the `dicom` crate, stopping before pixel data.

use dicom::dictionary_std::tags;
use dicom::object::{InMemDicomObject, OpenFileOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The file is not a recognized DICOM file. Recorded, not retried,
/// never propagated as a scan failure.
#[derive(Error, Debug)]
#[error("Not a recognized DICOM file '{path}': {reason}")]
pub struct NotDicomError {
    pub path: PathBuf,
    pub reason: String,
}

/// Reads a file into an element collection
pub trait HeaderReader {
    fn read_header(&self, path: &Path) -> Result<InMemDicomObject, NotDicomError>;
}

/// Default reader backed by the `dicom` crate. Reading stops at the
/// pixel-data element; the index never needs pixel bytes.
#[derive(Debug, Default)]
pub struct DicomFileReader;

impl HeaderReader for DicomFileReader {
    fn read_header(&self, path: &Path) -> Result<InMemDicomObject, NotDicomError> {
        OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map(|object| object.into_inner())
            .map_err(|err| NotDicomError {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
    }
}
