//! minidicom - DICOM metadata index over SQLite
//!
//! Indexes the headers of a folder of DICOM files into a single SQLite
//! table with one row per file and one dynamically-created column per
//! discovered tag, then answers queries over the result and
//! reconstructs headers from stored rows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     folder tree                          │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ enumerate + diff
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │              DicomIndex (reconciler)                     │
//! │  - removes stale rows, ingests new files in batches      │
//! │  - reads headers via the `dicom` crate                   │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ HeaderCodec / value codec
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          SQLite (one row per file, dynamic columns)      │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ Selection (predicate + decode)
//!                             ▼
//!                 decoded headers, counts, volumes
//! ```
//!
//! # Example
//!
//! ```no_run
//! use minidicom::{DicomIndex, IndexConfig};
//!
//! # fn main() -> minidicom::Result<()> {
//! let mut index = DicomIndex::open(IndexConfig::new("/data/scans"))?;
//! index.scan()?;
//!
//! let mut selection = index.select();
//! selection.select("PatientID", "123")?;
//! println!("{} series", selection.series_count()?);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod progress;
pub mod reader;
pub mod selection;
pub mod tags;
pub mod volume;

pub use codec::{DecodedHeader, DecodedValue, HeaderCodec, TagDictionary};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{DicomIndex, ScanOutcome};
pub use progress::Progress;
pub use reader::{DicomFileReader, HeaderReader};
pub use selection::{Selection, TagValue};
pub use volume::VolumeAssembler;
