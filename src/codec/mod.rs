//! Encode/decode layer between DICOM headers and table rows
//!
//! Bridges a self-describing, nested, variably-typed header onto flat
//! relational columns and back:
//!
//! - [`tag_names`]: column names from tags (dictionary keywords, or
//!   synthesized names for private tags)
//! - [`dates`]: ISO normalization so lexical order matches
//!   chronological order
//! - [`value`]: one element value to/from one storable scalar
//! - [`header`]: a whole header to/from a row mapping, recursing
//!   through sequences

pub mod dates;
pub mod header;
pub mod tag_names;
pub mod value;

pub use header::{DecodedHeader, DecodedValue, EncodedHeader, HeaderCodec, RowMap};
pub use tag_names::TagDictionary;
