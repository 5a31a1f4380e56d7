//! Selection facade
//!
//! A [`Selection`] layers an accumulating predicate over the index
//! without touching storage. Successive `select` calls add or
//! overwrite predicate entries (AND semantics); `reset` clears them.
//! Filter values are encoded with the target column's VR before being
//! compared, because stored values are codec-encoded, not raw.

use crate::codec::{DecodedHeader, DecodedValue, RowMap};
use crate::db::schema::{self, FILENAME_COL, MAIN_TABLE, TAGNAMES_COL};
use crate::db::store::{FilterOp, QuerySpec, StoredValue};
use crate::error::{CodecError, SelectionError, SelectionResult};
use crate::index::DicomIndex;
use crate::tags;
use crate::volume::VolumeAssembler;
use dicom::core::value::PrimitiveValue;
use smallvec::smallvec;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::warn;

/// A caller-supplied filter value, before codec encoding
#[derive(Debug, Clone)]
pub enum TagValue {
    Text(String),
    Int(i64),
    Real(f64),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Real(value)
    }
}

/// An accumulating row predicate over one index
pub struct Selection<'a> {
    index: &'a DicomIndex,
    filters: BTreeMap<String, FilterOp>,
}

impl<'a> Selection<'a> {
    pub(crate) fn new(index: &'a DicomIndex) -> Self {
        Self {
            index,
            filters: BTreeMap::new(),
        }
    }

    /// Require `name` to equal `value`. Overwrites any earlier
    /// constraint on the same tag.
    pub fn select(
        &mut self,
        name: &str,
        value: impl Into<TagValue>,
    ) -> SelectionResult<&mut Self> {
        let encoded = self.encode_value(name, value.into())?;
        self.filters.insert(name.to_string(), FilterOp::Eq(encoded));
        Ok(self)
    }

    /// Require `name` to be one of `values`
    pub fn select_in<T: Into<TagValue>>(
        &mut self,
        name: &str,
        values: Vec<T>,
    ) -> SelectionResult<&mut Self> {
        let encoded = values
            .into_iter()
            .map(|value| self.encode_value(name, value.into()))
            .collect::<SelectionResult<Vec<_>>>()?;
        self.filters.insert(name.to_string(), FilterOp::In(encoded));
        Ok(self)
    }

    /// Require `name` to fall in the inclusive range `[low, high]`
    pub fn select_range(
        &mut self,
        name: &str,
        low: impl Into<TagValue>,
        high: impl Into<TagValue>,
    ) -> SelectionResult<&mut Self> {
        let low = self.encode_value(name, low.into())?;
        let high = self.encode_value(name, high.into())?;
        self.filters
            .insert(name.to_string(), FilterOp::Between(low, high));
        Ok(self)
    }

    /// Clear the predicate entirely
    pub fn reset(&mut self) {
        self.filters.clear();
    }

    /// Encode a caller value the way the target column's values were
    /// encoded at ingestion
    fn encode_value(&self, name: &str, value: TagValue) -> SelectionResult<StoredValue> {
        let (tag, vr) = self.index.codec().dictionary().resolve_name(name)?;
        let primitive = match value {
            TagValue::Text(s) => PrimitiveValue::Str(s),
            TagValue::Int(i) => PrimitiveValue::I64(smallvec![i]),
            TagValue::Real(f) => PrimitiveValue::F64(smallvec![f]),
        };
        Ok(crate::codec::value::encode(&primitive, tag, vr)?)
    }

    fn spec<I, S>(&self, columns: I) -> QuerySpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = QuerySpec::new().columns(columns);
        for (column, op) in &self.filters {
            spec = spec.filter(column.clone(), op.clone());
        }
        spec
    }

    /// Relative paths of the rows matching the predicate
    pub fn files(&self) -> SelectionResult<Vec<PathBuf>> {
        let values = self
            .index
            .store()
            .query_column(MAIN_TABLE, &self.spec([FILENAME_COL]))?;
        Ok(values
            .iter()
            .filter_map(|value| value.as_text().map(PathBuf::from))
            .collect())
    }

    /// Number of rows matching the predicate
    pub fn file_count(&self) -> SelectionResult<usize> {
        Ok(self.files()?.len())
    }

    /// Tag names present in at least one matching row
    pub fn tag_names(&self) -> SelectionResult<BTreeSet<String>> {
        let lists = self
            .index
            .store()
            .query_column(MAIN_TABLE, &self.spec([TAGNAMES_COL]))?;
        let mut names = BTreeSet::new();
        for list in &lists {
            if let Some(text) = list.as_text() {
                let parsed: Vec<String> =
                    serde_json::from_str(text).map_err(CodecError::from)?;
                names.extend(parsed);
            }
        }
        Ok(names)
    }

    /// Distinct decoded values of a tag under the current predicate.
    /// Requesting a tag absent from the selection is a contract
    /// violation.
    pub fn distinct_values(&self, name: &str) -> SelectionResult<Vec<DecodedValue>> {
        if !self.tag_names()?.contains(name) {
            return Err(SelectionError::TagNotPresent(name.to_string()));
        }
        let stored = self.index.store().query_column(
            MAIN_TABLE,
            &self.spec([name]).distinct().sort_by(name, false),
        )?;
        let mut values = Vec::new();
        for item in &stored {
            if item.is_null() {
                // rows that predate the tag's discovery
                continue;
            }
            values.push(self.index.codec().decode_entry(name, item)?);
        }
        Ok(values)
    }

    /// The single distinct value of a tag under the current predicate
    pub fn single_value(&self, name: &str) -> SelectionResult<DecodedValue> {
        let mut values = self.distinct_values(name)?;
        if values.len() != 1 {
            return Err(SelectionError::NotSingular {
                name: name.to_string(),
                count: values.len(),
            });
        }
        Ok(values.remove(0))
    }

    /// Number of distinct values of a tag; zero when the tag is absent
    /// from the selection
    pub fn value_count(&self, name: &str) -> SelectionResult<usize> {
        if !self.tag_names()?.contains(name) {
            return Ok(0);
        }
        Ok(self.distinct_values(name)?.len())
    }

    pub fn patient_count(&self) -> SelectionResult<usize> {
        self.value_count(tags::PATIENT_ID)
    }

    pub fn study_count(&self) -> SelectionResult<usize> {
        self.value_count(tags::STUDY_INSTANCE_UID)
    }

    pub fn series_count(&self) -> SelectionResult<usize> {
        self.value_count(tags::SERIES_INSTANCE_UID)
    }

    pub fn instance_count(&self) -> SelectionResult<usize> {
        self.value_count(tags::SOP_INSTANCE_UID)
    }

    /// Decoded headers of the matching rows, keyed by relative path.
    /// Only tags listed in each row's tag-name list are decoded;
    /// columns that exist for other files stay out of the header.
    pub fn headers(&self) -> SelectionResult<Vec<(PathBuf, DecodedHeader)>> {
        let tag_columns: Vec<String> = self
            .index
            .store()
            .column_names(MAIN_TABLE)?
            .into_iter()
            .filter(|name| !schema::is_reserved(name))
            .collect();

        let mut columns = vec![FILENAME_COL.to_string(), TAGNAMES_COL.to_string()];
        columns.extend(tag_columns.iter().cloned());

        let rows = self
            .index
            .store()
            .query(MAIN_TABLE, &self.spec(columns.clone()))?;

        let mut headers = Vec::with_capacity(rows.len());
        for row in rows {
            let file = match row[0].as_text() {
                Some(text) => PathBuf::from(text),
                None => continue,
            };
            let listed: BTreeSet<String> = match row[1].as_text() {
                Some(text) => serde_json::from_str(text).map_err(CodecError::from)?,
                None => BTreeSet::new(),
            };

            let mut map = RowMap::new();
            for (i, column) in tag_columns.iter().enumerate() {
                let value = &row[i + 2];
                if listed.contains(column) && !value.is_null() {
                    map.insert(column.clone(), value.clone());
                }
            }
            headers.push((file, self.index.codec().decode(&map)));
        }
        Ok(headers)
    }

    /// Assemble the selected files into a volume. The selection must
    /// span exactly one series. Files are sorted by slice location
    /// when available, instance number otherwise; with neither, the
    /// order is unspecified and a warning is logged. PET SUV scaling
    /// is disabled with a warning when its prerequisite tags are
    /// missing.
    pub fn volume<A: VolumeAssembler>(
        &self,
        assembler: &A,
        scale: bool,
    ) -> crate::error::Result<A::Volume> {
        let series = self.distinct_values(tags::SERIES_INSTANCE_UID)?;
        if series.len() != 1 {
            return Err(SelectionError::MultipleSeries {
                count: series.len(),
            }
            .into());
        }

        let names = self.tag_names()?;
        let sort_key = if names.contains(tags::SLICE_LOCATION) {
            Some(tags::SLICE_LOCATION)
        } else if names.contains(tags::INSTANCE_NUMBER) {
            Some(tags::INSTANCE_NUMBER)
        } else {
            warn!("no slice sort key available; file order is unspecified");
            None
        };

        let mut spec = self.spec([FILENAME_COL]);
        if let Some(key) = sort_key {
            // numeric cast: "10" must sort after "9"
            spec = spec.sort_by(key, true);
        }
        let files = self
            .index
            .store()
            .query_column(MAIN_TABLE, &spec)
            .map_err(SelectionError::from)?;
        let paths: Vec<PathBuf> = files
            .iter()
            .filter_map(|value| value.as_text())
            .map(|name| self.index.folder().join(name))
            .collect();

        let factor = if scale {
            match self.headers()?.first() {
                Some((_, header)) => match assembler.scale_factor(header) {
                    Ok(factor) => Some(factor),
                    Err(err) => {
                        warn!(%err, "scale prerequisite unmet, disabling scaling");
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        Ok(assembler.assemble(&paths, factor)?)
    }
}
