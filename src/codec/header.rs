//! Header codec
//!
//! Converts a whole DICOM header to and from a flat mapping of encoded
//! tag name to storable value. Iterates elements in their native order,
//! always skips pixel data, skips private tags unless asked, and skips
//! any single element whose value fails to convert (with a warning)
//! rather than losing the whole header. Sequence elements are encoded
//! by recursion: each item becomes a nested JSON object inside one
//! column value.

use crate::codec::tag_names::{is_private, TagDictionary};
use crate::codec::value;
use crate::db::store::{SqlType, StoredValue};
use crate::error::{CodecError, CodecResult};
use dicom::core::header::Header as _;
use dicom::core::value::{DataSetSequence, PrimitiveValue, Value};
use dicom::core::{DataElement, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Flat row mapping: encoded tag name to storable value
pub type RowMap = BTreeMap<String, StoredValue>;

/// Result of encoding one header: the row values plus the SQL column
/// type hint for each tag
#[derive(Debug, Default)]
pub struct EncodedHeader {
    pub values: RowMap,
    pub types: BTreeMap<String, SqlType>,
}

impl EncodedHeader {
    /// Tag names present in this header, in column order
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Bidirectional header converter. The tag dictionary is supplied at
/// construction and shared by reference across codecs.
#[derive(Debug, Clone)]
pub struct HeaderCodec {
    dict: Arc<TagDictionary>,
}

impl HeaderCodec {
    pub fn new(dict: Arc<TagDictionary>) -> Self {
        Self { dict }
    }

    pub fn dictionary(&self) -> &TagDictionary {
        &self.dict
    }

    /// Encode a header into a flat mapping. Single elements that fail
    /// to convert are skipped with a warning; partial capture beats
    /// losing the file.
    pub fn encode(&self, obj: &InMemDicomObject, include_private: bool) -> EncodedHeader {
        let mut encoded = EncodedHeader::default();
        for (name, json, sql_type) in self.encode_elements(obj, include_private) {
            encoded.types.insert(name.clone(), sql_type);
            encoded.values.insert(name, value::stored_from_json(json));
        }
        encoded
    }

    /// Encode a header into a JSON object; used for sequence items
    fn encode_nested(&self, obj: &InMemDicomObject, include_private: bool) -> Json {
        let mut map = JsonMap::new();
        for (name, json, _) in self.encode_elements(obj, include_private) {
            map.insert(name, json);
        }
        Json::Object(map)
    }

    fn encode_elements(
        &self,
        obj: &InMemDicomObject,
        include_private: bool,
    ) -> Vec<(String, Json, SqlType)> {
        let mut out = Vec::new();
        for element in obj.iter() {
            let tag = element.tag();
            if tag == tags::PIXEL_DATA {
                continue; // never indexed
            }
            if is_private(tag) && !include_private {
                continue;
            }
            match self.encode_element(element, include_private) {
                Ok(Some(entry)) => out.push(entry),
                Ok(None) => {}
                Err(err) => {
                    warn!(tag = %value::fmt_tag(tag), %err, "skipping element");
                }
            }
        }
        out
    }

    fn encode_element(
        &self,
        element: &dicom::object::mem::InMemElement,
        include_private: bool,
    ) -> CodecResult<Option<(String, Json, SqlType)>> {
        let tag = element.tag();
        let vr = element.vr();

        match element.value() {
            Value::Primitive(primitive) => {
                let multiplicity = primitive.multiplicity();
                let name = self.dict.encode_name(tag, vr, multiplicity.max(1));
                let json = value::encode_json(primitive, tag, vr)?;
                Ok(Some((name, json, value::sql_type_for(vr, multiplicity))))
            }
            Value::Sequence(sequence) => {
                let items: Vec<Json> = sequence
                    .items()
                    .iter()
                    .map(|item| self.encode_nested(item, include_private))
                    .collect();
                let name = self.dict.encode_name(tag, VR::SQ, 1);
                Ok(Some((name, Json::Array(items), SqlType::Text)))
            }
            // encapsulated pixel data, never indexed
            Value::PixelSequence(_) => Ok(None),
        }
    }

    /// Decode a flat row mapping back into a header-like object.
    /// Columns that fail to decode are skipped with a warning, matching
    /// the encode-side policy.
    pub fn decode(&self, row: &RowMap) -> DecodedHeader {
        let mut entries = BTreeMap::new();
        for (name, stored) in row {
            if stored.is_null() {
                continue;
            }
            match self.decode_entry(name, stored) {
                Ok(decoded) => {
                    entries.insert(name.clone(), decoded);
                }
                Err(err) => {
                    warn!(column = name.as_str(), %err, "skipping stored value");
                }
            }
        }
        DecodedHeader { entries }
    }

    /// Decode one stored column value
    pub fn decode_entry(&self, name: &str, stored: &StoredValue) -> CodecResult<DecodedValue> {
        let (tag, vr) = self.dict.resolve_name(name)?;
        if vr == VR::SQ {
            let text = stored.as_text().ok_or_else(|| CodecError::Stored {
                column: name.to_string(),
                reason: "sequence column does not hold text".to_string(),
            })?;
            let parsed: Json = serde_json::from_str(text)?;
            return self.decode_sequence(name, &parsed);
        }
        Ok(DecodedValue::Primitive(value::decode(stored, tag, vr)?))
    }

    fn decode_sequence(&self, name: &str, parsed: &Json) -> CodecResult<DecodedValue> {
        let items = parsed.as_array().ok_or_else(|| CodecError::Stored {
            column: name.to_string(),
            reason: "sequence column does not hold a JSON array".to_string(),
        })?;
        let mut decoded_items = Vec::with_capacity(items.len());
        for item in items {
            let object = item.as_object().ok_or_else(|| CodecError::Stored {
                column: name.to_string(),
                reason: "sequence item is not a JSON object".to_string(),
            })?;
            let mut entries = BTreeMap::new();
            for (child_name, child_json) in object {
                let (tag, vr) = self.dict.resolve_name(child_name)?;
                let decoded = if vr == VR::SQ {
                    self.decode_sequence(child_name, child_json)?
                } else {
                    DecodedValue::Primitive(value::decode_json(child_json, tag, vr)?)
                };
                entries.insert(child_name.clone(), decoded);
            }
            decoded_items.push(DecodedHeader { entries });
        }
        Ok(DecodedValue::Sequence(decoded_items))
    }
}

/// A decoded column value: a primitive, or a list of nested headers for
/// sequence columns
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Primitive(PrimitiveValue),
    Sequence(Vec<DecodedHeader>),
}

impl DecodedValue {
    /// String form of a primitive value
    pub fn to_text(&self) -> Option<String> {
        match self {
            DecodedValue::Primitive(p) => Some(p.to_str().into_owned()),
            DecodedValue::Sequence(_) => None,
        }
    }

    /// Numeric form of a primitive value
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Primitive(PrimitiveValue::F32(v)) => v.first().map(|x| f64::from(*x)),
            DecodedValue::Primitive(PrimitiveValue::F64(v)) => v.first().copied(),
            DecodedValue::Primitive(PrimitiveValue::I16(v)) => v.first().map(|x| f64::from(*x)),
            DecodedValue::Primitive(PrimitiveValue::U16(v)) => v.first().map(|x| f64::from(*x)),
            DecodedValue::Primitive(PrimitiveValue::I32(v)) => v.first().map(|x| f64::from(*x)),
            DecodedValue::Primitive(PrimitiveValue::U32(v)) => v.first().map(|x| f64::from(*x)),
            DecodedValue::Primitive(PrimitiveValue::I64(v)) => v.first().map(|x| *x as f64),
            DecodedValue::Primitive(PrimitiveValue::U64(v)) => v.first().map(|x| *x as f64),
            DecodedValue::Primitive(PrimitiveValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A decoded header: an explicit keys/get value type, usable where the
/// original file's header would be
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedHeader {
    entries: BTreeMap<String, DecodedValue>,
}

impl DecodedHeader {
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// String form of a primitive entry
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(DecodedValue::to_text)
    }

    /// Numeric form of a primitive entry
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(DecodedValue::to_f64)
    }

    /// Items of a sequence entry
    pub fn get_sequence(&self, name: &str) -> Option<&[DecodedHeader]> {
        match self.get(name) {
            Some(DecodedValue::Sequence(items)) => Some(items),
            _ => None,
        }
    }

    /// Rebuild a DICOM object from the decoded entries, for handing to
    /// a DICOM writer. Names that no longer resolve are skipped with a
    /// warning.
    pub fn to_object(&self, dict: &TagDictionary) -> InMemDicomObject {
        let mut elements: Vec<dicom::object::mem::InMemElement> = Vec::new();
        for (name, decoded) in &self.entries {
            let (tag, vr) = match dict.resolve_name(name) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(column = name.as_str(), %err, "skipping unresolvable tag");
                    continue;
                }
            };
            match decoded {
                DecodedValue::Primitive(primitive) => {
                    elements.push(DataElement::new(tag, vr, primitive.clone()));
                }
                DecodedValue::Sequence(items) => {
                    let objects: Vec<InMemDicomObject> =
                        items.iter().map(|item| item.to_object(dict)).collect();
                    elements.push(DataElement::new(
                        tag,
                        VR::SQ,
                        DataSetSequence::from(objects),
                    ));
                }
            }
        }
        InMemDicomObject::from_element_iter(elements)
    }
}

impl From<PrimitiveValue> for DecodedValue {
    fn from(value: PrimitiveValue) -> Self {
        DecodedValue::Primitive(value)
    }
}
