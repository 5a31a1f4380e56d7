//! Element value codec
//!
//! Converts a single primitive DICOM value to and from a storable
//! scalar. Every stored TEXT cell holds a JSON document so numbers and
//! strings round-trip unambiguously through one column type; elements
//! with a numeric VR and a single value are stored natively in INTEGER
//! or REAL columns instead.
//!
//! Per-VR behavior:
//! - DA/TM/DT normalize to fixed ISO text (see [`super::dates`]); empty
//!   values map to sentinels
//! - multi-valued elements become a JSON array of per-item scalars
//! - binary values (OB, OW, UN, ...) become hex text and decode back to
//!   bytes
//! - person names are stored as their string form
//! - AT values are stored as the integer `(group << 16) | element`
//! - everything else is JSON-encoded directly
//!
//! Decoding detects multi-valued data by the stored JSON shape (is it
//! an array), not by VM metadata; irregular files make VM unreliable,
//! so this stays a best-effort heuristic.

use crate::codec::dates;
use crate::db::store::{SqlType, StoredValue};
use crate::error::{CodecError, CodecResult};
use dicom::core::value::PrimitiveValue;
use dicom::core::{Tag, VR};
use serde_json::{json, Value as Json};
use smallvec::SmallVec;
use tracing::warn;

/// VRs whose values are integers
pub fn is_int_vr(vr: VR) -> bool {
    matches!(vr, VR::IS | VR::SL | VR::SS | VR::UL | VR::US | VR::SV | VR::UV)
}

/// VRs whose values are floating point
pub fn is_float_vr(vr: VR) -> bool {
    matches!(vr, VR::DS | VR::FL | VR::FD)
}

/// VRs carrying raw bytes
pub fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    )
}

/// SQLite column type for a tag with the given VR. Multi-valued data is
/// stored as JSON text regardless of VR, so the numeric hint only
/// applies to single values.
pub fn sql_type_for(vr: VR, multiplicity: u32) -> SqlType {
    if multiplicity > 1 {
        return SqlType::Text;
    }
    if is_int_vr(vr) {
        SqlType::Integer
    } else if is_float_vr(vr) {
        SqlType::Real
    } else {
        SqlType::Text
    }
}

pub(crate) fn fmt_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

fn convert_err(tag: Tag, vr: VR, reason: impl Into<String>) -> CodecError {
    CodecError::Convert {
        tag: fmt_tag(tag),
        vr: vr.to_string(),
        reason: reason.into(),
    }
}

/// Strip embedded NULs and padding whitespace from a text value
fn sanitize_text(s: &str) -> String {
    s.replace('\u{0000}', "").trim().to_string()
}

/// Collect the per-item string forms of a value, for string-shaped VRs
fn item_strings(value: &PrimitiveValue) -> Option<Vec<String>> {
    match value {
        PrimitiveValue::Str(s) => Some(vec![s.to_string()]),
        PrimitiveValue::Strs(ss) => Some(ss.iter().map(|s| s.to_string()).collect()),
        PrimitiveValue::Date(ds) => Some(ds.iter().map(|d| d.to_string()).collect()),
        PrimitiveValue::Time(ts) => Some(ts.iter().map(|t| t.to_string()).collect()),
        PrimitiveValue::DateTime(dts) => Some(dts.iter().map(|dt| dt.to_string()).collect()),
        _ => None,
    }
}

/// Collect the per-item integer forms of a value
fn item_ints(value: &PrimitiveValue) -> Option<Vec<i64>> {
    match value {
        PrimitiveValue::I16(v) => Some(v.iter().map(|x| i64::from(*x)).collect()),
        PrimitiveValue::U16(v) => Some(v.iter().map(|x| i64::from(*x)).collect()),
        PrimitiveValue::I32(v) => Some(v.iter().map(|x| i64::from(*x)).collect()),
        PrimitiveValue::U32(v) => Some(v.iter().map(|x| i64::from(*x)).collect()),
        PrimitiveValue::I64(v) => Some(v.to_vec()),
        PrimitiveValue::U64(v) => v.iter().map(|x| i64::try_from(*x).ok()).collect(),
        PrimitiveValue::Str(s) => s.trim().parse().ok().map(|x| vec![x]),
        PrimitiveValue::Strs(ss) => ss.iter().map(|s| s.trim().parse().ok()).collect(),
        _ => None,
    }
}

/// Collect the per-item float forms of a value
fn item_floats(value: &PrimitiveValue) -> Option<Vec<f64>> {
    match value {
        PrimitiveValue::F32(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
        PrimitiveValue::F64(v) => Some(v.to_vec()),
        PrimitiveValue::Str(s) => s.trim().parse().ok().map(|x| vec![x]),
        PrimitiveValue::Strs(ss) => ss.iter().map(|s| s.trim().parse().ok()).collect(),
        _ => item_ints(value).map(|v| v.into_iter().map(|x| x as f64).collect()),
    }
}

fn single_or_array(mut items: Vec<Json>) -> Json {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Json::Array(items)
    }
}

/// Encode a primitive value to its JSON form. Sequence values never
/// reach this function; the header codec handles them by recursion.
pub fn encode_json(value: &PrimitiveValue, tag: Tag, vr: VR) -> CodecResult<Json> {
    if matches!(value, PrimitiveValue::Empty) {
        return Ok(match vr {
            VR::DA => json!(dates::DATE_SENTINEL),
            VR::DT => json!(dates::DATETIME_SENTINEL),
            VR::TM => json!(dates::TIME_SENTINEL),
            _ if is_int_vr(vr) || is_float_vr(vr) => Json::Null,
            _ => json!(""),
        });
    }

    if vr == VR::DA {
        let items = item_strings(value)
            .ok_or_else(|| convert_err(tag, vr, "date value is not text"))?;
        let encoded = items
            .iter()
            .map(|raw| match dates::encode_date(raw) {
                Some(iso) => json!(iso),
                None => {
                    warn!(tag = %fmt_tag(tag), value = raw.as_str(), "unparseable date kept raw");
                    json!(raw)
                }
            })
            .collect();
        return Ok(single_or_array(encoded));
    }

    if vr == VR::TM {
        let items = item_strings(value)
            .ok_or_else(|| convert_err(tag, vr, "time value is not text"))?;
        let encoded = items
            .iter()
            .map(|raw| {
                if raw.is_empty() {
                    return json!(dates::TIME_SENTINEL);
                }
                match dates::encode_time(raw) {
                    Some(iso) => json!(iso),
                    None => {
                        warn!(tag = %fmt_tag(tag), value = raw.as_str(), "unparseable time kept raw");
                        json!(raw)
                    }
                }
            })
            .collect();
        return Ok(single_or_array(encoded));
    }

    if vr == VR::DT {
        let items = item_strings(value)
            .ok_or_else(|| convert_err(tag, vr, "datetime value is not text"))?;
        // unparseable datetimes keep the raw string; the wild disagrees
        // with the standard often enough that failing here loses data
        let encoded = items
            .iter()
            .map(|raw| {
                if raw.is_empty() {
                    return json!(dates::DATETIME_SENTINEL);
                }
                match dates::encode_datetime(raw) {
                    Some(iso) => json!(iso),
                    None => json!(raw),
                }
            })
            .collect();
        return Ok(single_or_array(encoded));
    }

    if vr == VR::AT {
        if let PrimitiveValue::Tags(tags) = value {
            let encoded = tags
                .iter()
                .map(|t| json!((u32::from(t.group()) << 16) | u32::from(t.element())))
                .collect();
            return Ok(single_or_array(encoded));
        }
        return Err(convert_err(tag, vr, "AT value is not a tag"));
    }

    if is_binary_vr(vr) {
        if let PrimitiveValue::U8(bytes) = value {
            return Ok(json!(hex::encode(bytes.as_slice())));
        }
        return Err(convert_err(tag, vr, "binary value is not raw bytes"));
    }

    if is_int_vr(vr) {
        let items =
            item_ints(value).ok_or_else(|| convert_err(tag, vr, "value is not an integer"))?;
        return Ok(single_or_array(items.into_iter().map(|x| json!(x)).collect()));
    }

    if is_float_vr(vr) {
        let items =
            item_floats(value).ok_or_else(|| convert_err(tag, vr, "value is not a number"))?;
        return Ok(single_or_array(items.into_iter().map(|x| json!(x)).collect()));
    }

    // PN and all remaining string-shaped VRs
    if let Some(items) = item_strings(value) {
        let encoded = items.iter().map(|s| json!(sanitize_text(s))).collect();
        return Ok(single_or_array(encoded));
    }

    // fallback: numeric data under a string VR
    if let Some(items) = item_floats(value) {
        return Ok(single_or_array(items.into_iter().map(|x| json!(x)).collect()));
    }

    Err(convert_err(tag, vr, "unsupported value shape"))
}

/// Encode a primitive value to a storable scalar. Single values with a
/// numeric VR go into numeric columns; everything else is JSON text.
pub fn encode(value: &PrimitiveValue, tag: Tag, vr: VR) -> CodecResult<StoredValue> {
    let encoded = encode_json(value, tag, vr)?;
    Ok(stored_from_json(encoded))
}

/// Lower a JSON-encoded value into a storable scalar
pub fn stored_from_json(encoded: Json) -> StoredValue {
    match encoded {
        Json::Null => StoredValue::Null,
        Json::Number(n) if n.is_i64() => StoredValue::Int(n.as_i64().unwrap_or_default()),
        Json::Number(n) => StoredValue::Real(n.as_f64().unwrap_or_default()),
        other => StoredValue::Text(other.to_string()),
    }
}

fn ints_to_value(vr: VR, tag: Tag, items: Vec<i64>) -> CodecResult<PrimitiveValue> {
    fn collect<T: TryFrom<i64>>(items: Vec<i64>) -> Option<SmallVec<[T; 2]>> {
        items.into_iter().map(|x| T::try_from(x).ok()).collect()
    }
    let overflow = || convert_err(tag, vr, "stored integer out of range for VR");
    Ok(match vr {
        VR::SS => PrimitiveValue::I16(collect(items).ok_or_else(overflow)?),
        VR::US => PrimitiveValue::U16(collect(items).ok_or_else(overflow)?),
        VR::UL => PrimitiveValue::U32(collect(items).ok_or_else(overflow)?),
        VR::UV => PrimitiveValue::U64(collect(items).ok_or_else(overflow)?),
        VR::SL | VR::IS => PrimitiveValue::I32(collect(items).ok_or_else(overflow)?),
        _ => PrimitiveValue::I64(items.into_iter().collect()),
    })
}

fn floats_to_value(vr: VR, items: Vec<f64>) -> PrimitiveValue {
    match vr {
        VR::FL => PrimitiveValue::F32(items.into_iter().map(|x| x as f32).collect()),
        _ => PrimitiveValue::F64(items.into_iter().collect()),
    }
}

/// Decode a JSON-encoded value back into a primitive value. A JSON
/// array fans out into a multi-valued primitive.
pub fn decode_json(encoded: &Json, tag: Tag, vr: VR) -> CodecResult<PrimitiveValue> {
    // multi-value heuristic: stored shape decides, not VM metadata
    if let Json::Array(items) = encoded {
        return decode_items(items, tag, vr);
    }
    decode_items(std::slice::from_ref(encoded), tag, vr)
}

fn decode_items(items: &[Json], tag: Tag, vr: VR) -> CodecResult<PrimitiveValue> {
    if items.is_empty() {
        return Ok(PrimitiveValue::Empty);
    }

    let type_err = |reason: &str| convert_err(tag, vr, reason);

    match vr {
        VR::DA => {
            let decoded: Vec<String> = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(dates::decode_date)
                        .ok_or_else(|| type_err("stored date is not text"))
                })
                .collect::<CodecResult<_>>()?;
            Ok(strings_to_value(decoded))
        }
        VR::TM => {
            let decoded: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Json::Number(n) if n.as_i64() == Some(dates::TIME_SENTINEL) => {
                        Ok(String::new())
                    }
                    Json::String(s) => Ok(dates::decode_time(s)),
                    _ => Err(type_err("stored time is neither text nor sentinel")),
                })
                .collect::<CodecResult<_>>()?;
            Ok(strings_to_value(decoded))
        }
        VR::DT => {
            let decoded: Vec<String> = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(dates::decode_datetime)
                        .ok_or_else(|| type_err("stored datetime is not text"))
                })
                .collect::<CodecResult<_>>()?;
            Ok(strings_to_value(decoded))
        }
        VR::AT => {
            let tags: SmallVec<[Tag; 2]> = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .map(|n| Tag((n >> 16) as u16, (n & 0xFFFF) as u16))
                        .ok_or_else(|| type_err("stored AT value is not an integer"))
                })
                .collect::<CodecResult<_>>()?;
            Ok(PrimitiveValue::Tags(tags))
        }
        _ if is_binary_vr(vr) => {
            // bytes, not a decoded string: the lossless reading
            let text = items[0]
                .as_str()
                .ok_or_else(|| type_err("stored binary value is not hex text"))?;
            let bytes = hex::decode(text)?;
            Ok(PrimitiveValue::U8(bytes.into_iter().collect()))
        }
        _ if is_int_vr(vr) => {
            let ints: Vec<i64> = items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .ok_or_else(|| type_err("stored value is not an integer"))
                })
                .collect::<CodecResult<_>>()?;
            ints_to_value(vr, tag, ints)
        }
        _ if is_float_vr(vr) => {
            let floats: Vec<f64> = items
                .iter()
                .map(|item| {
                    item.as_f64()
                        .ok_or_else(|| type_err("stored value is not a number"))
                })
                .collect::<CodecResult<_>>()?;
            Ok(floats_to_value(vr, floats))
        }
        _ => {
            let strings: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Json::String(s) => Ok(s.clone()),
                    Json::Number(n) => Ok(n.to_string()),
                    Json::Null => Ok(String::new()),
                    _ => Err(type_err("stored value has an unexpected shape")),
                })
                .collect::<CodecResult<_>>()?;
            Ok(strings_to_value(strings))
        }
    }
}

fn strings_to_value(mut items: Vec<String>) -> PrimitiveValue {
    if items.len() == 1 {
        PrimitiveValue::Str(items.remove(0))
    } else {
        PrimitiveValue::Strs(items.into_iter().collect())
    }
}

/// Decode a storable scalar back into a primitive value
pub fn decode(stored: &StoredValue, tag: Tag, vr: VR) -> CodecResult<PrimitiveValue> {
    match stored {
        StoredValue::Null => Ok(PrimitiveValue::Empty),
        StoredValue::Int(v) => decode_json(&json!(v), tag, vr),
        StoredValue::Real(v) => decode_json(&json!(v), tag, vr),
        StoredValue::Text(text) => {
            let parsed: Json = serde_json::from_str(text).map_err(|_| CodecError::Stored {
                column: fmt_tag(tag),
                reason: format!("not valid JSON: {text}"),
            })?;
            decode_json(&parsed, tag, vr)
        }
    }
}
