//! Date, time and datetime normalization
//!
//! DICOM encodes dates and times in compact numeric text (`20200101`,
//! `123456.789`). Stored values use fixed-width ISO text instead so that
//! lexical sort order matches chronological order. Empty values map to
//! sentinels that sort before every real value; decoding maps the
//! sentinels back to the empty string and otherwise reformats to the
//! compact numeric form.
//!
//! Datetime strings are inconsistently formatted in the wild, so parsing
//! is permissive and falls back to keeping the raw string rather than
//! failing. That policy is deliberate.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

/// Stored form of an empty DA value; sorts before all real dates
pub const DATE_SENTINEL: &str = "1800-01-01";

/// Stored form of an empty DT value
pub const DATETIME_SENTINEL: &str = "1800-01-01T00:00:00";

/// Stored form of an empty TM value. Times compare numerically in some
/// legacy encodings, so the sentinel is a number rather than a date.
pub const TIME_SENTINEL: i64 = -1;

const DATE_FORMATS: &[&str] = &["%Y%m%d"];
const TIME_FORMATS: &[&str] = &["%H%M%S%.f", "%H%M%S", "%H%M", "%H"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y%m%d%H%M%S%.f",
    "%Y%m%d%H%M%S",
    "%Y%m%d%H%M",
    "%Y%m%d",
];
const DATETIME_TZ_FORMATS: &[&str] = &["%Y%m%d%H%M%S%.f%z", "%Y%m%d%H%M%S%z"];

/// Strip the separators permitted in ISO renditions of DICOM values so
/// that both `20200101` and `2020-01-01` parse with one format table.
fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | ':' | 'T' | ' '))
        .collect()
}

/// Split a trailing UTC offset (`+0200`, `-05:00`) off a datetime string.
/// Offsets start at index 8 or later; earlier `-` characters are date
/// separators.
fn split_offset(raw: &str) -> (&str, Option<String>) {
    if let Some(pos) = raw.rfind(['+', '-']) {
        if pos >= 8 {
            let tail: String = raw[pos + 1..].chars().filter(|c| *c != ':').collect();
            if tail.len() == 4 && tail.chars().all(|c| c.is_ascii_digit()) {
                let sign = &raw[pos..pos + 1];
                return (&raw[..pos], Some(format!("{sign}{tail}")));
            }
        }
    }
    (raw, None)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = compact(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&value, fmt).ok())
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let value = compact(raw);
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&value, fmt).ok())
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let (body, _) = split_offset(raw);
    let value = compact(body);
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&value, fmt).ok())
        .or_else(|| parse_date(&value).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Encode a DA value to fixed-width ISO text. `None` when the input does
/// not parse as a date.
pub fn encode_date(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return Some(DATE_SENTINEL.to_string());
    }
    parse_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Decode stored ISO date text back to the compact numeric form; the
/// sentinel decodes to the empty string.
pub fn decode_date(stored: &str) -> String {
    if stored == DATE_SENTINEL {
        return String::new();
    }
    match NaiveDate::parse_from_str(stored, "%Y-%m-%d") {
        Ok(d) => d.format("%Y%m%d").to_string(),
        Err(_) => stored.to_string(),
    }
}

/// Encode a TM value to ISO time text. The fractional part is kept only
/// when the source carries one, so round-trips preserve the original
/// precision.
pub fn encode_time(raw: &str) -> Option<String> {
    let time = parse_time(raw)?;
    let fmt = if raw.contains('.') {
        "%H:%M:%S%.6f"
    } else {
        "%H:%M:%S"
    };
    Some(time.format(fmt).to_string())
}

/// Decode stored ISO time text back to the compact numeric form
pub fn decode_time(stored: &str) -> String {
    let time = match NaiveTime::parse_from_str(stored, "%H:%M:%S%.f") {
        Ok(t) => t,
        Err(_) => return stored.to_string(),
    };
    let fmt = if stored.contains('.') {
        "%H%M%S%.6f"
    } else {
        "%H%M%S"
    };
    time.format(fmt).to_string()
}

/// Encode a DT value to ISO datetime text, preserving a UTC offset when
/// one is present. `None` when the input does not parse; the caller then
/// stores the raw string unchanged.
pub fn encode_datetime(raw: &str) -> Option<String> {
    let (body, offset) = split_offset(raw);

    if let Some(offset) = offset {
        let value = format!("{}{}", compact(body), offset);
        if let Some(dt) = DATETIME_TZ_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(&value, fmt).ok())
        {
            let fmt = if body.contains('.') {
                "%Y-%m-%dT%H:%M:%S%.6f%z"
            } else {
                "%Y-%m-%dT%H:%M:%S%z"
            };
            return Some(dt.format(fmt).to_string());
        }
        return None;
    }

    let dt = parse_datetime(body)?;
    let fmt = if body.contains('.') {
        "%Y-%m-%dT%H:%M:%S%.6f"
    } else {
        "%Y-%m-%dT%H:%M:%S"
    };
    Some(dt.format(fmt).to_string())
}

/// Decode stored ISO datetime text back to the compact numeric form.
/// Strings that were stored raw (the leniency fallback) pass through
/// unchanged.
pub fn decode_datetime(stored: &str) -> String {
    if stored == DATETIME_SENTINEL {
        return String::new();
    }

    let fraction = stored.contains('.');

    if let Ok(dt) = DateTime::parse_from_str(stored, "%Y-%m-%dT%H:%M:%S%.f%z") {
        let fmt = if fraction {
            "%Y%m%d%H%M%S%.6f%z"
        } else {
            "%Y%m%d%H%M%S%z"
        };
        return dt.format(fmt).to_string();
    }

    match NaiveDateTime::parse_from_str(stored, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(dt) => {
            let fmt = if fraction {
                "%Y%m%d%H%M%S%.6f"
            } else {
                "%Y%m%d%H%M%S"
            };
            dt.format(fmt).to_string()
        }
        Err(_) => {
            warn!(value = stored, "unparseable stored datetime, passing through");
            stored.to_string()
        }
    }
}
