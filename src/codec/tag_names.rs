//! Encoded tag names
//!
//! Every indexed element is stored in a column named after its tag.
//! Public tags use the dictionary keyword (`PatientID`). Private and
//! unrecognized tags get a name synthesized from (group, element, VR,
//! multiplicity) so decoding can recover the tag and VR without a side
//! table: `Private_0029_1010_LO_1`. Synthesized names are sanitized to
//! valid SQL identifiers; spaces and any other illegal characters become
//! underscores.

use crate::error::{CodecError, CodecResult};
use dicom::core::dictionary::{DataDictionary, TagRange};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;

/// Prefix for synthesized private-tag column names
const PRIVATE_PREFIX: &str = "Private";

/// All value representations, for code-to-VR lookup
const ALL_VRS: &[VR] = &[
    VR::AE,
    VR::AS,
    VR::AT,
    VR::CS,
    VR::DA,
    VR::DS,
    VR::DT,
    VR::FL,
    VR::FD,
    VR::IS,
    VR::LO,
    VR::LT,
    VR::OB,
    VR::OD,
    VR::OF,
    VR::OL,
    VR::OV,
    VR::OW,
    VR::PN,
    VR::SH,
    VR::SL,
    VR::SQ,
    VR::SS,
    VR::ST,
    VR::SV,
    VR::TM,
    VR::UC,
    VR::UI,
    VR::UL,
    VR::UN,
    VR::UR,
    VR::US,
    VR::UT,
    VR::UV,
];

/// Look up a VR by its two-letter code
pub fn vr_by_code(code: &str) -> Option<VR> {
    ALL_VRS.iter().copied().find(|vr| vr.to_string() == code)
}

/// True for odd-group (vendor-specific) tags
pub fn is_private(tag: Tag) -> bool {
    tag.group() % 2 == 1
}

/// Replace every character that is illegal in a SQL identifier with an
/// underscore
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Tag-keyword lookup table used by the header codec. Constructed once
/// by the surrounding application and shared by reference; this is a
/// thin, explicit wrapper over the standard data dictionary rather than
/// a process-wide singleton.
#[derive(Debug, Default, Clone)]
pub struct TagDictionary {
    inner: StandardDataDictionary,
}

impl TagDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary keyword for a public tag, if it has one
    pub fn keyword_for(&self, tag: Tag) -> Option<&'static str> {
        self.inner.by_tag(tag).map(|entry| entry.alias)
    }

    /// Tag and VR for a public keyword, if the dictionary knows it
    pub fn entry_for(&self, keyword: &str) -> Option<(Tag, VR)> {
        let entry = self.inner.by_name(keyword)?;
        match entry.tag {
            TagRange::Single(tag) => Some((tag, entry.vr.relaxed())),
            _ => None,
        }
    }

    /// Derive the column name for an element. Public tags use their
    /// keyword; private and unrecognized tags get a synthesized name.
    pub fn encode_name(&self, tag: Tag, vr: VR, multiplicity: u32) -> String {
        if !is_private(tag) {
            if let Some(keyword) = self.keyword_for(tag) {
                return sanitize_identifier(keyword);
            }
        }
        synthesize_name(tag, vr, multiplicity)
    }

    /// Recover (tag, VR) from a column name; the reverse of
    /// [`encode_name`](Self::encode_name)
    pub fn resolve_name(&self, name: &str) -> CodecResult<(Tag, VR)> {
        if let Some((tag, vr, _vm)) = parse_synthesized_name(name) {
            return Ok((tag, vr));
        }
        self.entry_for(name)
            .ok_or_else(|| CodecError::UnknownTagName(name.to_string()))
    }
}

/// Build a deterministic column name for a tag outside the public
/// dictionary
pub fn synthesize_name(tag: Tag, vr: VR, multiplicity: u32) -> String {
    let name = format!(
        "{}_{:04X}_{:04X}_{}_{}",
        PRIVATE_PREFIX,
        tag.group(),
        tag.element(),
        vr.to_string(),
        multiplicity
    );
    sanitize_identifier(&name)
}

/// Parse a synthesized name back into (tag, VR, multiplicity). Returns
/// `None` for names that are not in the synthesized format.
pub fn parse_synthesized_name(name: &str) -> Option<(Tag, VR, u32)> {
    let mut parts = name.split('_');
    if parts.next()? != PRIVATE_PREFIX {
        return None;
    }
    let group = u16::from_str_radix(parts.next()?, 16).ok()?;
    let element = u16::from_str_radix(parts.next()?, 16).ok()?;
    let vr = vr_by_code(parts.next()?)?;
    let vm: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((Tag(group, element), vr, vm))
}
