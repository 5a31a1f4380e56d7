//! Volume assembly collaborator
//!
//! Pixel reconstruction is external: the selection facade hands a
//! sorted absolute file list to a [`VolumeAssembler`] and stays out of
//! the pixel business. The SUV scale-factor computation lives here
//! because it only needs the decoded header; assemblers may override
//! it.

use crate::codec::DecodedHeader;
use crate::codec::dates;
use crate::error::{VolumeError, VolumeResult};
use crate::tags;
use std::path::PathBuf;

/// Builds a volume from an ordered list of files belonging to one
/// series
pub trait VolumeAssembler {
    type Volume;

    /// Assemble the files into a volume, applying the scale factor
    /// when one is supplied
    fn assemble(&self, files: &[PathBuf], scale_factor: Option<f64>)
        -> VolumeResult<Self::Volume>;

    /// Scale factor to apply to pixel values; the default computes the
    /// PET SUV factor from the decoded header
    fn scale_factor(&self, header: &DecodedHeader) -> VolumeResult<f64> {
        suv_scale_factor(header)
    }
}

fn require_text(header: &DecodedHeader, name: &str) -> VolumeResult<String> {
    header
        .get_text(name)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| VolumeError::MissingPrerequisite(name.to_string()))
}

fn require_f64(header: &DecodedHeader, name: &str) -> VolumeResult<f64> {
    header
        .get_f64(name)
        .ok_or_else(|| VolumeError::MissingPrerequisite(name.to_string()))
}

/// SUV scale factor (Bq/cc to SUV) from the information in a PET
/// header: decay-corrected dose over patient weight
pub fn suv_scale_factor(header: &DecodedHeader) -> VolumeResult<f64> {
    let nuclide_info = header
        .get_sequence(tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE)
        .and_then(|items| items.first())
        .ok_or_else(|| {
            VolumeError::MissingPrerequisite(
                tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE.to_string(),
            )
        })?;

    let series_date = require_text(header, tags::SERIES_DATE)?;
    let series_time = require_text(header, tags::SERIES_TIME)?;
    let injection_time = require_text(nuclide_info, tags::RADIOPHARMACEUTICAL_START_TIME)?;
    let dose = require_f64(nuclide_info, tags::RADIONUCLIDE_TOTAL_DOSE)?;
    let half_life = require_f64(nuclide_info, tags::RADIONUCLIDE_HALF_LIFE)?;
    let weight = require_f64(header, tags::PATIENT_WEIGHT)?;

    let date = dates::parse_date(&series_date)
        .ok_or_else(|| VolumeError::MissingPrerequisite(tags::SERIES_DATE.to_string()))?;
    let series = dates::parse_time(&series_time)
        .map(|time| date.and_time(time))
        .ok_or_else(|| VolumeError::MissingPrerequisite(tags::SERIES_TIME.to_string()))?;
    // injections are recorded against the series date
    let injection = dates::parse_time(&injection_time)
        .map(|time| date.and_time(time))
        .ok_or_else(|| {
            VolumeError::MissingPrerequisite(tags::RADIOPHARMACEUTICAL_START_TIME.to_string())
        })?;

    let delta_seconds = (series - injection).num_milliseconds() as f64 / 1000.0;
    let decay_correction = 0.5_f64.powf(delta_seconds / half_life);

    Ok((weight * 1000.0) / (decay_correction * dose))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{HeaderCodec, TagDictionary};
    use dicom::core::value::{DataSetSequence, PrimitiveValue};
    use dicom::core::{DataElement, VR};
    use dicom::dictionary_std::tags as std_tags;
    use dicom::object::InMemDicomObject;
    use smallvec::smallvec;
    use std::sync::Arc;

    fn pet_header() -> DecodedHeader {
        let nuclide = InMemDicomObject::from_element_iter([
            DataElement::new(
                std_tags::RADIOPHARMACEUTICAL_START_TIME,
                VR::TM,
                PrimitiveValue::from("100000"),
            ),
            DataElement::new(
                std_tags::RADIONUCLIDE_TOTAL_DOSE,
                VR::DS,
                PrimitiveValue::F64(smallvec![4.2e8]),
            ),
            DataElement::new(
                std_tags::RADIONUCLIDE_HALF_LIFE,
                VR::DS,
                PrimitiveValue::F64(smallvec![6586.2]),
            ),
        ]);
        let obj = InMemDicomObject::from_element_iter([
            DataElement::new(std_tags::SERIES_DATE, VR::DA, PrimitiveValue::from("20200101")),
            DataElement::new(std_tags::SERIES_TIME, VR::TM, PrimitiveValue::from("110000")),
            DataElement::new(
                std_tags::PATIENT_WEIGHT,
                VR::DS,
                PrimitiveValue::F64(smallvec![75.0]),
            ),
            DataElement::new(
                std_tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![nuclide]),
            ),
        ]);
        let codec = HeaderCodec::new(Arc::new(TagDictionary::new()));
        let encoded = codec.encode(&obj, false);
        codec.decode(&encoded.values)
    }

    #[test]
    fn test_suv_scale_factor() {
        let factor = suv_scale_factor(&pet_header()).unwrap();
        // one hour decay of F-18: decay correction ~ 0.5^(3600/6586.2)
        let decay = 0.5_f64.powf(3600.0 / 6586.2);
        let expected = 75.0 * 1000.0 / (decay * 4.2e8);
        assert!((factor - expected).abs() < 1e-12);
    }

    #[test]
    fn test_missing_prerequisite() {
        let codec = HeaderCodec::new(Arc::new(TagDictionary::new()));
        let obj = InMemDicomObject::from_element_iter([DataElement::new(
            std_tags::SERIES_DATE,
            VR::DA,
            PrimitiveValue::from("20200101"),
        )]);
        let encoded = codec.encode(&obj, false);
        let header = codec.decode(&encoded.values);

        let err = suv_scale_factor(&header).unwrap_err();
        assert!(matches!(err, VolumeError::MissingPrerequisite(_)));
    }
}
