//! Well-known DICOM tag names
//!
//! Keyword constants for the tags the indexer itself consults: identity
//! tags for the per-level counts, sort keys for slice ordering, and the
//! PET tags needed for SUV scale-factor computation. Everything else is
//! discovered dynamically from the files.

// Patient level
pub const PATIENT_NAME: &str = "PatientName";
pub const PATIENT_ID: &str = "PatientID";
pub const PATIENT_BIRTH_DATE: &str = "PatientBirthDate";
pub const PATIENT_SEX: &str = "PatientSex";
pub const PATIENT_WEIGHT: &str = "PatientWeight";

// Study level
pub const STUDY_DESCRIPTION: &str = "StudyDescription";
pub const STUDY_INSTANCE_UID: &str = "StudyInstanceUID";
pub const ACCESSION_NUMBER: &str = "AccessionNumber";
pub const STUDY_DATE: &str = "StudyDate";
pub const STUDY_TIME: &str = "StudyTime";

// Series level
pub const SERIES_DESCRIPTION: &str = "SeriesDescription";
pub const SERIES_INSTANCE_UID: &str = "SeriesInstanceUID";
pub const SERIES_DATE: &str = "SeriesDate";
pub const SERIES_TIME: &str = "SeriesTime";
pub const MODALITY: &str = "Modality";
pub const ACQUISITION_NUMBER: &str = "AcquisitionNumber";

// Instance level
pub const SOP_INSTANCE_UID: &str = "SOPInstanceUID";
pub const SOP_CLASS_UID: &str = "SOPClassUID";
pub const INSTANCE_NUMBER: &str = "InstanceNumber";

// Slice ordering
pub const SLICE_LOCATION: &str = "SliceLocation";

// PET / SUV scaling
pub const RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE: &str =
    "RadiopharmaceuticalInformationSequence";
pub const RADIOPHARMACEUTICAL_START_TIME: &str = "RadiopharmaceuticalStartTime";
pub const RADIONUCLIDE_TOTAL_DOSE: &str = "RadionuclideTotalDose";
pub const RADIONUCLIDE_HALF_LIFE: &str = "RadionuclideHalfLife";
pub const RESCALE_INTERCEPT: &str = "RescaleIntercept";
pub const RESCALE_SLOPE: &str = "RescaleSlope";
