//! Integration tests for minidicom
//!
//! These tests build real DICOM files in temporary folders with the
//! `dicom` crate, index them, and exercise scanning, reconciliation,
//! selection and volume entry points end to end.

use dicom::core::value::{DataSetSequence, PrimitiveValue};
use dicom::core::{DataElement, Tag, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use minidicom::error::VolumeResult;
use minidicom::{DicomIndex, IndexConfig, VolumeAssembler};
use smallvec::smallvec;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_object(folder: &Path, name: &str, sop_uid: &str, obj: InMemDicomObject) -> PathBuf {
    let path = folder.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file_obj = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_uid)
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
        )
        .unwrap();
    file_obj.write_to_file(&path).unwrap();
    path
}

fn basic_object(patient_id: &str, series_uid: &str, sop_uid: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(
            uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
        )),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop_uid)),
        DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(patient_id)),
        DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.1"),
        ),
        DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(series_uid),
        ),
        DataElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20200101")),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
    ])
}

fn open_index(folder: &Path) -> DicomIndex {
    DicomIndex::open(IndexConfig::new(folder).in_memory().silent(true)).unwrap()
}

#[test]
fn test_empty_folder() {
    let dir = tempdir().unwrap();
    let mut index = open_index(dir.path());

    let outcome = index.scan().unwrap();
    assert_eq!(outcome.found, 0);
    assert_eq!(outcome.added, 0);
    assert_eq!(index.file_count().unwrap(), 0);
    assert!(index.tag_names().unwrap().is_empty());
}

#[test]
fn test_single_file() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("123", "2.1", "1.1"));

    let mut index = open_index(dir.path());
    let outcome = index.scan().unwrap();
    assert_eq!(outcome.added, 1);

    assert_eq!(index.files().unwrap(), vec![PathBuf::from("a.dcm")]);
    let tag_names = index.tag_names().unwrap();
    assert!(tag_names.contains(&"PatientID".to_string()));
    assert!(tag_names.contains(&"StudyDate".to_string()));

    let selection = index.select();
    let value = selection.single_value("PatientID").unwrap();
    assert_eq!(value.to_text().unwrap(), "123");
}

#[test]
fn test_non_dicom_file_goes_to_aux_table() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let mut index = open_index(dir.path());
    let outcome = index.scan().unwrap();
    assert_eq!(outcome.non_dicom, 1);
    assert_eq!(outcome.added, 0);

    assert_eq!(index.file_count().unwrap(), 0);
    assert_eq!(
        index.attempted_files().unwrap(),
        vec![PathBuf::from("notes.txt")]
    );

    // a second scan must not re-attempt the file
    let outcome = index.scan().unwrap();
    assert_eq!(outcome.non_dicom, 0);
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.removed, 0);
    assert_eq!(index.attempted_files().unwrap().len(), 1);
}

#[test]
fn test_rescan_is_idempotent() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("123", "2.1", "1.1"));
    write_object(dir.path(), "b.dcm", "1.2", basic_object("123", "2.1", "1.2"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    let files_before = index.files().unwrap();
    let columns_before = index.tag_names().unwrap();

    let outcome = index.scan().unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.removed, 0);
    assert_eq!(index.files().unwrap(), files_before);
    assert_eq!(index.tag_names().unwrap(), columns_before);
}

#[test]
fn test_reconciliation_adds_and_removes() {
    let dir = tempdir().unwrap();
    let a = write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));
    write_object(dir.path(), "b.dcm", "1.2", basic_object("p", "2.1", "1.2"));
    write_object(dir.path(), "c.dcm", "1.3", basic_object("p", "2.1", "1.3"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    assert_eq!(index.file_count().unwrap(), 3);

    // known {a,b,c}, found {b,c,d}
    fs::remove_file(a).unwrap();
    write_object(dir.path(), "d.dcm", "1.4", basic_object("p", "2.1", "1.4"));

    let outcome = index.scan().unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.removed, 1);

    let mut files = index.files().unwrap();
    files.sort();
    assert_eq!(
        files,
        vec![
            PathBuf::from("b.dcm"),
            PathBuf::from("c.dcm"),
            PathBuf::from("d.dcm")
        ]
    );
}

#[test]
fn test_column_monotonicity() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    let before = index.tag_names().unwrap();
    assert!(!before.contains(&"BodyPartExamined".to_string()));

    // a new file introduces a previously-unseen tag
    let mut obj = basic_object("p", "2.1", "1.2");
    obj.put(DataElement::new(
        tags::BODY_PART_EXAMINED,
        VR::CS,
        PrimitiveValue::from("HEAD"),
    ));
    write_object(dir.path(), "b.dcm", "1.2", obj);
    index.scan().unwrap();

    let after = index.tag_names().unwrap();
    assert_eq!(after.len(), before.len() + 1);
    assert!(after.contains(&"BodyPartExamined".to_string()));

    // the old row does not list the new tag
    let mut selection = index.select();
    selection.select("SOPInstanceUID", "1.1").unwrap();
    assert!(!selection
        .tag_names()
        .unwrap()
        .contains("BodyPartExamined"));

    // and the new tag is only countable where present
    selection.reset();
    selection.select("BodyPartExamined", "HEAD").unwrap();
    assert_eq!(selection.file_count().unwrap(), 1);
}

#[test]
fn test_selection_narrowing_and_reset() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("alice", "2.1", "1.1"));
    write_object(dir.path(), "b.dcm", "1.2", basic_object("alice", "2.2", "1.2"));
    write_object(dir.path(), "c.dcm", "1.3", basic_object("bob", "2.3", "1.3"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    // successive select calls narrow
    let mut chained = index.select();
    chained.select("PatientID", "alice").unwrap();
    assert_eq!(chained.file_count().unwrap(), 2);
    chained.select("SeriesInstanceUID", "2.2").unwrap();
    assert_eq!(chained.file_count().unwrap(), 1);

    // the same predicate in one pass yields the same rows
    let mut at_once = index.select();
    at_once.select("PatientID", "alice").unwrap();
    at_once.select("SeriesInstanceUID", "2.2").unwrap();
    assert_eq!(at_once.files().unwrap(), chained.files().unwrap());

    // reset restores the unfiltered row count
    chained.reset();
    assert_eq!(chained.file_count().unwrap(), 3);

    // set membership and ranges compose with the same predicate
    let mut by_set = index.select();
    by_set
        .select_in("SeriesInstanceUID", vec!["2.1", "2.3"])
        .unwrap();
    assert_eq!(by_set.file_count().unwrap(), 2);

    let mut by_range = index.select();
    by_range.select_range("PatientID", "a", "b").unwrap();
    assert_eq!(by_range.file_count().unwrap(), 2);
}

#[test]
fn test_series_count_distinct_uids() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));
    write_object(dir.path(), "b.dcm", "1.2", basic_object("q", "2.2", "1.2"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    let selection = index.select();
    assert_eq!(selection.series_count().unwrap(), 2);
    assert_eq!(selection.patient_count().unwrap(), 2);
    assert_eq!(selection.instance_count().unwrap(), 2);

    // absent tags count zero rather than erroring
    assert_eq!(selection.value_count("BodyPartExamined").unwrap(), 0);
}

#[test]
fn test_private_tags_opt_in() {
    let dir = tempdir().unwrap();
    let mut obj = basic_object("p", "2.1", "1.1");
    obj.put(DataElement::new(
        Tag(0x0029, 0x1010),
        VR::LO,
        PrimitiveValue::from("vendor data"),
    ));
    write_object(dir.path(), "a.dcm", "1.1", obj);

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    assert!(!index
        .tag_names()
        .unwrap()
        .iter()
        .any(|name| name.starts_with("Private_")));

    let mut index = DicomIndex::open(
        IndexConfig::new(dir.path())
            .in_memory()
            .silent(true)
            .include_private_tags(true),
    )
    .unwrap();
    index.scan().unwrap();
    let names = index.tag_names().unwrap();
    assert!(names.contains(&"Private_0029_1010_LO_1".to_string()));

    let selection = index.select();
    let value = selection.single_value("Private_0029_1010_LO_1").unwrap();
    assert_eq!(value.to_text().unwrap(), "vendor data");
}

#[test]
fn test_persisted_database_reopens() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));

    let config = IndexConfig::new(dir.path()).silent(true);
    {
        let mut index = DicomIndex::open(config.clone()).unwrap();
        index.scan().unwrap();
        assert_eq!(index.file_count().unwrap(), 1);
    }

    // reopening sees the committed state; nothing new to ingest
    let mut index = DicomIndex::open(config).unwrap();
    assert_eq!(index.file_count().unwrap(), 1);
    let outcome = index.scan().unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.removed, 0);
}

#[test]
fn test_rebuild_recreates_from_scratch() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    assert_eq!(index.file_count().unwrap(), 1);

    let outcome = index.rebuild().unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(index.file_count().unwrap(), 1);
}

#[test]
fn test_clean_columns_drops_orphans() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));
    let mut obj = basic_object("p", "2.1", "1.2");
    obj.put(DataElement::new(
        tags::BODY_PART_EXAMINED,
        VR::CS,
        PrimitiveValue::from("HEAD"),
    ));
    let b = write_object(dir.path(), "b.dcm", "1.2", obj);

    let mut index = open_index(dir.path());
    index.scan().unwrap();
    assert!(index
        .tag_names()
        .unwrap()
        .contains(&"BodyPartExamined".to_string()));

    // the only file carrying the tag disappears
    fs::remove_file(b).unwrap();
    index.scan().unwrap();

    let dropped = index.clean_columns().unwrap();
    assert_eq!(dropped, 1);
    assert!(!index
        .tag_names()
        .unwrap()
        .contains(&"BodyPartExamined".to_string()));
}

/// Test double that records what the index hands to the assembler
struct CollectAssembler;

impl VolumeAssembler for CollectAssembler {
    type Volume = (Vec<PathBuf>, Option<f64>);

    fn assemble(
        &self,
        files: &[PathBuf],
        scale_factor: Option<f64>,
    ) -> VolumeResult<Self::Volume> {
        Ok((files.to_vec(), scale_factor))
    }
}

fn numbered_object(series_uid: &str, sop_uid: &str, instance_number: &str) -> InMemDicomObject {
    let mut obj = basic_object("p", series_uid, sop_uid);
    obj.put(DataElement::new(
        tags::INSTANCE_NUMBER,
        VR::IS,
        PrimitiveValue::from(instance_number),
    ));
    obj
}

#[test]
fn test_volume_sorts_slices_numerically() {
    let dir = tempdir().unwrap();
    // lexical order would put "10" before "9"
    write_object(dir.path(), "x.dcm", "1.1", numbered_object("2.1", "1.1", "10"));
    write_object(dir.path(), "y.dcm", "1.2", numbered_object("2.1", "1.2", "9"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    let (files, factor) = index.select().volume(&CollectAssembler, false).unwrap();
    assert_eq!(
        files,
        vec![dir.path().join("y.dcm"), dir.path().join("x.dcm")]
            .iter()
            .map(|p| p.canonicalize().unwrap())
            .collect::<Vec<_>>()
    );
    assert_eq!(factor, None);
}

#[test]
fn test_volume_requires_single_series() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", basic_object("p", "2.1", "1.1"));
    write_object(dir.path(), "b.dcm", "1.2", basic_object("p", "2.2", "1.2"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    let err = index.select().volume(&CollectAssembler, false).unwrap_err();
    assert!(err.to_string().contains("series"));
}

#[test]
fn test_volume_disables_scaling_without_pet_tags() {
    let dir = tempdir().unwrap();
    write_object(dir.path(), "a.dcm", "1.1", numbered_object("2.1", "1.1", "1"));

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    // scaling requested but the PET prerequisites are absent:
    // gracefully disabled, not an error
    let (files, factor) = index.select().volume(&CollectAssembler, true).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(factor, None);
}

#[test]
fn test_volume_scales_pet_series() {
    let dir = tempdir().unwrap();
    let nuclide = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::RADIOPHARMACEUTICAL_START_TIME,
            VR::TM,
            PrimitiveValue::from("100000"),
        ),
        DataElement::new(
            tags::RADIONUCLIDE_TOTAL_DOSE,
            VR::DS,
            PrimitiveValue::F64(smallvec![4.2e8]),
        ),
        DataElement::new(
            tags::RADIONUCLIDE_HALF_LIFE,
            VR::DS,
            PrimitiveValue::F64(smallvec![6586.2]),
        ),
    ]);
    let mut obj = numbered_object("2.1", "1.1", "1");
    obj.put(DataElement::new(
        tags::SERIES_DATE,
        VR::DA,
        PrimitiveValue::from("20200101"),
    ));
    obj.put(DataElement::new(
        tags::SERIES_TIME,
        VR::TM,
        PrimitiveValue::from("110000"),
    ));
    obj.put(DataElement::new(
        tags::PATIENT_WEIGHT,
        VR::DS,
        PrimitiveValue::F64(smallvec![75.0]),
    ));
    obj.put(DataElement::new(
        tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![nuclide]),
    ));
    write_object(dir.path(), "pet.dcm", "1.1", obj);

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    let (_, factor) = index.select().volume(&CollectAssembler, true).unwrap();
    let factor = factor.unwrap();
    assert!(factor > 0.0);
}

#[test]
fn test_sequence_survives_storage() {
    let dir = tempdir().unwrap();
    let item = InMemDicomObject::from_element_iter([DataElement::new(
        tags::CODE_MEANING,
        VR::LO,
        PrimitiveValue::from("finding"),
    )]);
    let mut obj = basic_object("p", "2.1", "1.1");
    obj.put(DataElement::new(
        tags::PROCEDURE_CODE_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![item]),
    ));
    write_object(dir.path(), "a.dcm", "1.1", obj);

    let mut index = open_index(dir.path());
    index.scan().unwrap();

    let headers = index.select().headers().unwrap();
    assert_eq!(headers.len(), 1);
    let (_, header) = &headers[0];
    let items = header.get_sequence("ProcedureCodeSequence").unwrap();
    assert_eq!(items[0].get_text("CodeMeaning").unwrap(), "finding");
}
