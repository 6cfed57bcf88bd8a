mod common;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use nf_annotate::error::AnnotatorError;
use nf_annotate::samplesheet::{SampleKeyTransform, parse_sample_sheet};
use nf_annotate::table::{Table, TableSource};

use common::{MockSynapse, id, write_sheet};

#[test]
fn timepoints_merge_from_tsv_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sheet(
        dir.path(),
        "samplesheet.tsv",
        "sample\tfastq_1\tfastq_2\nX_T1\tsyn://synA1\tsyn://synB2\n",
    );
    // Letters are not part of an identifier; only `syn` plus digits counts.
    let table = Table::from_path(Path::new(&path)).unwrap();
    let err = parse_sample_sheet(&table, &SampleKeyTransform::default()).unwrap_err();
    assert_matches!(err, AnnotatorError::SampleSheetParse(_));

    let path = write_sheet(
        dir.path(),
        "samplesheet.tsv",
        "sample\tfastq_1\tfastq_2\nX_T1\tsyn101\tsyn102\nX_T2\tsyn103\t\n",
    );
    let table = Table::from_path(Path::new(&path)).unwrap();
    let records = parse_sample_sheet(&table, &SampleKeyTransform::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sample, "X");
    assert_eq!(records[0].input_ids, vec![id("syn101"), id("syn102"), id("syn103")]);
}

#[test]
fn gzipped_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samplesheet.csv.gz");
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder
        .write_all(b"sample,fastq_1,fastq_2\nS1,syn1,syn2\nS2,syn3,syn4\n")
        .unwrap();
    encoder.finish().unwrap();

    let source: TableSource = path.to_string_lossy().parse().unwrap();
    let table = Table::load::<MockSynapse>(&source, None).unwrap();
    let records = parse_sample_sheet(&table, &SampleKeyTransform::default()).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn synapse_source_needs_client() {
    let source: TableSource = "syn500".parse().unwrap();
    let err = Table::load::<MockSynapse>(&source, None).unwrap_err();
    assert_matches!(err, AnnotatorError::Filesystem(_));

    let client = MockSynapse::new().body("syn500", "sample,fastq\nS1,syn7\n");
    let table = Table::load(&source, Some(&client)).unwrap();
    assert_eq!(table.headers, vec!["sample", "fastq"]);
}

#[test]
fn gzipped_sheet_from_synapse() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(b"sample,fastq_1,fastq_2\nS1,syn1,syn2\n")
        .unwrap();
    let client = MockSynapse::new().body_bytes("syn501", &encoder.finish().unwrap());

    let source: TableSource = "syn501".parse().unwrap();
    let table = Table::load(&source, Some(&client)).unwrap();
    let records = parse_sample_sheet(&table, &SampleKeyTransform::default()).unwrap();
    assert_eq!(records[0].input_ids, vec![id("syn1"), id("syn2")]);
}
