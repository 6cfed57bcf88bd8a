use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Serialize;

use crate::domain::{SynapseId, parse_identifier};
use crate::error::AnnotatorError;
use crate::table::Table;

pub const DEFAULT_SAMPLE_KEY_PATTERN: &str = "_T[0-9]$";

const READ_COLUMNS: [&str; 2] = ["fastq_1", "fastq_2"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleInputRecord {
    pub sample: String,
    pub input_ids: Vec<SynapseId>,
}

/// Rewrites raw sample names into join keys by deleting whatever the pattern matches.
#[derive(Debug, Clone)]
pub struct SampleKeyTransform {
    pattern: Regex,
}

impl SampleKeyTransform {
    pub fn new(pattern: &str) -> Result<Self, AnnotatorError> {
        let pattern = Regex::new(pattern)
            .map_err(|err| AnnotatorError::ConfigParse(format!("sample key pattern: {err}")))?;
        Ok(Self { pattern })
    }

    pub fn apply(&self, sample: &str) -> String {
        self.pattern.replace(sample.trim(), "").into_owned()
    }
}

impl Default for SampleKeyTransform {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_SAMPLE_KEY_PATTERN).unwrap(),
        }
    }
}

pub fn parse_sample_sheet(
    table: &Table,
    transform: &SampleKeyTransform,
) -> Result<Vec<SampleInputRecord>, AnnotatorError> {
    let table = normalize_columns(table.clone());
    let sample_col = table
        .column("sample")
        .ok_or_else(|| AnnotatorError::SampleSheetParse("missing `sample` column".to_string()))?;
    let read_cols = READ_COLUMNS
        .iter()
        .filter_map(|name| table.column(name))
        .collect::<Vec<_>>();
    if read_cols.is_empty() {
        return Err(AnnotatorError::SampleSheetParse(
            "no read file column (fastq_1, fastq1 or fastq)".to_string(),
        ));
    }

    let mut records: Vec<SampleInputRecord> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<SynapseId> = HashSet::new();

    for row in 0..table.rows.len() {
        let line = row + 2;
        let raw_sample = table.cell(row, sample_col).ok_or_else(|| {
            AnnotatorError::SampleSheetParse(format!("line {line}: empty sample"))
        })?;
        let key = transform.apply(raw_sample);

        let mut row_ids = Vec::new();
        for &col in &read_cols {
            let Some(raw) = table.cell(row, col) else {
                continue;
            };
            let id = parse_identifier(raw).map_err(|err| {
                AnnotatorError::SampleSheetParse(format!("line {line}: {err}"))
            })?;
            if !seen.insert(id.clone()) {
                return Err(AnnotatorError::SampleSheetParse(format!(
                    "line {line}: {id} is referenced more than once"
                )));
            }
            row_ids.push(id);
        }

        let idx = *by_key.entry(key.clone()).or_insert_with(|| {
            records.push(SampleInputRecord {
                sample: key,
                input_ids: Vec::new(),
            });
            records.len() - 1
        });
        let record = &mut records[idx];
        for id in row_ids {
            if !record.input_ids.contains(&id) {
                record.input_ids.push(id);
            }
        }
    }

    if let Some(record) = records.iter().find(|record| record.input_ids.is_empty()) {
        return Err(AnnotatorError::SampleSheetParse(format!(
            "sample {} has no read file identifiers",
            record.sample
        )));
    }
    Ok(records)
}

fn normalize_columns(mut table: Table) -> Table {
    if table.column("fastq_1").is_none() {
        if table.column("fastq1").is_some() {
            table.rename_column("fastq1", "fastq_1");
        } else {
            table.rename_column("fastq", "fastq_1");
        }
    }
    if table.column("fastq_2").is_none() {
        table.rename_column("fastq2", "fastq_2");
    }
    table
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn table(text: &str) -> Table {
        Table::from_reader(text.as_bytes(), "samplesheet.csv").unwrap()
    }

    #[test]
    fn merges_timepoints_in_order() {
        let sheet = table("sample,fastq_1,fastq_2\nX_T1,syn1,syn2\nX_T2,syn3,\nY,syn4,syn5\n");
        let records = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sample, "X");
        let ids = records[0]
            .input_ids
            .iter()
            .map(SynapseId::as_str)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["syn1", "syn2", "syn3"]);
        assert_eq!(records[1].sample, "Y");
    }

    #[test]
    fn aliases_are_normalized() {
        let sheet = table("sample,fastq1,fastq2\nS1,syn://syn10,syn://syn11\n");
        let records = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap();
        assert_eq!(records[0].input_ids.len(), 2);

        let single = table("sample,fastq\nS1,syn://syn12\n");
        let records = parse_sample_sheet(&single, &SampleKeyTransform::default()).unwrap();
        assert_eq!(records[0].input_ids[0].as_str(), "syn12");
    }

    #[test]
    fn invalid_reference_fails_whole_sheet() {
        let sheet = table("sample,fastq_1\nS1,syn1\nS2,s3://bucket/S2_R1.fastq.gz\n");
        let err = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap_err();
        assert_matches!(err, AnnotatorError::SampleSheetParse(msg) if msg.contains("line 3"));
    }

    #[test]
    fn repeated_identifier_fails() {
        let sheet = table("sample,fastq_1,fastq_2\nS1,syn1,syn2\nS2,syn2,syn3\n");
        let err = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap_err();
        assert_matches!(err, AnnotatorError::SampleSheetParse(_));
    }

    #[test]
    fn sample_without_reads_fails() {
        let sheet = table("sample,fastq_1,fastq_2\nS1,syn1,syn2\nS2,,\n");
        let err = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap_err();
        assert_matches!(err, AnnotatorError::SampleSheetParse(msg) if msg.contains("S2"));
    }

    #[test]
    fn empty_timepoint_merges_into_sample_with_reads() {
        let sheet = table("sample,fastq_1\nX_T1,\nX_T2,syn4\n");
        let records = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_ids[0].as_str(), "syn4");
    }

    #[test]
    fn missing_read_columns() {
        let sheet = table("sample,bam\nS1,syn1\n");
        let err = parse_sample_sheet(&sheet, &SampleKeyTransform::default()).unwrap_err();
        assert_matches!(err, AnnotatorError::SampleSheetParse(_));
    }

    #[test]
    fn custom_transform() {
        let transform = SampleKeyTransform::new("-(tumor|normal)$").unwrap();
        let sheet = table("sample,fastq_1\nP1-tumor,syn1\nP1-normal,syn2\n");
        let records = parse_sample_sheet(&sheet, &transform).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sample, "P1");
    }
}
