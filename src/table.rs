use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use flate2::read::GzDecoder;

use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::synapse::SynapseClient;

/// Where a delimited table comes from: a local file or a Synapse file entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    Local(String),
    Synapse(SynapseId),
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Local(path) => write!(f, "{path}"),
            TableSource::Synapse(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for TableSource {
    type Err = AnnotatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Only a bare id counts; `data/syn123.csv` is a local path.
        match value.parse::<SynapseId>() {
            Ok(id) => Ok(TableSource::Synapse(id)),
            Err(_) if value.trim().is_empty() => {
                Err(AnnotatorError::Filesystem("empty table source".to_string()))
            }
            Err(_) => Ok(TableSource::Local(value.trim().to_string())),
        }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn load<C: SynapseClient + ?Sized>(
        source: &TableSource,
        client: Option<&C>,
    ) -> Result<Self, AnnotatorError> {
        match source {
            TableSource::Local(path) => Self::from_path(Path::new(path)),
            TableSource::Synapse(id) => {
                let client = client.ok_or_else(|| {
                    AnnotatorError::Filesystem(format!("{id} requires a Synapse client"))
                })?;
                Self::from_synapse(client, id)
            }
        }
    }

    /// Gzip is detected from the file's magic bytes, so downloads named after
    /// their entity id decode too.
    pub fn from_path(path: &Path) -> Result<Self, AnnotatorError> {
        let open_err =
            |err: std::io::Error| AnnotatorError::Filesystem(format!("open {}: {err}", path.display()));
        let file = File::open(path).map_err(open_err)?;
        let name = path.display().to_string();
        let mut buffered = BufReader::new(file);
        let gz = buffered.fill_buf().map_err(open_err)?.starts_with(&GZIP_MAGIC);
        let reader: Box<dyn Read> = if gz {
            Box::new(GzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        Self::from_reader(BufReader::new(reader), &name)
    }

    pub fn from_synapse<C: SynapseClient + ?Sized>(
        client: &C,
        id: &SynapseId,
    ) -> Result<Self, AnnotatorError> {
        let temp_dir = tempfile::Builder::new()
            .prefix("nf-annotate-table")
            .tempdir()
            .map_err(|err| AnnotatorError::Filesystem(err.to_string()))?;
        let destination = temp_dir.path().join(id.as_str());
        client.download_file(id, &destination)?;
        Self::from_path(&destination)
    }

    /// Tab-delimited when the header line contains a tab, comma-delimited otherwise.
    pub fn from_reader<R: BufRead>(mut reader: R, source_name: &str) -> Result<Self, AnnotatorError> {
        let parse_err = |message: String| AnnotatorError::TableParse {
            source_name: source_name.to_string(),
            message,
        };
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|err| parse_err(err.to_string()))?;
        let header_line = content.lines().find(|line| !line.trim().is_empty());
        let delimiter = match header_line {
            Some(line) if line.contains('\t') => b'\t',
            Some(_) => b',',
            None => return Err(parse_err("table is empty".to_string())),
        };

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = csv_reader
            .headers()
            .map_err(|err| parse_err(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|err| parse_err(err.to_string()))?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            let mut row = record.iter().map(str::to_string).collect::<Vec<_>>();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column(from) {
            self.headers[idx] = to.to_string();
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|values| values.get(column))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn sniff_tab_delimiter() {
        let text = "Sample\treads_mapped\nS1\t100\n\nS2\t200\n";
        let table = Table::from_reader(text.as_bytes(), "stats").unwrap();
        assert_eq!(table.headers, vec!["Sample", "reads_mapped"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), Some("200"));
    }

    #[test]
    fn short_rows_are_padded() {
        let text = "sample,fastq_1,fastq_2\nS1,syn1\n";
        let table = Table::from_reader(text.as_bytes(), "sheet").unwrap();
        assert_eq!(table.rows[0], vec!["S1", "syn1", ""]);
        assert_eq!(table.cell(0, 2), None);
    }

    #[test]
    fn gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"sample,fastq\nS1,syn9\n").unwrap();
        encoder.finish().unwrap();

        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.column("fastq"), Some(1));
    }

    #[test]
    fn gzip_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syn500");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"sample\tfastq_1\nS1\tsyn9\n").unwrap();
        encoder.finish().unwrap();

        let table = Table::from_path(&path).unwrap();
        assert_eq!(table.headers, vec!["sample", "fastq_1"]);
        assert_eq!(table.cell(0, 1), Some("syn9"));
    }

    #[test]
    fn source_prefers_bare_identifier() {
        assert_eq!(
            "syn123".parse::<TableSource>().unwrap(),
            TableSource::Synapse("syn123".parse().unwrap())
        );
        assert_eq!(
            "data/syn123.csv".parse::<TableSource>().unwrap(),
            TableSource::Local("data/syn123.csv".to_string())
        );
    }
}
