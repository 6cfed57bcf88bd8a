use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AnnotatorError {
    #[error("invalid Synapse identifier: {0}")]
    InvalidIdentifier(String),

    #[error("identifier appears more than once: {0}")]
    AmbiguousIdentifier(String),

    #[error("failed to parse sample sheet: {0}")]
    #[diagnostic(help(
        "expected a `sample` column and read columns named fastq_1/fastq_2, fastq1/fastq2 or fastq"
    ))]
    SampleSheetParse(String),

    #[error("no caller directory recognized in output path: {path}")]
    LayoutInference { path: String },

    #[error("output samples missing from the sample sheet: {}", .samples.join(", "))]
    #[diagnostic(help("check that the sample sheet matches the pipeline run"))]
    UnlinkedSample { samples: Vec<String> },

    #[error("unknown output kind: {0}")]
    UnknownOutputKind(String),

    #[error("output kind {kind} is not produced by the {workflow} workflow")]
    UnsupportedOutputKind { kind: String, workflow: String },

    #[error("cannot decide data type for {name} (format {format})")]
    UnrecognizedDataType { name: String, format: String },

    #[error("annotation batch mixes output kinds: {0}")]
    HeterogeneousBatch(String),

    #[error("{} output kind(s) failed: {}", .kinds.len(), .kinds.join(", "))]
    KindFailures { kinds: Vec<String> },

    #[error("Synapse request failed: {0}")]
    SynapseHttp(String),

    #[error("Synapse returned status {status}: {message}")]
    SynapseStatus { status: u16, message: String },

    #[error("no Synapse auth token found in SYNAPSE_AUTH_TOKEN or ~/.synapseConfig")]
    MissingAuthToken,

    #[error("failed to load schema: {0}")]
    Schema(String),

    #[error("failed to parse table {source_name}: {message}")]
    TableParse {
        source_name: String,
        message: String,
    },

    #[error("missing config file nf-annotate.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
