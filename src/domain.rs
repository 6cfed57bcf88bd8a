use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AnnotatorError;

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^syn\d+$").unwrap());
static EMBEDDED_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"syn\d+").unwrap());

/// Synapse entity identifier (`syn` followed by digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SynapseId(String);

impl SynapseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SynapseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SynapseId {
    type Err = AnnotatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !BARE_ID.is_match(trimmed) {
            return Err(AnnotatorError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for SynapseId {
    type Error = AnnotatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SynapseId> for String {
    fn from(value: SynapseId) -> Self {
        value.0
    }
}

/// Accepts a bare id first, then falls back to the first id embedded in a longer
/// string such as `syn://syn123` or a portal URL.
pub fn parse_identifier(raw: &str) -> Result<SynapseId, AnnotatorError> {
    if let Ok(id) = raw.parse::<SynapseId>() {
        return Ok(id);
    }
    EMBEDDED_ID
        .find(raw)
        .map(|found| SynapseId(found.as_str().to_string()))
        .ok_or_else(|| AnnotatorError::InvalidIdentifier(raw.to_string()))
}

pub fn parse_identifiers<'a, I>(raws: I) -> Result<Vec<SynapseId>, AnnotatorError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for raw in raws {
        let id = parse_identifier(raw)?;
        if !seen.insert(id.clone()) {
            return Err(AnnotatorError::AmbiguousIdentifier(id.to_string()));
        }
        ids.push(id);
    }
    Ok(ids)
}

pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

pub fn extract_segment<'a, F>(segments: &[&'a str], selector: F) -> Option<&'a str>
where
    F: Fn(&[&str]) -> Option<usize>,
{
    selector(segments).and_then(|index| segments.get(index).copied())
}

pub fn last(segments: &[&str]) -> Option<usize> {
    segments.len().checked_sub(1)
}

pub fn second_to_last(segments: &[&str]) -> Option<usize> {
    segments.len().checked_sub(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Rnaseq,
    Sarek,
}

impl Workflow {
    pub fn pipeline_name(self) -> &'static str {
        match self {
            Workflow::Rnaseq => "nf-core/rnaseq",
            Workflow::Sarek => "nf-core/sarek",
        }
    }

    pub fn output_kinds(self) -> Vec<OutputKind> {
        OutputKind::value_variants()
            .iter()
            .copied()
            .filter(|kind| kind.workflow() == self)
            .collect()
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Rnaseq => write!(f, "rnaseq"),
            Workflow::Sarek => write!(f, "sarek"),
        }
    }
}

/// Pipeline step whose files are classified and annotated as one group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
pub enum OutputKind {
    #[serde(rename = "star-salmon")]
    #[value(name = "star-salmon")]
    StarSalmon,
    #[serde(rename = "featurecounts")]
    #[value(name = "featurecounts")]
    FeatureCounts,
    #[serde(rename = "samtools")]
    #[value(name = "samtools")]
    Samtools,
    #[serde(rename = "strelka2")]
    #[value(name = "strelka2")]
    Strelka2,
    #[serde(rename = "mutect2")]
    #[value(name = "mutect2")]
    Mutect2,
    #[serde(rename = "freebayes")]
    #[value(name = "freebayes")]
    FreeBayes,
    #[serde(rename = "deepvariant")]
    #[value(name = "deepvariant")]
    DeepVariant,
    #[serde(rename = "haplotypecaller")]
    #[value(name = "haplotypecaller")]
    HaplotypeCaller,
    #[serde(rename = "manta")]
    #[value(name = "manta")]
    Manta,
    #[serde(rename = "ascat")]
    #[value(name = "ascat")]
    Ascat,
    #[serde(rename = "cnvkit")]
    #[value(name = "cnvkit")]
    Cnvkit,
    #[serde(rename = "control-freec")]
    #[value(name = "control-freec")]
    ControlFreec,
    #[serde(rename = "vcf2maf")]
    #[value(name = "vcf2maf")]
    Vcf2maf,
}

impl OutputKind {
    pub fn label(self) -> &'static str {
        match self {
            OutputKind::StarSalmon => "STAR and Salmon",
            OutputKind::FeatureCounts => "featureCounts",
            OutputKind::Samtools => "SAMtools",
            OutputKind::Strelka2 => "Strelka2",
            OutputKind::Mutect2 => "Mutect2",
            OutputKind::FreeBayes => "FreeBayes",
            OutputKind::DeepVariant => "DeepVariant",
            OutputKind::HaplotypeCaller => "HaplotypeCaller",
            OutputKind::Manta => "Manta",
            OutputKind::Ascat => "ASCAT",
            OutputKind::Cnvkit => "CNVkit",
            OutputKind::ControlFreec => "Control-FREEC",
            OutputKind::Vcf2maf => "vcf2maf",
        }
    }

    pub fn workflow(self) -> Workflow {
        match self {
            OutputKind::StarSalmon | OutputKind::FeatureCounts | OutputKind::Samtools => {
                Workflow::Rnaseq
            }
            _ => Workflow::Sarek,
        }
    }

    /// Command-line name, also used for manifest file names.
    pub fn slug(self) -> String {
        self.to_possible_value()
            .map(|possible| possible.get_name().to_string())
            .unwrap_or_else(|| format!("{self:?}").to_lowercase())
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for OutputKind {
    type Err = AnnotatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        OutputKind::value_variants()
            .iter()
            .copied()
            .find(|kind| {
                kind.label().eq_ignore_ascii_case(trimmed)
                    || kind
                        .to_possible_value()
                        .map(|possible| possible.matches(trimmed, true))
                        .unwrap_or(false)
            })
            .ok_or_else(|| AnnotatorError::UnknownOutputKind(value.to_string()))
    }
}
