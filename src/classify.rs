use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    OutputKind, SynapseId, Workflow, extract_segment, second_to_last, split_path,
};
use crate::error::AnnotatorError;
use crate::query::{IndexFilter, IndexRow};
use crate::synapse::{SynapseClient, resolve_path};

/// Lowercase substrings identifying a variant caller directory.
pub const KNOWN_CALLERS: [&str; 9] = [
    "strelka",
    "mutect2",
    "freebayes",
    "deepvariant",
    "haplotypecaller",
    "manta",
    "ascat",
    "cnvkit",
    "controlfreec",
];

pub const SOMATIC_DELIMITER: &str = "_vs_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub output_kind: OutputKind,
    pub path: String,
    pub output_name: String,
    pub output_id: SynapseId,
    pub sample: String,
    pub caller: Option<String>,
    pub workflow: Workflow,
    pub output_root: SynapseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindFailure {
    pub kind: OutputKind,
    pub message: String,
}

/// Classified outputs per kind. Kinds with no matching files are absent from
/// `outputs`; kinds whose layout could not be read are listed in `failures`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub outputs: BTreeMap<OutputKind, Vec<OutputRecord>>,
    pub failures: Vec<KindFailure>,
}

pub fn classify_outputs<C: SynapseClient + ?Sized>(
    client: &C,
    fileview: &SynapseId,
    output_root: &SynapseId,
    workflow: Workflow,
    kinds: &[OutputKind],
) -> Result<Classification, AnnotatorError> {
    if let Some(kind) = kinds.iter().find(|kind| kind.workflow() != workflow) {
        return Err(AnnotatorError::UnsupportedOutputKind {
            kind: kind.to_string(),
            workflow: workflow.to_string(),
        });
    }

    let root_path = resolve_path(client, output_root)?;
    info!(%output_root, root_path = %root_path, %workflow, "classifying outputs");

    let mut classification = Classification::default();
    for &kind in kinds {
        let filter = output_filter(kind, &root_path);
        let rows = client.query_files(fileview, &filter)?;
        if rows.is_empty() {
            warn!(kind = %kind, "no files found for output kind");
            continue;
        }
        match classify_rows(kind, output_root, &root_path, rows) {
            Ok(records) => {
                info!(kind = %kind, files = records.len(), "classified outputs");
                classification.outputs.insert(kind, records);
            }
            Err(err) => {
                warn!(kind = %kind, error = %err, "output kind skipped");
                classification.failures.push(KindFailure {
                    kind,
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(classification)
}

/// Turns fileview rows of one kind into records, sorted by path. Sample and
/// caller are read from the part of each path below `root_path`.
pub fn classify_rows(
    kind: OutputKind,
    output_root: &SynapseId,
    root_path: &str,
    rows: Vec<IndexRow>,
) -> Result<Vec<OutputRecord>, AnnotatorError> {
    let workflow = kind.workflow();
    let mut records = rows
        .into_iter()
        .map(|row| -> Result<OutputRecord, AnnotatorError> {
            let relative = below_root(&row.path, root_path);
            let (sample, caller) = match workflow {
                Workflow::Rnaseq => (rnaseq_sample(kind, relative, &row.name)?, None),
                Workflow::Sarek => {
                    let (sample, caller) = sarek_sample_and_caller(relative)?;
                    (sample, Some(caller))
                }
            };
            Ok(OutputRecord {
                output_kind: kind,
                path: row.path,
                output_name: row.name,
                output_id: row.id,
                sample,
                caller,
                workflow,
                output_root: output_root.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(records)
}

/// `path` with the `root_path/` prefix removed. Paths outside the root are
/// returned unchanged.
pub fn below_root<'a>(path: &'a str, root_path: &str) -> &'a str {
    let root_path = root_path.trim_matches('/');
    if root_path.is_empty() {
        return path;
    }
    path.strip_prefix(root_path)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

pub fn output_filter(kind: OutputKind, root_path: &str) -> IndexFilter {
    let scoped = |rest: &str| {
        if root_path.is_empty() {
            rest.to_string()
        } else {
            format!("{root_path}/{rest}")
        }
    };
    let filter = IndexFilter::under(root_path);
    match kind {
        OutputKind::StarSalmon => filter
            .path_like(scoped("star_salmon/%"))
            .name_like("quant.sf"),
        OutputKind::FeatureCounts => filter
            .path_like(scoped("star_salmon/featurecounts/%"))
            .name_like("%.featureCounts.txt"),
        OutputKind::Samtools => filter
            .path_like(scoped("star_salmon/%"))
            .name_like("%.markdup.sorted.bam"),
        OutputKind::Vcf2maf => filter.name_like("%.maf").name_like("%.maf.gz"),
        _ => {
            let filter = caller_dir_stems(kind)
                .iter()
                .fold(filter, |filter, stem| filter.path_like(format!("%/{stem}%/%")));
            caller_file_patterns(kind)
                .iter()
                .fold(filter, |filter, pattern| filter.name_like(*pattern))
        }
    }
}

fn caller_dir_stems(kind: OutputKind) -> &'static [&'static str] {
    match kind {
        OutputKind::Strelka2 => &["Strelka", "strelka"],
        OutputKind::Mutect2 => &["Mutect2", "mutect2"],
        OutputKind::FreeBayes => &["FreeBayes", "freebayes"],
        OutputKind::DeepVariant => &["DeepVariant", "deepvariant"],
        OutputKind::HaplotypeCaller => &["HaplotypeCaller", "haplotypecaller"],
        OutputKind::Manta => &["Manta", "manta"],
        OutputKind::Ascat => &["ASCAT", "ascat"],
        OutputKind::Cnvkit => &["CNVkit", "cnvkit"],
        OutputKind::ControlFreec => &["ControlFREEC", "controlfreec"],
        _ => &[],
    }
}

fn caller_file_patterns(kind: OutputKind) -> &'static [&'static str] {
    match kind {
        OutputKind::Ascat => &["%.cnvs.txt", "%.segments.txt"],
        OutputKind::Cnvkit => &["%.cnr", "%.cns"],
        OutputKind::ControlFreec => &["%.p.value.txt", "%_ratio.txt"],
        _ => &["%.vcf.gz", "%.vcf.gz.tbi"],
    }
}

pub fn rnaseq_sample(kind: OutputKind, path: &str, name: &str) -> Result<String, AnnotatorError> {
    let sample = match kind {
        OutputKind::StarSalmon => {
            extract_segment(&split_path(path), second_to_last).map(str::to_string)
        }
        OutputKind::FeatureCounts => name.strip_suffix(".featureCounts.txt").map(str::to_string),
        OutputKind::Samtools => name.strip_suffix(".markdup.sorted.bam").map(str::to_string),
        _ => None,
    };
    sample
        .filter(|sample| !sample.is_empty())
        .ok_or_else(|| AnnotatorError::LayoutInference {
            path: path.to_string(),
        })
}

/// Index of the first directory segment naming a known caller.
pub fn caller_index(segments: &[&str]) -> Option<usize> {
    let directories = segments.len().checked_sub(1)?;
    segments[..directories].iter().position(|segment| {
        let lower = segment.to_ascii_lowercase();
        KNOWN_CALLERS.iter().any(|caller| lower.contains(caller))
    })
}

/// `.../<SAMPLE>/<CALLER>/file` puts the sample before the caller,
/// `.../<CALLER>/<SAMPLE>/file` puts it after.
pub fn sample_index(segments: &[&str], caller: usize) -> Option<usize> {
    let last = segments.len().checked_sub(1)?;
    if last.checked_sub(caller)? == 1 {
        last.checked_sub(2)
    } else {
        last.checked_sub(1)
    }
}

pub fn tumor_side(sample: &str) -> &str {
    sample
        .split_once(SOMATIC_DELIMITER)
        .map(|(tumor, _)| tumor)
        .unwrap_or(sample)
}

pub fn sarek_sample_and_caller(path: &str) -> Result<(String, String), AnnotatorError> {
    let layout_err = || AnnotatorError::LayoutInference {
        path: path.to_string(),
    };
    let segments = split_path(path);
    let caller = caller_index(&segments).ok_or_else(layout_err)?;
    let sample = extract_segment(&segments, |segments| sample_index(segments, caller))
        .ok_or_else(layout_err)?;
    Ok((tumor_side(sample).to_string(), segments[caller].to_string()))
}
