use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};

use camino::Utf8Path;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::annotate::{AnnotationContext, ManifestRow, annotate_batch, derive_annotations};
use crate::classify::{KindFailure, OutputRecord};
use crate::domain::{OutputKind, SynapseId};
use crate::error::AnnotatorError;
use crate::link::{LinkedRecord, link_io};
use crate::samplesheet::SampleInputRecord;
use crate::schema::SchemaSource;
use crate::synapse::SynapseClient;

/// What `build_manifests` does when one output kind fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KindErrorPolicy {
    #[default]
    Collect,
    Abort,
}

/// One output with the inputs it was derived from and the workflow that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceRecord {
    pub output_id: SynapseId,
    pub output_name: String,
    pub sample: String,
    pub output_kind: OutputKind,
    pub input_ids: Vec<SynapseId>,
    pub workflow_link: String,
}

impl ProvenanceRecord {
    pub fn from_linked(record: &LinkedRecord, workflow_link: &str) -> Self {
        Self {
            output_id: record.output.output_id.clone(),
            output_name: record.output.output_name.clone(),
            sample: record.output.sample.clone(),
            output_kind: record.output.output_kind,
            input_ids: record.input_ids.clone(),
            workflow_link: workflow_link.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestBundle {
    pub manifests: BTreeMap<OutputKind, Vec<ManifestRow>>,
    pub linkage: Vec<ProvenanceRecord>,
    pub failures: Vec<KindFailure>,
}

impl ManifestBundle {
    pub fn row_count(&self) -> usize {
        self.manifests.values().map(Vec::len).sum()
    }
}

/// Link, derive and annotate every kind independently.
pub fn build_manifests<C, S>(
    ctx: &AnnotationContext<'_, C>,
    schema: &S,
    inputs: &[SampleInputRecord],
    outputs_by_kind: &BTreeMap<OutputKind, Vec<OutputRecord>>,
    workflow_link: &str,
    policy: KindErrorPolicy,
) -> Result<ManifestBundle, AnnotatorError>
where
    C: SynapseClient + ?Sized,
    S: SchemaSource + ?Sized,
{
    let mut bundle = ManifestBundle::default();
    for (&kind, outputs) in outputs_by_kind {
        match build_kind(ctx, schema, kind, inputs, outputs, workflow_link) {
            Ok(rows) => {
                info!(kind = %kind, rows = rows.len(), "manifest built");
                bundle.linkage.extend(
                    rows.iter()
                        .map(|row| ProvenanceRecord::from_linked(&row.record, workflow_link)),
                );
                bundle.manifests.insert(kind, rows);
            }
            Err(err) if policy == KindErrorPolicy::Collect => {
                warn!(kind = %kind, error = %err, "manifest failed for output kind");
                bundle.failures.push(KindFailure {
                    kind,
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(bundle)
}

fn build_kind<C, S>(
    ctx: &AnnotationContext<'_, C>,
    schema: &S,
    kind: OutputKind,
    inputs: &[SampleInputRecord],
    outputs: &[OutputRecord],
    workflow_link: &str,
) -> Result<Vec<ManifestRow>, AnnotatorError>
where
    C: SynapseClient + ?Sized,
    S: SchemaSource + ?Sized,
{
    let linked = link_io(inputs, outputs)?;
    let mut rows = derive_annotations(ctx.client, schema, &linked, None)?;
    annotate_batch(ctx, kind, None, &mut rows, workflow_link)?;
    Ok(rows)
}

const LEADING_COLUMNS: [&str; 4] = ["entityId", "Filename", "sample", "Component"];

/// Writes one manifest as CSV: identity columns first, then annotation keys sorted.
pub fn write_manifest_csv(path: &Utf8Path, rows: &[ManifestRow]) -> Result<(), AnnotatorError> {
    let keys = rows
        .iter()
        .flat_map(|row| row.annotations.keys())
        .filter(|key| !LEADING_COLUMNS.contains(&key.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>();

    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|err| AnnotatorError::Filesystem(format!("create {path}: {err}")))?;
    let mut writer = csv::Writer::from_writer(file);
    let csv_err = |err: csv::Error| AnnotatorError::Filesystem(format!("write {path}: {err}"));

    let header = LEADING_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(keys.iter().cloned())
        .collect::<Vec<_>>();
    writer.write_record(&header).map_err(csv_err)?;

    for row in rows {
        let component = row
            .annotations
            .get("Component")
            .map(ToString::to_string)
            .unwrap_or_default();
        let mut record = vec![
            row.record.output.output_id.to_string(),
            row.record.output.output_name.clone(),
            row.record.output.sample.clone(),
            component,
        ];
        record.extend(keys.iter().map(|key| {
            row.annotations
                .get(key)
                .map(ToString::to_string)
                .unwrap_or_default()
        }));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|err| AnnotatorError::Filesystem(format!("flush {path}: {err}")))?;
    Ok(())
}

pub fn write_linkage_json(
    path: &Utf8Path,
    linkage: &[ProvenanceRecord],
) -> Result<(), AnnotatorError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(linkage)
        .map_err(|err| AnnotatorError::Filesystem(err.to_string()))?;
    fs::write(path, format!("{json}\n"))
        .map_err(|err| AnnotatorError::Filesystem(format!("write {path}: {err}")))
}

fn ensure_parent(path: &Utf8Path) -> Result<(), AnnotatorError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| AnnotatorError::Filesystem(format!("create {parent}: {err}")))?;
    }
    Ok(())
}
