use serde::Serialize;
use tracing::{debug, info};

use crate::annotate::ManifestRow;
use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::manifest::ProvenanceRecord;
use crate::synapse::{Activity, SynapseClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Updated,
    Unchanged,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResult {
    pub id: SynapseId,
    pub status: SubmitStatus,
    /// Keys whose stored value was added or changed.
    pub changed_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

/// Read-merge-write of each row's annotations onto its output entity. Rows are
/// written in order; the first failing write stops the run.
pub fn submit_manifest<C: SynapseClient + ?Sized>(
    client: &C,
    rows: &[ManifestRow],
    dry_run: bool,
) -> Result<Vec<SubmitResult>, AnnotatorError> {
    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let id = &row.record.output.output_id;
        let current = client.get_annotations(id)?;
        let changed_keys = row
            .annotations
            .iter()
            .filter(|(key, value)| current.annotations.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        let status = if changed_keys.is_empty() {
            SubmitStatus::Unchanged
        } else if dry_run {
            SubmitStatus::DryRun
        } else {
            client.set_annotations(&current.merged(&row.annotations))?;
            SubmitStatus::Updated
        };
        debug!(%id, ?status, changed = changed_keys.len(), "annotations submitted");
        results.push(SubmitResult {
            id: id.clone(),
            status,
            changed_keys,
            activity_id: None,
        });
    }
    info!(rows = results.len(), dry_run, "annotation submission finished");
    Ok(results)
}

pub fn activity_for(record: &ProvenanceRecord) -> Activity {
    Activity {
        name: record.output_kind.label().to_string(),
        description: Some(format!("{} output for sample {}", record.output_kind, record.sample)),
        used: record.input_ids.clone(),
        executed: Some(record.workflow_link.clone()),
    }
}

/// Creates one activity per output and marks the output as generated by it.
pub fn submit_provenance<C: SynapseClient + ?Sized>(
    client: &C,
    linkage: &[ProvenanceRecord],
    dry_run: bool,
) -> Result<Vec<SubmitResult>, AnnotatorError> {
    let mut results = Vec::with_capacity(linkage.len());
    for record in linkage {
        let activity = activity_for(record);
        let (status, activity_id) = if dry_run {
            (SubmitStatus::DryRun, None)
        } else {
            let activity_id = client.create_activity(&activity)?;
            client.set_generated_by(&record.output_id, &activity_id)?;
            (SubmitStatus::Updated, Some(activity_id))
        };
        debug!(id = %record.output_id, ?status, "provenance submitted");
        results.push(SubmitResult {
            id: record.output_id.clone(),
            status,
            changed_keys: Vec::new(),
            activity_id,
        });
    }
    info!(outputs = results.len(), dry_run, "provenance submission finished");
    Ok(results)
}
