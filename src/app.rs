use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::annotate::AnnotationContext;
use crate::classify::{Classification, KindFailure, classify_outputs};
use crate::config::ResolvedConfig;
use crate::domain::{OutputKind, SynapseId, Workflow};
use crate::error::AnnotatorError;
use crate::manifest::{ManifestBundle, build_manifests, write_linkage_json, write_manifest_csv};
use crate::samplesheet::{SampleInputRecord, parse_sample_sheet};
use crate::schema::SchemaSource;
use crate::submit::{SubmitResult, submit_manifest, submit_provenance};
use crate::synapse::SynapseClient;
use crate::table::{Table, TableSource};

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub output_root: SynapseId,
    pub workflow: Workflow,
    /// Empty means every kind the workflow produces.
    pub kinds: Vec<OutputKind>,
}

impl ClassifyRequest {
    pub fn resolved_kinds(&self) -> Vec<OutputKind> {
        if self.kinds.is_empty() {
            self.workflow.output_kinds()
        } else {
            self.kinds.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestRequest {
    pub samplesheet: TableSource,
    pub classify: ClassifyRequest,
    pub workflow_link: String,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    pub out_dir: Option<Utf8PathBuf>,
    pub submit: bool,
    pub provenance: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSheetResult {
    pub source: String,
    pub records: Vec<SampleInputRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResult {
    pub output_root: SynapseId,
    pub workflow: Workflow,
    #[serde(flatten)]
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestResult {
    pub run_at: String,
    pub output_root: SynapseId,
    pub workflow: Workflow,
    pub workflow_link: String,
    #[serde(flatten)]
    pub bundle: ManifestBundle,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub submitted: Vec<SubmitResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<SubmitResult>,
}

impl ManifestResult {
    pub fn failed_kinds(&self) -> Vec<String> {
        self.bundle
            .failures
            .iter()
            .map(|failure| failure.kind.to_string())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: SynapseClient, S: SchemaSource> {
    client: C,
    schema: S,
    config: ResolvedConfig,
}

impl<C: SynapseClient, S: SchemaSource> App<C, S> {
    pub fn new(client: C, schema: S, config: ResolvedConfig) -> Self {
        Self {
            client,
            schema,
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn samplesheet(
        &self,
        source: &TableSource,
        sink: &dyn ProgressSink,
    ) -> Result<SampleSheetResult, AnnotatorError> {
        sink.event(ProgressEvent {
            message: format!("phase=Read; loading sample sheet {source}"),
            elapsed: None,
        });
        let records = self.read_samplesheet(source)?;
        Ok(SampleSheetResult {
            source: source.to_string(),
            records,
        })
    }

    pub fn classify(
        &self,
        request: &ClassifyRequest,
        sink: &dyn ProgressSink,
    ) -> Result<ClassifyResult, AnnotatorError> {
        let started = Instant::now();
        let fileview = self.config.require_fileview()?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Classify; querying {fileview} under {}",
                request.output_root
            ),
            elapsed: None,
        });
        let classification = classify_outputs(
            &self.client,
            fileview,
            &request.output_root,
            request.workflow,
            &request.resolved_kinds(),
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Classify; {} kind(s) with outputs",
                classification.outputs.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(ClassifyResult {
            output_root: request.output_root.clone(),
            workflow: request.workflow,
            classification,
        })
    }

    /// Sample sheet, classification, manifests, then optional files and submission.
    pub fn manifest(
        &self,
        request: &ManifestRequest,
        options: &ManifestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestResult, AnnotatorError> {
        let started = Instant::now();
        let run_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let inputs = self.read_samplesheet(&request.samplesheet)?;
        let classified = self.classify(&request.classify, sink)?;
        let fileview = self.config.require_fileview()?;

        sink.event(ProgressEvent {
            message: "phase=Annotate; deriving annotations".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let ctx = AnnotationContext {
            client: &self.client,
            fileview,
            genomic_reference: &self.config.genomic_reference,
        };
        let mut bundle = build_manifests(
            &ctx,
            &self.schema,
            &inputs,
            &classified.classification.outputs,
            &request.workflow_link,
            self.config.on_kind_error,
        )?;
        let mut failures: Vec<KindFailure> = classified.classification.failures;
        failures.append(&mut bundle.failures);
        bundle.failures = failures;

        let files = match &options.out_dir {
            Some(out_dir) => write_bundle(out_dir, &bundle)?,
            None => Vec::new(),
        };

        let mut submitted = Vec::new();
        let mut provenance = Vec::new();
        if options.submit {
            sink.event(ProgressEvent {
                message: format!("phase=Submit; {} row(s)", bundle.row_count()),
                elapsed: Some(started.elapsed()),
            });
            for rows in bundle.manifests.values() {
                submitted.extend(submit_manifest(&self.client, rows, options.dry_run)?);
            }
        }
        if options.provenance {
            sink.event(ProgressEvent {
                message: format!("phase=Provenance; {} output(s)", bundle.linkage.len()),
                elapsed: Some(started.elapsed()),
            });
            provenance = submit_provenance(&self.client, &bundle.linkage, options.dry_run)?;
        }

        sink.event(ProgressEvent {
            message: "phase=Done".to_string(),
            elapsed: Some(started.elapsed()),
        });
        Ok(ManifestResult {
            run_at,
            output_root: request.classify.output_root.clone(),
            workflow: request.classify.workflow,
            workflow_link: request.workflow_link.clone(),
            bundle,
            files,
            submitted,
            provenance,
        })
    }

    fn read_samplesheet(
        &self,
        source: &TableSource,
    ) -> Result<Vec<SampleInputRecord>, AnnotatorError> {
        let table = Table::load(source, Some(&self.client))?;
        parse_sample_sheet(&table, &self.config.sample_key)
    }
}

/// One `<kind>.csv` per manifest plus `linkage.json`.
pub fn write_bundle(
    out_dir: &Utf8Path,
    bundle: &ManifestBundle,
) -> Result<Vec<String>, AnnotatorError> {
    let mut files = Vec::new();
    for (kind, rows) in &bundle.manifests {
        let path = out_dir.join(format!("{}.csv", kind.slug()));
        write_manifest_csv(&path, rows)?;
        files.push(path.to_string());
    }
    let linkage_path = out_dir.join("linkage.json");
    write_linkage_json(&linkage_path, &bundle.linkage)?;
    files.push(linkage_path.to_string());
    Ok(files)
}
