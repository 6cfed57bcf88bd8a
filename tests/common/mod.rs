#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use nf_annotate::annotations::{AnnotationSnapshot, AnnotationValue, Annotations};
use nf_annotate::domain::SynapseId;
use nf_annotate::error::AnnotatorError;
use nf_annotate::query::{IndexFilter, IndexRow};
use nf_annotate::schema::SchemaSource;
use nf_annotate::synapse::{Activity, EntityHeader, EntityKind, SynapseClient};

pub fn id(value: &str) -> SynapseId {
    value.parse().unwrap()
}

/// In-memory Synapse: an entity tree, a fileview, annotation snapshots and
/// downloadable file bodies.
#[derive(Default)]
pub struct MockSynapse {
    headers: HashMap<String, EntityHeader>,
    files: Vec<IndexRow>,
    bodies: HashMap<String, Vec<u8>>,
    pub annotations: Mutex<HashMap<String, AnnotationSnapshot>>,
    pub annotation_reads: Mutex<Vec<String>>,
    pub annotation_writes: Mutex<Vec<AnnotationSnapshot>>,
    pub activities: Mutex<Vec<Activity>>,
    pub generated_by: Mutex<Vec<(String, String)>>,
    pub queries: Mutex<Vec<IndexFilter>>,
}

impl MockSynapse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: &str, name: &str, parent: Option<&str>, kind: EntityKind) -> Self {
        self.headers.insert(
            entity.to_string(),
            EntityHeader {
                id: id(entity),
                name: name.to_string(),
                parent_id: parent.map(id),
                kind,
            },
        );
        self
    }

    pub fn project(self, entity: &str, name: &str) -> Self {
        self.entity(entity, name, None, EntityKind::Project)
    }

    pub fn folder(self, entity: &str, name: &str, parent: &str) -> Self {
        self.entity(entity, name, Some(parent), EntityKind::Folder)
    }

    /// Adds a fileview row; the name is the last path segment.
    pub fn file(mut self, entity: &str, path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        self.files.push(IndexRow {
            path: path.to_string(),
            name,
            id: id(entity),
        });
        self
    }

    pub fn body(self, entity: &str, content: &str) -> Self {
        self.body_bytes(entity, content.as_bytes())
    }

    pub fn body_bytes(mut self, entity: &str, content: &[u8]) -> Self {
        self.bodies.insert(entity.to_string(), content.to_vec());
        self
    }

    pub fn annotate(self, entity: &str, pairs: &[(&str, &str)]) -> Self {
        let annotations = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), AnnotationValue::text(*value)))
            .collect::<Annotations>();
        self.annotations.lock().unwrap().insert(
            entity.to_string(),
            AnnotationSnapshot {
                id: id(entity),
                etag: "etag-0".to_string(),
                annotations,
            },
        );
        self
    }

    pub fn stored(&self, entity: &str) -> Annotations {
        self.annotations
            .lock()
            .unwrap()
            .get(entity)
            .map(|snapshot| snapshot.annotations.clone())
            .unwrap_or_default()
    }
}

impl SynapseClient for MockSynapse {
    fn entity_header(&self, entity: &SynapseId) -> Result<EntityHeader, AnnotatorError> {
        self.headers
            .get(entity.as_str())
            .cloned()
            .ok_or_else(|| AnnotatorError::SynapseStatus {
                status: 404,
                message: format!("{entity} not found"),
            })
    }

    fn query_files(
        &self,
        _fileview: &SynapseId,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexRow>, AnnotatorError> {
        self.queries.lock().unwrap().push(filter.clone());
        Ok(self
            .files
            .iter()
            .filter(|row| filter.matches(&row.path, &row.name))
            .cloned()
            .collect())
    }

    fn get_annotations(&self, entity: &SynapseId) -> Result<AnnotationSnapshot, AnnotatorError> {
        self.annotation_reads
            .lock()
            .unwrap()
            .push(entity.to_string());
        Ok(self
            .annotations
            .lock()
            .unwrap()
            .get(entity.as_str())
            .cloned()
            .unwrap_or_else(|| AnnotationSnapshot {
                id: entity.clone(),
                etag: "etag-0".to_string(),
                annotations: Annotations::new(),
            }))
    }

    fn set_annotations(&self, snapshot: &AnnotationSnapshot) -> Result<(), AnnotatorError> {
        let mut stored = snapshot.clone();
        stored.etag = format!("{}+", snapshot.etag);
        self.annotation_writes.lock().unwrap().push(snapshot.clone());
        self.annotations
            .lock()
            .unwrap()
            .insert(snapshot.id.to_string(), stored);
        Ok(())
    }

    fn download_file(&self, entity: &SynapseId, destination: &Path) -> Result<(), AnnotatorError> {
        let body = self
            .bodies
            .get(entity.as_str())
            .ok_or_else(|| AnnotatorError::SynapseStatus {
                status: 404,
                message: format!("{entity} has no file"),
            })?;
        fs::write(destination, body).map_err(|err| AnnotatorError::Filesystem(err.to_string()))
    }

    fn create_activity(&self, activity: &Activity) -> Result<String, AnnotatorError> {
        let mut activities = self.activities.lock().unwrap();
        activities.push(activity.clone());
        Ok(format!("{}", 9000 + activities.len()))
    }

    fn set_generated_by(&self, entity: &SynapseId, activity_id: &str) -> Result<(), AnnotatorError> {
        self.generated_by
            .lock()
            .unwrap()
            .push((entity.to_string(), activity_id.to_string()));
        Ok(())
    }
}

/// Every template governs the same property list.
pub struct MockSchema {
    pub properties: Vec<String>,
}

impl MockSchema {
    pub fn new(properties: &[&str]) -> Self {
        Self {
            properties: properties.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SchemaSource for MockSchema {
    fn template_properties(&self, _template: &str) -> Result<Vec<String>, AnnotatorError> {
        Ok(self.properties.clone())
    }
}

/// Template properties typical for processed-data templates.
pub fn standard_schema() -> MockSchema {
    MockSchema::new(&[
        "Component",
        "Filename",
        "entityId",
        "fileFormat",
        "dataType",
        "dataSubtype",
        "comments",
        "progressReportNumber",
        "specimenID",
        "individualID",
        "assay",
        "species",
        "workflowLink",
    ])
}

/// `proj` (syn1) / `sarek_out` (syn2) with files under both sarek layouts.
pub fn sarek_project() -> MockSynapse {
    MockSynapse::new()
        .project("syn1", "proj")
        .folder("syn2", "sarek_out", "syn1")
        .file(
            "syn20",
            "sarek_out/VariantCalling/Strelka2/patient1_vs_patient1_normal/patient1_vs_patient1_normal.strelka.somatic_snvs.vcf.gz",
        )
        .file(
            "syn21",
            "sarek_out/VariantCalling/Strelka2/patient1_vs_patient1_normal/patient1_vs_patient1_normal.strelka.somatic_snvs.vcf.gz.tbi",
        )
        .file(
            "syn22",
            "sarek_out/VariantCalling/patient2/HaplotypeCaller/patient2.haplotypecaller.vcf.gz",
        )
        .file("syn23", "sarek_out/VariantCalling/patient2/Manta/patient2.manta.diploidSV.vcf.gz")
        .file("syn24", "sarek_out/Annotation/Strelka2/patient1_vs_patient1_normal/patient1_vs_patient1_normal.maf")
        .annotate(
            "syn300",
            &[
                ("specimenID", "patient1"),
                ("individualID", "patient1"),
                ("assay", "whole genome sequencing"),
                ("dataType", "raw"),
                ("comments", "do not copy"),
            ],
        )
        .annotate("syn302", &[("specimenID", "patient2"), ("individualID", "patient2")])
}

/// `proj` (syn1) / `rnaseq_out` (syn3) with quantification and alignments.
pub fn rnaseq_project() -> MockSynapse {
    MockSynapse::new()
        .project("syn1", "proj")
        .folder("syn3", "rnaseq_out", "syn1")
        .file("syn40", "rnaseq_out/star_salmon/S1/quant.sf")
        .file("syn41", "rnaseq_out/star_salmon/S2/quant.sf")
        .file(
            "syn42",
            "rnaseq_out/star_salmon/featurecounts/S1.featureCounts.txt",
        )
        .file("syn43", "rnaseq_out/star_salmon/S1.markdup.sorted.bam")
        .file("syn44", "rnaseq_out/star_salmon/S2.markdup.sorted.bam")
        .annotate(
            "syn400",
            &[
                ("specimenID", "S1"),
                ("assay", "rnaSeq"),
                ("fileFormat", "fastq"),
            ],
        )
        .annotate("syn402", &[("specimenID", "S2"), ("assay", "rnaSeq")])
}

pub fn write_sheet(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}
