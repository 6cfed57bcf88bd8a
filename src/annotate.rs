use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::annotations::{AnnotationValue, Annotations};
use crate::classify::SOMATIC_DELIMITER;
use crate::domain::{OutputKind, SynapseId, Workflow};
use crate::error::AnnotatorError;
use crate::link::LinkedRecord;
use crate::qc;
use crate::rules::{
    AnnotationRule, Annotator, COPY_NUMBER_FORMATS, ExpressionUnit, INDEX_FORMATS, MAF_FORMATS,
    annotation_rule, component_name,
};
use crate::schema::SchemaSource;
use crate::synapse::SynapseClient;

pub const DEFAULT_GENOMIC_REFERENCE: &str = "GRCh38";

/// Template properties that are recomputed per output and never copied from inputs.
pub const NON_INHERITABLE: [&str; 8] = [
    "Filename",
    "entityId",
    "comments",
    "progressReportNumber",
    "Component",
    "fileFormat",
    "dataType",
    "dataSubtype",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestRow {
    #[serde(flatten)]
    pub record: LinkedRecord,
    pub annotations: Annotations,
}

impl ManifestRow {
    pub fn kind(&self) -> OutputKind {
        self.record.output.output_kind
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.annotations
            .insert(key.to_string(), AnnotationValue::Text(value.into()));
    }
}

/// Shared handles for annotators that reach back into Synapse.
pub struct AnnotationContext<'a, C: SynapseClient + ?Sized> {
    pub client: &'a C,
    pub fileview: &'a SynapseId,
    pub genomic_reference: &'a str,
}

pub fn inheritable_keys<S: SchemaSource + ?Sized>(
    schema: &S,
    template: &str,
) -> Result<BTreeSet<String>, AnnotatorError> {
    Ok(schema
        .template_properties(template)?
        .into_iter()
        .filter(|key| !NON_INHERITABLE.contains(&key.as_str()))
        .collect())
}

/// Reads the source snapshot and returns only `keys`.
pub fn copy_annotations<C: SynapseClient + ?Sized>(
    client: &C,
    from: &SynapseId,
    keys: &BTreeSet<String>,
) -> Result<Annotations, AnnotatorError> {
    Ok(client.get_annotations(from)?.select(keys))
}

/// Inherits template-governed attributes from each output's first input.
/// The batch must hold a single output kind.
pub fn derive_annotations<C, S>(
    client: &C,
    schema: &S,
    linked: &[LinkedRecord],
    template: Option<&str>,
) -> Result<Vec<ManifestRow>, AnnotatorError>
where
    C: SynapseClient + ?Sized,
    S: SchemaSource + ?Sized,
{
    let Some(first) = linked.first() else {
        return Ok(Vec::new());
    };
    let kind = first.output.output_kind;
    if let Some(other) = linked.iter().find(|record| record.output.output_kind != kind) {
        return Err(AnnotatorError::HeterogeneousBatch(format!(
            "{kind} and {}",
            other.output.output_kind
        )));
    }
    let template = template.unwrap_or_else(|| annotation_rule(kind).template);
    let keys = inheritable_keys(schema, template)?;
    debug!(%template, keys = keys.len(), "inheritable properties");

    let mut inherited: HashMap<SynapseId, Annotations> = HashMap::new();
    let mut rows = Vec::with_capacity(linked.len());
    for record in linked {
        let annotations = match record.primary_input() {
            Some(input) => match inherited.get(input) {
                Some(annotations) => annotations.clone(),
                None => {
                    let annotations = copy_annotations(client, input, &keys)?;
                    inherited.insert(input.clone(), annotations.clone());
                    annotations
                }
            },
            None => Annotations::new(),
        };
        rows.push(ManifestRow {
            record: record.clone(),
            annotations,
        });
    }
    Ok(rows)
}

/// Applies the kind's annotator to a homogeneous batch. `template` overrides
/// the kind's default and must match the one passed to [`derive_annotations`].
pub fn annotate_batch<C: SynapseClient + ?Sized>(
    ctx: &AnnotationContext<'_, C>,
    kind: OutputKind,
    template: Option<&str>,
    rows: &mut [ManifestRow],
    workflow_link: &str,
) -> Result<(), AnnotatorError> {
    let default = annotation_rule(kind);
    let rule = AnnotationRule {
        format: default.format,
        annotator: default.annotator,
        template: template.unwrap_or(default.template),
    };
    match rule.annotator {
        Annotator::AlignedReads => annotate_aligned_reads(ctx, &rule, rows, workflow_link),
        Annotator::Expression(unit) => {
            annotate_expression(&rule, unit, rows, workflow_link);
            Ok(())
        }
        Annotator::CalledVariants => annotate_called_variants(&rule, rows, workflow_link),
    }
}

fn set_common(row: &mut ManifestRow, rule: &AnnotationRule<'_>, data_type: &str, workflow_link: &str) {
    let format = (rule.format)(&row.record.output.output_name);
    row.set("Component", component_name(rule.template));
    row.set("fileFormat", format);
    row.set("dataType", data_type);
    row.set("dataSubtype", "processed");
    row.set("workflowLink", workflow_link);
}

pub fn annotate_aligned_reads<C: SynapseClient + ?Sized>(
    ctx: &AnnotationContext<'_, C>,
    rule: &AnnotationRule<'_>,
    rows: &mut [ManifestRow],
    workflow_link: &str,
) -> Result<(), AnnotatorError> {
    for row in rows.iter_mut() {
        set_common(row, rule, "AlignedReads", workflow_link);
        row.set("genomicReference", ctx.genomic_reference);
    }
    let from_rnaseq = rows
        .first()
        .map(|row| row.record.output.workflow == Workflow::Rnaseq)
        .unwrap_or(false);
    if from_rnaseq {
        qc::enrich_with_samtools_stats(ctx.client, ctx.fileview, rows);
    }
    Ok(())
}

pub fn annotate_expression(
    rule: &AnnotationRule<'_>,
    unit: ExpressionUnit,
    rows: &mut [ManifestRow],
    workflow_link: &str,
) {
    for row in rows.iter_mut() {
        set_common(row, rule, "geneExpression", workflow_link);
        row.set("expressionUnit", unit.to_string());
    }
}

/// Decides every row's data type before touching any row, so a miss leaves the
/// batch unchanged.
pub fn annotate_called_variants(
    rule: &AnnotationRule<'_>,
    rows: &mut [ManifestRow],
    workflow_link: &str,
) -> Result<(), AnnotatorError> {
    let data_types = rows
        .iter()
        .map(|row| {
            let name = &row.record.output.output_name;
            variant_data_type(name, &(rule.format)(name))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (row, data_type) in rows.iter_mut().zip(data_types) {
        set_common(row, rule, data_type, workflow_link);
    }
    Ok(())
}

/// Closed decision table over (somatic delimiter present, format).
pub fn variant_data_type(file_name: &str, format: &str) -> Result<&'static str, AnnotatorError> {
    let somatic = file_name.contains(SOMATIC_DELIMITER);
    let data_type = match format {
        "vcf" if somatic => "SomaticVariants",
        "vcf" => "GermlineVariants",
        f if MAF_FORMATS.contains(&f) && somatic => "AnnotatedSomaticVariants",
        f if MAF_FORMATS.contains(&f) => "AnnotatedGermlineVariants",
        f if INDEX_FORMATS.contains(&f) => "dataIndex",
        f if COPY_NUMBER_FORMATS.contains(&f) => "CopyNumberVariants",
        _ => {
            return Err(AnnotatorError::UnrecognizedDataType {
                name: file_name.to_string(),
                format: format.to_string(),
            });
        }
    };
    Ok(data_type)
}
