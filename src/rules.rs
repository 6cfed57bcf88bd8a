use std::fmt;

use crate::domain::OutputKind;

pub const ALIGNED_READS_TEMPLATE: &str = "bts:ProcessedAlignedReadsTemplate";
pub const EXPRESSION_TEMPLATE: &str = "bts:ProcessedExpressionTemplate";
pub const VARIANT_CALLS_TEMPLATE: &str = "bts:ProcessedVariantCallsTemplate";

pub const INDEX_FORMATS: [&str; 4] = ["tbi", "csi", "bai", "crai"];
pub const MAF_FORMATS: [&str; 1] = ["maf"];
pub const COPY_NUMBER_FORMATS: [&str; 4] = ["cnr", "cns", "seg", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionUnit {
    Tpm,
    Counts,
}

impl fmt::Display for ExpressionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionUnit::Tpm => write!(f, "TPM"),
            ExpressionUnit::Counts => write!(f, "Counts"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotator {
    AlignedReads,
    Expression(ExpressionUnit),
    CalledVariants,
}

#[derive(Clone, Copy)]
pub struct AnnotationRule<'a> {
    pub format: fn(&str) -> String,
    pub annotator: Annotator,
    pub template: &'a str,
}

impl fmt::Debug for AnnotationRule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationRule")
            .field("annotator", &self.annotator)
            .field("template", &self.template)
            .finish()
    }
}

pub fn annotation_rule(kind: OutputKind) -> AnnotationRule<'static> {
    match kind {
        OutputKind::StarSalmon => AnnotationRule {
            format: |_| "sf".to_string(),
            annotator: Annotator::Expression(ExpressionUnit::Tpm),
            template: EXPRESSION_TEMPLATE,
        },
        OutputKind::FeatureCounts => AnnotationRule {
            format: |_| "txt".to_string(),
            annotator: Annotator::Expression(ExpressionUnit::Counts),
            template: EXPRESSION_TEMPLATE,
        },
        OutputKind::Samtools => AnnotationRule {
            format: alignment_format,
            annotator: Annotator::AlignedReads,
            template: ALIGNED_READS_TEMPLATE,
        },
        OutputKind::Strelka2
        | OutputKind::Mutect2
        | OutputKind::FreeBayes
        | OutputKind::DeepVariant
        | OutputKind::HaplotypeCaller
        | OutputKind::Manta
        | OutputKind::Vcf2maf => AnnotationRule {
            format: variant_format,
            annotator: Annotator::CalledVariants,
            template: VARIANT_CALLS_TEMPLATE,
        },
        OutputKind::Ascat | OutputKind::Cnvkit | OutputKind::ControlFreec => AnnotationRule {
            format: copy_number_format,
            annotator: Annotator::CalledVariants,
            template: VARIANT_CALLS_TEMPLATE,
        },
    }
}

pub fn format_for(kind: OutputKind, file_name: &str) -> String {
    (annotation_rule(kind).format)(file_name)
}

pub fn annotator_for(kind: OutputKind) -> Annotator {
    annotation_rule(kind).annotator
}

pub fn template_for(kind: OutputKind) -> &'static str {
    annotation_rule(kind).template
}

/// Template id without its schema prefix, used as the `Component` value.
pub fn component_name(template: &str) -> &str {
    template
        .split_once(':')
        .map(|(_, name)| name)
        .unwrap_or(template)
}

pub fn alignment_format(file_name: &str) -> String {
    by_suffix(
        file_name,
        &[(".bai", "bai"), (".crai", "crai"), (".cram", "cram"), (".bam", "bam")],
    )
}

pub fn variant_format(file_name: &str) -> String {
    by_suffix(
        file_name,
        &[
            (".tbi", "tbi"),
            (".csi", "csi"),
            (".maf.gz", "maf"),
            (".maf", "maf"),
            (".vcf.gz", "vcf"),
            (".vcf", "vcf"),
            (".bcf", "bcf"),
        ],
    )
}

pub fn copy_number_format(file_name: &str) -> String {
    by_suffix(
        file_name,
        &[(".cnr", "cnr"), (".cns", "cns"), (".seg", "seg"), (".txt", "txt")],
    )
}

/// First matching suffix wins; otherwise the last extension, lowercased.
fn by_suffix(file_name: &str, table: &[(&str, &str)]) -> String {
    let lower = file_name.to_ascii_lowercase();
    table
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix))
        .map(|(_, format)| format.to_string())
        .unwrap_or_else(|| {
            lower
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn every_kind_has_a_rule() {
        for kind in OutputKind::value_variants() {
            let rule = annotation_rule(*kind);
            assert!(rule.template.starts_with("bts:"));
        }
    }

    #[test]
    fn expression_units() {
        assert_eq!(
            annotator_for(OutputKind::StarSalmon),
            Annotator::Expression(ExpressionUnit::Tpm)
        );
        assert_eq!(
            annotator_for(OutputKind::FeatureCounts),
            Annotator::Expression(ExpressionUnit::Counts)
        );
    }

    #[test]
    fn format_inference() {
        assert_eq!(format_for(OutputKind::Samtools, "S1.markdup.sorted.bam"), "bam");
        assert_eq!(format_for(OutputKind::Samtools, "S1.markdup.sorted.bam.bai"), "bai");
        assert_eq!(format_for(OutputKind::Strelka2, "S1.variants.vcf.gz"), "vcf");
        assert_eq!(format_for(OutputKind::Strelka2, "S1.variants.vcf.gz.tbi"), "tbi");
        assert_eq!(format_for(OutputKind::Vcf2maf, "S1.maf"), "maf");
        assert_eq!(format_for(OutputKind::Cnvkit, "S1.call.cns"), "cns");
        assert_eq!(format_for(OutputKind::StarSalmon, "quant.sf"), "sf");
        assert_eq!(format_for(OutputKind::Manta, "README"), "");
    }

    #[test]
    fn component_strips_prefix() {
        assert_eq!(
            component_name(template_for(OutputKind::Samtools)),
            "ProcessedAlignedReadsTemplate"
        );
        assert_eq!(component_name("PlainTemplate"), "PlainTemplate");
    }
}
