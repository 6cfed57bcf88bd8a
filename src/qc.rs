use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::annotate::ManifestRow;
use crate::annotations::{AnnotationValue, Annotations};
use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::query::IndexFilter;
use crate::synapse::{SynapseClient, resolve_path};
use crate::table::Table;

/// Location of the MultiQC samtools stats table relative to the rnaseq output root.
pub const SAMTOOLS_STATS_DIR: &str = "multiqc/star_salmon/multiqc_data";
pub const SAMTOOLS_STATS_FILE: &str = "multiqc_samtools_stats.txt";

/// MultiQC column name to annotation key.
pub const SAMTOOLS_STATS_FIELDS: [(&str, &str); 7] = [
    ("raw_total_sequences", "totalReads"),
    ("average_length", "averageReadLength"),
    ("average_quality", "averageBaseQuality"),
    ("insert_size_average", "averageInsertSize"),
    ("pairs_on_different_chromosomes", "pairsOnDifferentChr"),
    ("reads_duplicated_percent", "readsDuplicatedPercent"),
    ("reads_mapped_percent", "readsMappedPercent"),
];

const SAMPLE_SUFFIXES: [&str; 4] = [".markdup.sorted.bam", ".markdup.sorted", ".sorted.bam", ".bam"];

/// Adds samtools metrics to aligned-reads rows. Any failure to find or read the
/// stats table is logged and leaves the rows as they were. Returns the number
/// of rows enriched.
pub fn enrich_with_samtools_stats<C: SynapseClient + ?Sized>(
    client: &C,
    fileview: &SynapseId,
    rows: &mut [ManifestRow],
) -> usize {
    let Some(output_root) = rows.first().map(|row| row.record.output.output_root.clone()) else {
        return 0;
    };
    let stats = match load_samtools_stats(client, fileview, &output_root) {
        Ok(Some(stats)) => stats,
        Ok(None) => {
            warn!(%output_root, "samtools stats table not found; skipping QC metrics");
            return 0;
        }
        Err(err) => {
            warn!(%output_root, error = %err, "samtools stats unavailable; skipping QC metrics");
            return 0;
        }
    };
    let enriched = merge_stats(rows, &stats);
    info!(rows = enriched, "added samtools QC metrics");
    enriched
}

pub fn locate_samtools_stats<C: SynapseClient + ?Sized>(
    client: &C,
    fileview: &SynapseId,
    output_root: &SynapseId,
) -> Result<Option<SynapseId>, AnnotatorError> {
    let root_path = resolve_path(client, output_root)?;
    let dir = if root_path.is_empty() {
        SAMTOOLS_STATS_DIR.to_string()
    } else {
        format!("{root_path}/{SAMTOOLS_STATS_DIR}")
    };
    let filter = IndexFilter::under(&root_path)
        .path_like(format!("{dir}/{SAMTOOLS_STATS_FILE}"))
        .name_like(SAMTOOLS_STATS_FILE);
    let rows = client.query_files(fileview, &filter)?;
    Ok(rows.into_iter().next().map(|row| row.id))
}

fn load_samtools_stats<C: SynapseClient + ?Sized>(
    client: &C,
    fileview: &SynapseId,
    output_root: &SynapseId,
) -> Result<Option<HashMap<String, Annotations>>, AnnotatorError> {
    let Some(id) = locate_samtools_stats(client, fileview, output_root)? else {
        return Ok(None);
    };
    debug!(%id, "reading samtools stats");
    let table = Table::from_synapse(client, &id)?;
    samtools_stats_by_sample(&table).map(Some)
}

/// Per-sample metrics keyed by normalized sample name. Empty cells are skipped.
pub fn samtools_stats_by_sample(
    table: &Table,
) -> Result<HashMap<String, Annotations>, AnnotatorError> {
    let sample_col = table.column("Sample").ok_or_else(|| AnnotatorError::TableParse {
        source_name: SAMTOOLS_STATS_FILE.to_string(),
        message: "missing `Sample` column".to_string(),
    })?;
    let fields = SAMTOOLS_STATS_FIELDS
        .iter()
        .filter_map(|(column, key)| table.column(column).map(|idx| (idx, *key)))
        .collect::<Vec<_>>();

    let mut stats = HashMap::new();
    for row in 0..table.rows.len() {
        let Some(sample) = table.cell(row, sample_col) else {
            continue;
        };
        let metrics = fields
            .iter()
            .filter_map(|(idx, key)| {
                table
                    .cell(row, *idx)
                    .map(|raw| (key.to_string(), AnnotationValue::infer(raw)))
            })
            .collect::<Annotations>();
        stats.insert(normalize_sample(sample), metrics);
    }
    Ok(stats)
}

pub fn normalize_sample(raw: &str) -> String {
    let trimmed = raw.trim();
    SAMPLE_SUFFIXES
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix))
        .unwrap_or(trimmed)
        .to_string()
}

/// Metrics overwrite same-named keys. Rows without a stats entry are untouched.
pub fn merge_stats(rows: &mut [ManifestRow], stats: &HashMap<String, Annotations>) -> usize {
    let mut enriched = 0;
    for row in rows.iter_mut() {
        if let Some(metrics) = stats.get(&row.record.output.sample) {
            row.annotations
                .extend(metrics.iter().map(|(key, value)| (key.clone(), value.clone())));
            enriched += 1;
        }
    }
    enriched
}
