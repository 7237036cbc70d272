//src/types.rs

use crate::lineage::Lineage;

/// Column identifier in every wide table.
pub type SampleId = String;

/// One row of the merged (lineage × sample) matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub lineage: Lineage,
    /// One value per sample, in the matrix's column order.
    pub values: Vec<f64>,
}

/// One row of an exact-rank table, e.g. `merged_phylum.tsv`:
///  taxonomy_path  total_abundance  <sample>...
#[derive(Debug, Clone, PartialEq)]
pub struct RankTableRow {
    pub taxonomy_path: String,
    pub total_abundance: f64,
    pub values: Vec<f64>,
}

/// One line of the long-format summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub sample_id: SampleId,
    pub taxon: String,
    pub rank: String,          // rank code, e.g. "p"
    pub relative_abundance: f64,
}
