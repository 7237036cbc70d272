// src/extract.rs

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::merge::MergedMatrix;
use crate::ranks::RankScheme;
use crate::types::{RankTableRow, SampleId};

/// Exact-rank projection of a merged matrix, e.g. all phylum-level rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RankTable {
    pub depth: usize,
    pub rank_code: String,
    pub rank_name: String,
    /// Same column order as the merged matrix.
    pub samples: Vec<SampleId>,
    /// Sorted by taxonomy path.
    pub rows: Vec<RankTableRow>,
}

impl RankTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, taxonomy_path: &str) -> Option<&RankTableRow> {
        self.rows.iter().find(|r| r.taxonomy_path == taxonomy_path)
    }
}

/// Extracts the rows classified exactly to `rank` (a code such as `p` or a
/// name such as `phylum`).
pub fn extract(matrix: &MergedMatrix, scheme: &RankScheme, rank: &str) -> Result<RankTable> {
    let depth = scheme.resolve(rank)?;
    extract_at(matrix, scheme, depth)
}

/// Extracts the rows whose deepest classified rank is `depth`.
///
/// Profilers emit one row per prefix of every clade, so a genus appears both
/// as `...|g__X` and inside `...|g__X|s__Y`. Only the first is taken here;
/// counting the ancestors of deeper rows would double-count their abundance.
/// Rows that end up on the same taxonomy path are summed per sample before
/// totals are computed. A rank that no sample reaches yields an empty table.
pub fn extract_at(matrix: &MergedMatrix, scheme: &RankScheme, depth: usize) -> Result<RankTable> {
    let rank = scheme
        .get(depth)
        .ok_or_else(|| Error::UnknownRank(format!("depth {depth}")))?;
    let width = matrix.samples().len();

    let mut by_path: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in matrix.rows() {
        if !row.lineage.is_exact_at(depth) {
            continue;
        }
        let Some(path) = row.lineage.path_to(depth) else {
            continue;
        };
        let cells = by_path.entry(path).or_insert_with(|| vec![0.0; width]);
        for (cell, value) in cells.iter_mut().zip(&row.values) {
            *cell += value;
        }
    }

    let rows: Vec<RankTableRow> = by_path
        .into_iter()
        .map(|(taxonomy_path, values)| RankTableRow {
            taxonomy_path,
            total_abundance: values.iter().sum(),
            values,
        })
        .collect();

    log::debug!("{} level: {} rows", rank.name, rows.len());
    Ok(RankTable {
        depth,
        rank_code: rank.code.clone(),
        rank_name: rank.name.clone(),
        samples: matrix.samples().to_vec(),
        rows,
    })
}

/// One exact-rank table per rank of the scheme, most general first.
pub fn extract_all(matrix: &MergedMatrix, scheme: &RankScheme) -> Result<Vec<RankTable>> {
    (0..scheme.len())
        .map(|depth| extract_at(matrix, scheme, depth))
        .collect()
}
