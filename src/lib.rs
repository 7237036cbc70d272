// src/lib.rs
pub mod types;
pub mod error;
pub mod ranks;
pub mod lineage;
pub mod profile;
pub mod merge;
pub mod extract;
pub mod collapse;
pub mod output;

use std::path::PathBuf;

use crate::collapse::build_summary;
use crate::error::{Error, Result};
use crate::extract::{extract_at, RankTable};
use crate::merge::{load_tables, merge, MergedMatrix};
use crate::output::{render_merged, render_rank_table, render_summary};
use crate::profile::IngestOptions;
use crate::types::SummaryRecord;

/// Settings for one merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub ingest: IngestOptions,
    /// Explicit sample column order; lexicographic when `None`.
    pub sample_order: Option<Vec<String>>,
    /// Ranks (codes or names) to extract exact-level tables for; all when `None`.
    pub ranks: Option<Vec<String>>,
}

/// Everything a merge run produces. Tables are kept structured and rendered
/// to TSV text on demand.
pub struct MergeResults {
    pub matrix: MergedMatrix,
    /// Exact-rank tables, in scheme order. Empty tables are kept.
    pub rank_tables: Vec<RankTable>,
    pub summary: Vec<SummaryRecord>,
    /// Input files that were skipped, with the reason.
    pub skipped: Vec<Error>,
}

impl MergeResults {
    /// Generate `merged.tsv` text on demand
    pub fn get_merged_table(&self) -> String {
        render_merged(&self.matrix)
    }

    /// Generate one `merged_<rank>.tsv` text on demand, by rank code or name
    pub fn get_rank_table(&self, rank: &str) -> Option<String> {
        self.rank_tables
            .iter()
            .find(|t| t.rank_code == rank || t.rank_name.eq_ignore_ascii_case(rank))
            .map(render_rank_table)
    }

    /// Generate `summary.tsv` text on demand
    pub fn get_summary(&self) -> String {
        render_summary(&self.summary)
    }
}

/// Unified function to merge profiles from one or many files.
///
/// Files that cannot be read are skipped with a warning; malformed rows and
/// bad values are handled inside each file. The run only fails when not a
/// single file is usable (`Error::NoInputData`, naming every rejected path)
/// or when a requested rank is unknown.
pub fn merge_profiles(inputs: &[PathBuf], options: &MergeOptions) -> Result<MergeResults> {
    let scheme = &options.ingest.scheme;

    // 1. Resolve requested ranks before doing any work
    let depths: Vec<usize> = match &options.ranks {
        Some(ranks) => ranks
            .iter()
            .map(|r| scheme.resolve(r))
            .collect::<Result<_>>()?,
        None => (0..scheme.len()).collect(),
    };

    // 2. Parse all files in parallel
    let mut tables = Vec::with_capacity(inputs.len());
    let mut skipped = Vec::new();
    for result in load_tables(inputs, &options.ingest) {
        match result {
            Ok(table) => tables.push(table),
            Err(e) => {
                log::warn!("{e}; file skipped");
                skipped.push(e);
            }
        }
    }

    if tables.is_empty() {
        let detail = if skipped.is_empty() {
            "no input files given".to_string()
        } else {
            skipped
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(Error::NoInputData(detail));
    }

    // 3. Single-writer reduce into the merged matrix
    let matrix = merge(&tables, options.sample_order.as_deref())?;

    // 4. Exact-rank tables and the long-format summary
    let rank_tables = depths
        .into_iter()
        .map(|depth| extract_at(&matrix, scheme, depth))
        .collect::<Result<Vec<_>>>()?;
    let summary = build_summary(&matrix, scheme)?;

    Ok(MergeResults {
        matrix,
        rank_tables,
        summary,
        skipped,
    })
}
