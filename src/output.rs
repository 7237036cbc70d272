// src/output.rs

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashSet;

use crate::collapse::CollapsedRank;
use crate::error::Result;
use crate::extract::RankTable;
use crate::merge::MergedMatrix;
use crate::types::SummaryRecord;

/// `merged.tsv`: `clade_name` then one column per sample, rows in clade order.
pub fn render_merged(matrix: &MergedMatrix) -> String {
    let mut output = String::new();
    output.push_str("clade_name");
    for sample in matrix.samples() {
        output.push('\t');
        output.push_str(sample);
    }
    output.push('\n');

    for row in matrix.rows() {
        output.push_str(row.lineage.path());
        push_values(&mut output, &row.values);
        output.push('\n');
    }
    output
}

/// `merged_<rank>.tsv`: `taxonomy_path`, `total_abundance`, then samples.
pub fn render_rank_table(table: &RankTable) -> String {
    let mut output = String::new();
    output.push_str("taxonomy_path\ttotal_abundance");
    for sample in &table.samples {
        output.push('\t');
        output.push_str(sample);
    }
    output.push('\n');

    for row in &table.rows {
        let _ = write!(output, "{}\t{}", row.taxonomy_path, row.total_abundance);
        push_values(&mut output, &row.values);
        output.push('\n');
    }
    output
}

/// `summary.tsv`: one `sample_id, taxon, rank, relative_abundance` line per record.
pub fn render_summary(records: &[SummaryRecord]) -> String {
    let mut output = String::new();
    output.push_str("sample_id\ttaxon\trank\trelative_abundance\n");
    for r in records {
        let _ = writeln!(
            output,
            "{}\t{}\t{}\t{}",
            r.sample_id, r.taxon, r.rank, r.relative_abundance
        );
    }
    output
}

/// Wide view of one collapsed rank: `taxon` then samples.
pub fn render_collapsed(collapsed: &CollapsedRank) -> String {
    let mut output = String::from("taxon");
    for sample in &collapsed.samples {
        output.push('\t');
        output.push_str(sample);
    }
    output.push('\n');
    for (taxon, values) in &collapsed.buckets {
        output.push_str(taxon);
        push_values(&mut output, values);
        output.push('\n');
    }
    output
}

fn push_values(output: &mut String, values: &[f64]) {
    for v in values {
        let _ = write!(output, "\t{v}");
    }
}

/// File name of an exact-rank table, e.g. `merged_phylum.tsv`.
pub fn rank_file_name(table: &RankTable) -> String {
    format!("merged_{}.tsv", table.rank_name)
}

/// File name for a clade's own table: `|`, `/` and spaces become `_`.
pub fn clade_file_name(clade_path: &str) -> String {
    let safe: String = clade_path
        .chars()
        .map(|c| match c {
            '|' | '/' | '\\' | ' ' => '_',
            c => c,
        })
        .collect();
    format!("{safe}.tsv")
}

/// Writes `contents` to `path`, creating missing parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

/// Writes every non-empty rank table into `dir`. Returns the written paths.
pub fn write_rank_tables(dir: &Path, tables: &[RankTable]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for table in tables {
        if table.is_empty() {
            log::info!("no {}-level rows; {} not written", table.rank_name, rank_file_name(table));
            continue;
        }
        let path = dir.join(rank_file_name(table));
        write_file(&path, &render_rank_table(table))?;
        written.push(path);
    }
    Ok(written)
}

/// Writes one `sample_id, relative_abundance` file per merged row into `dir`.
pub fn write_clade_tables(dir: &Path, matrix: &MergedMatrix) -> Result<usize> {
    fs::create_dir_all(dir)?;
    let mut names: AHashSet<String> = AHashSet::with_capacity(matrix.len());

    for row in matrix.rows() {
        let name = clade_file_name(row.lineage.path());
        if !names.insert(name.clone()) {
            log::warn!("{} maps to an existing file name {name}; overwritten", row.lineage);
        }
        let mut output = String::from("sample_id\trelative_abundance\n");
        for (sample, value) in matrix.samples().iter().zip(&row.values) {
            let _ = writeln!(output, "{sample}\t{value}");
        }
        fs::write(dir.join(&name), output)?;
    }
    log::info!("wrote {} clade files to {}", matrix.len(), dir.display());
    Ok(matrix.len())
}
