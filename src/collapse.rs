// src/collapse.rs

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::merge::MergedMatrix;
use crate::ranks::RankScheme;
use crate::types::{SampleId, SummaryRecord};

/// Bucket for rows that carry no label at the collapsed rank.
pub const UNCLASSIFIED_BUCKET: &str = "unclassified";

/// Per-sample sums of every row, bucketed by its label at one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedRank {
    pub depth: usize,
    pub rank_code: String,
    pub samples: Vec<SampleId>,
    /// label → one sum per sample, ordered by label.
    pub buckets: BTreeMap<String, Vec<f64>>,
}

impl CollapsedRank {
    pub fn bucket(&self, label: &str) -> Option<&[f64]> {
        self.buckets.get(label).map(Vec::as_slice)
    }

    /// Sum of all buckets for one sample column; `None` past the last column.
    pub fn column_total(&self, col: usize) -> Option<f64> {
        if col >= self.samples.len() {
            return None;
        }
        Some(self.buckets.values().map(|v| v[col]).sum())
    }
}

/// Collapses the matrix by the label at `rank` (code or name).
pub fn collapse_by_rank(matrix: &MergedMatrix, scheme: &RankScheme, rank: &str) -> Result<CollapsedRank> {
    let depth = scheme.resolve(rank)?;
    collapse_at(matrix, scheme, depth)
}

/// Collapses the matrix by the label at `depth`.
///
/// Unlike [`crate::extract::extract_at`] this does not look at how deep a
/// row goes: `k__B`, `k__B|p__F` and `k__B|p__F|c__C` all land in the `B`
/// bucket when collapsing by kingdom. Rows without a label at `depth` go to
/// [`UNCLASSIFIED_BUCKET`], so every row is counted exactly once per rank.
pub fn collapse_at(matrix: &MergedMatrix, scheme: &RankScheme, depth: usize) -> Result<CollapsedRank> {
    let rank = scheme
        .get(depth)
        .ok_or_else(|| Error::UnknownRank(format!("depth {depth}")))?;
    let width = matrix.samples().len();

    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in matrix.rows() {
        let label = row
            .lineage
            .label_at(depth)
            .map(|l| l.name.as_str())
            .unwrap_or(UNCLASSIFIED_BUCKET);

        let cells = buckets
            .entry(label.to_string())
            .or_insert_with(|| vec![0.0; width]);
        for (cell, value) in cells.iter_mut().zip(&row.values) {
            *cell += value;
        }
    }

    Ok(CollapsedRank {
        depth,
        rank_code: rank.code.clone(),
        samples: matrix.samples().to_vec(),
        buckets,
    })
}

/// Long-format summary over every summarised rank of the scheme.
///
/// Records come rank by rank in scheme order (`k p c o f g s` by default),
/// then by taxon label, then by sample in matrix column order.
pub fn build_summary(matrix: &MergedMatrix, scheme: &RankScheme) -> Result<Vec<SummaryRecord>> {
    let mut records = Vec::new();
    for depth in scheme.summary_depths() {
        let collapsed = collapse_at(matrix, scheme, depth)?;
        records.reserve(collapsed.buckets.len() * collapsed.samples.len());
        for (taxon, values) in &collapsed.buckets {
            for (sample_id, value) in collapsed.samples.iter().zip(values) {
                records.push(SummaryRecord {
                    sample_id: sample_id.clone(),
                    taxon: taxon.clone(),
                    rank: collapsed.rank_code.clone(),
                    relative_abundance: *value,
                });
            }
        }
    }
    log::debug!("summary: {} records", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;
    use crate::merge::tests::{table, worked_example};

    #[test]
    fn test_collapse_is_depth_agnostic() {
        let scheme = RankScheme::default();
        let m = merge(&worked_example(), None).unwrap();

        let kingdom = collapse_by_rank(&m, &scheme, "k").unwrap();
        assert_eq!(kingdom.bucket("Bacteria"), Some(&[20.0, 16.0][..]));
        assert!(kingdom.bucket(UNCLASSIFIED_BUCKET).is_none());

        let phylum = collapse_by_rank(&m, &scheme, "phylum").unwrap();
        assert_eq!(phylum.bucket("Firmicutes"), Some(&[6.0, 8.0][..]));
        assert_eq!(phylum.bucket("Bacteroidetes"), Some(&[4.0, 0.0][..]));
        assert_eq!(phylum.bucket(UNCLASSIFIED_BUCKET), Some(&[10.0, 8.0][..]));
    }

    #[test]
    fn test_collapse_conserves_sample_totals() {
        let scheme = RankScheme::default();
        let tables = vec![
            table(
                "S1",
                "k__Bacteria\t50\n\
                 k__Bacteria|p__Firmicutes\t30.25\n\
                 k__Bacteria|p__Firmicutes|c__Bacilli\t20.5\n\
                 k__Archaea\t0.125\n\
                 UNCLASSIFIED\t49.875\n",
            ),
            table("S2", "k__Bacteria|p__Proteobacteria\t7\n"),
        ];
        let m = merge(&tables, None).unwrap();
        for depth in 0..scheme.len() {
            let c = collapse_at(&m, &scheme, depth).unwrap();
            for col in 0..m.samples().len() {
                let collapsed = c.column_total(col).unwrap();
                assert!((collapsed - m.column_total(col).unwrap()).abs() < 1e-9);
            }
            assert_eq!(c.column_total(m.samples().len()), None);
        }
    }

    #[test]
    fn test_unclassified_row_lands_in_unclassified_bucket() {
        let scheme = RankScheme::default();
        let m = merge(
            &[table(
                "S",
                "#clade_name\tclade_taxid\trelative_abundance\tcoverage\testimated_number_of_reads_from_the_clade\n\
                 UNCLASSIFIED\t-1\t12.5\t\n\
                 k__Bacteria\t2\t87.5\t\n",
            )],
            None,
        )
        .unwrap();

        let kingdom = collapse_by_rank(&m, &scheme, "k").unwrap();
        assert_eq!(kingdom.bucket("Bacteria"), Some(&[87.5][..]));
        assert_eq!(kingdom.bucket(UNCLASSIFIED_BUCKET), Some(&[12.5][..]));
        assert!(kingdom.bucket("UNCLASSIFIED").is_none());

        // Below kingdom the Bacteria row has no label either.
        for depth in scheme.summary_depths().skip(1) {
            let c = collapse_at(&m, &scheme, depth).unwrap();
            assert_eq!(c.buckets.len(), 1);
            assert_eq!(c.bucket(UNCLASSIFIED_BUCKET), Some(&[100.0][..]));
        }
    }

    #[test]
    fn test_summary_order() {
        let scheme = RankScheme::default();
        let m = merge(&worked_example(), None).unwrap();
        let summary = build_summary(&m, &scheme).unwrap();

        let ranks: Vec<&str> = summary.iter().map(|r| r.rank.as_str()).collect();
        let mut seen: Vec<&str> = Vec::new();
        for r in ranks.iter().copied() {
            if seen.last() != Some(&r) {
                seen.push(r);
            }
        }
        assert_eq!(seen, vec!["k", "p", "c", "o", "f", "g", "s"]);

        // Kingdom: one taxon × two samples.
        assert_eq!(summary[0].sample_id, "A");
        assert_eq!(summary[0].taxon, "Bacteria");
        assert_eq!(summary[0].relative_abundance, 20.0);
        assert_eq!(summary[1].sample_id, "B");

        // Phylum buckets sorted by label, unclassified last.
        let phylum: Vec<(&str, &str)> = summary
            .iter()
            .filter(|r| r.rank == "p")
            .map(|r| (r.taxon.as_str(), r.sample_id.as_str()))
            .collect();
        assert_eq!(
            phylum,
            vec![
                ("Bacteroidetes", "A"),
                ("Bacteroidetes", "B"),
                ("Firmicutes", "A"),
                ("Firmicutes", "B"),
                ("unclassified", "A"),
                ("unclassified", "B"),
            ]
        );
        assert!(summary.iter().all(|r| r.rank != "t"));
    }
}
