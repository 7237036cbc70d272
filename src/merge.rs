// src/merge.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::lineage::Lineage;
use crate::profile::{IngestOptions, SampleTable};
use crate::types::{MergedRow, SampleId};

/// The full outer join of all sample profiles of a run.
///
/// Rows are sorted by clade path, columns follow the sample order chosen at
/// merge time. Cells absent from a sample are exactly 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedMatrix {
    samples: Vec<SampleId>,
    rows: Vec<MergedRow>,
}

impl MergedMatrix {
    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sample_index(&self, sample: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == sample)
    }

    /// Row for a canonical clade path.
    pub fn row(&self, path: &str) -> Option<&MergedRow> {
        self.rows
            .binary_search_by(|r| r.lineage.path().cmp(path))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Value of one cell; `None` when the lineage or sample is not in the matrix.
    pub fn get(&self, path: &str, sample: &str) -> Option<f64> {
        let col = self.sample_index(sample)?;
        self.row(path).map(|r| r.values[col])
    }

    /// Sum of one sample column over all rows; `None` past the last column.
    pub fn column_total(&self, col: usize) -> Option<f64> {
        if col >= self.samples.len() {
            return None;
        }
        Some(self.rows.iter().map(|r| r.values[col]).sum())
    }
}

/// Parses every input file on the rayon pool.
///
/// Results come back in input order so the caller can report which paths
/// failed. Parsing is independent per file; nothing is shared until
/// [`merge`].
pub fn load_tables(paths: &[PathBuf], opts: &IngestOptions) -> Vec<Result<SampleTable>> {
    paths
        .par_iter()
        .map(|path| SampleTable::from_path(path, None, opts))
        .collect()
}

/// Outer-joins sample tables into one matrix in a single pass.
///
/// Columns follow `sample_order` when given, otherwise sample ids sorted
/// lexicographically, so the result does not depend on the order the tables
/// arrive in. With an explicit order, listed samples without a table become
/// all-zero columns and tables whose sample is not listed are left out.
/// Tables sharing a sample id are summed into one column.
pub fn merge(tables: &[SampleTable], sample_order: Option<&[String]>) -> Result<MergedMatrix> {
    if tables.is_empty() {
        return Err(Error::NoInputData("no sample tables to merge".to_string()));
    }

    let present: BTreeSet<&str> = tables.iter().map(SampleTable::sample_id).collect();

    let samples: Vec<SampleId> = match sample_order {
        Some(order) => {
            let mut seen = BTreeSet::new();
            let mut samples = Vec::with_capacity(order.len());
            for id in order {
                if !seen.insert(id.as_str()) {
                    log::warn!("sample '{id}' listed more than once in sample order; later entry ignored");
                    continue;
                }
                if !present.contains(id.as_str()) {
                    log::warn!("sample '{id}' has no input table; column filled with 0");
                }
                samples.push(id.clone());
            }
            for id in &present {
                if !seen.contains(id) {
                    log::warn!("sample '{id}' not in sample order; left out of the merge");
                }
            }
            samples
        }
        None => present.iter().map(|s| s.to_string()).collect(),
    };

    let columns: AHashMap<&str, usize> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    // Fixed visiting order keeps float sums of shared columns reproducible.
    let mut ordered: Vec<&SampleTable> = tables
        .iter()
        .filter(|t| columns.contains_key(t.sample_id()))
        .collect();
    ordered.sort_by(|a, b| {
        a.sample_id()
            .cmp(b.sample_id())
            .then_with(|| a.source().cmp(b.source()))
    });
    if ordered.is_empty() {
        return Err(Error::NoInputData(
            "none of the input samples is in the sample order".to_string(),
        ));
    }
    for pair in ordered.windows(2) {
        if pair[0].sample_id() == pair[1].sample_id() {
            log::warn!(
                "sample '{}' read from both {} and {}; values summed",
                pair[0].sample_id(),
                pair[0].source().display(),
                pair[1].source().display()
            );
        }
    }

    let width = samples.len();
    let capacity = ordered.iter().map(|t| t.len()).max().unwrap_or(0);
    let mut acc: AHashMap<Lineage, Vec<f64>> = AHashMap::with_capacity(capacity);

    for table in &ordered {
        let Some(&col) = columns.get(table.sample_id()) else {
            continue;
        };
        for (lineage, value) in table.iter() {
            let cells = acc
                .entry(lineage.clone())
                .or_insert_with(|| vec![0.0; width]);
            cells[col] += value;
        }
    }

    let mut rows: Vec<MergedRow> = acc
        .into_iter()
        .map(|(lineage, values)| MergedRow { lineage, values })
        .collect();
    rows.sort_unstable_by(|a, b| a.lineage.cmp(&b.lineage));

    log::info!("merged {} lineages across {} samples", rows.len(), width);
    Ok(MergedMatrix { samples, rows })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ranks::RankScheme;

    pub(crate) fn table(id: &str, text: &str) -> SampleTable {
        SampleTable::from_reader(text.as_bytes(), id, &RankScheme::default()).unwrap()
    }

    pub(crate) fn worked_example() -> Vec<SampleTable> {
        vec![
            table(
                "A",
                "k__Bacteria\t10\n\
                 k__Bacteria|p__Firmicutes\t6\n\
                 k__Bacteria|p__Bacteroidetes\t4\n",
            ),
            table(
                "B",
                "k__Bacteria\t8\n\
                 k__Bacteria|p__Firmicutes\t8\n",
            ),
        ]
    }

    #[test]
    fn test_worked_example_outer_join() {
        let m = merge(&worked_example(), None).unwrap();
        assert_eq!(m.samples(), &["A".to_string(), "B".to_string()]);
        assert_eq!(m.len(), 3);

        let paths: Vec<&str> = m.rows().iter().map(|r| r.lineage.path()).collect();
        assert_eq!(
            paths,
            vec![
                "k__Bacteria",
                "k__Bacteria|p__Bacteroidetes",
                "k__Bacteria|p__Firmicutes"
            ]
        );
        assert_eq!(m.get("k__Bacteria|p__Bacteroidetes", "B"), Some(0.0));
        assert_eq!(m.get("k__Bacteria|p__Firmicutes", "B"), Some(8.0));
        assert_eq!(m.get("k__Archaea", "A"), None);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut tables = worked_example();
        let forward = merge(&tables, None).unwrap();
        tables.reverse();
        let backward = merge(&tables, None).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_cells_are_finite_and_non_negative() {
        let tables = vec![
            table("S2", "k__Bacteria\tfoo\nk__Archaea\t-1\n"),
            table("S1", "k__Bacteria|p__X\t3\n"),
        ];
        let m = merge(&tables, None).unwrap();
        for row in m.rows() {
            assert!(row.values.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
    }

    #[test]
    fn test_explicit_sample_order() {
        let order = vec!["B".to_string(), "C".to_string(), "A".to_string()];
        let m = merge(&worked_example(), Some(&order)).unwrap();
        assert_eq!(m.samples(), order.as_slice());
        assert_eq!(m.column_total(m.sample_index("C").unwrap()), Some(0.0));
        assert_eq!(m.column_total(m.sample_index("A").unwrap()), Some(20.0));
        assert_eq!(m.column_total(3), None);
        assert_eq!(m.get("k__Bacteria", "B"), Some(8.0));
    }

    #[test]
    fn test_unlisted_samples_are_left_out() {
        let order = vec!["B".to_string()];
        let m = merge(&worked_example(), Some(&order)).unwrap();
        assert_eq!(m.samples().len(), 1);
        assert!(m.row("k__Bacteria|p__Bacteroidetes").is_none());

        let order = vec!["Z".to_string()];
        assert!(matches!(
            merge(&worked_example(), Some(&order)),
            Err(Error::NoInputData(_))
        ));
    }

    #[test]
    fn test_shared_sample_id_is_summed() {
        let tables = vec![table("A", "k__Bacteria\t1\n"), table("A", "k__Bacteria\t2\n")];
        let m = merge(&tables, None).unwrap();
        assert_eq!(m.samples().len(), 1);
        assert_eq!(m.get("k__Bacteria", "A"), Some(3.0));
    }

    #[test]
    fn test_no_tables() {
        assert!(matches!(merge(&[], None), Err(Error::NoInputData(_))));
    }

    #[test]
    fn test_load_tables_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("S1.tsv");
        std::fs::write(&good, "k__Bacteria\t5\n").unwrap();
        let bad = dir.path().join("S2.tsv");
        std::fs::write(&bad, "just_one_column\n").unwrap();
        let missing = dir.path().join("S3.tsv");

        let results = load_tables(&[good, bad, missing], &IngestOptions::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().sample_id(), "S1");
        assert!(matches!(results[1], Err(Error::UnreadableFile { .. })));
        assert!(matches!(results[2], Err(Error::UnreadableFile { .. })));
    }
}
