// src/ranks.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// One level of the taxonomy hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankDef {
    /// Prefix code used in clade paths, e.g. `p` in `p__Firmicutes`.
    pub code: String,
    /// Long name, used in per-rank file names (`merged_phylum.tsv`).
    pub name: String,
    /// Whether the rank appears in the long-format summary.
    pub summarize: bool,
}

/// Ordered list of ranks, most general first.
///
/// Lineage parsing, exact-rank extraction and collapsing all work on rank
/// *depths* (indices into this list), so a different taxonomy convention only
/// needs a different scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankScheme {
    ranks: Vec<RankDef>,
}

impl Default for RankScheme {
    /// The MetaPhlAn convention: `k p c o f g s t`, strain excluded from
    /// summaries.
    fn default() -> Self {
        let ranks = [
            ("k", "kingdom", true),
            ("p", "phylum", true),
            ("c", "class", true),
            ("o", "order", true),
            ("f", "family", true),
            ("g", "genus", true),
            ("s", "species", true),
            ("t", "strain", false),
        ]
        .iter()
        .map(|&(code, name, summarize)| RankDef {
            code: code.to_string(),
            name: name.to_string(),
            summarize,
        })
        .collect();
        RankScheme { ranks }
    }
}

impl RankScheme {
    pub fn new(ranks: Vec<RankDef>) -> Result<Self> {
        if ranks.is_empty() {
            return Err(Error::UnknownRank("empty rank scheme".to_string()));
        }
        for (i, r) in ranks.iter().enumerate() {
            if r.code.is_empty() || r.code.contains('|') {
                return Err(Error::UnknownRank(format!("invalid rank code '{}'", r.code)));
            }
            if ranks[..i].iter().any(|o| o.code == r.code) {
                return Err(Error::UnknownRank(format!("duplicate rank code '{}'", r.code)));
            }
        }
        Ok(RankScheme { ranks })
    }

    /// Parses a scheme file in the format:
    /// ```text
    /// <code>\t<name>[\t<summarize: yes|no>]
    /// ```
    /// `#` lines and blank lines are ignored; rows are taken in file order.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut ranks = Vec::new();
        for line_result in reader.lines() {
            let line = line_result?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
            if parts.len() < 2 {
                return Err(Error::UnknownRank(format!(
                    "rank scheme line needs code and name: '{line}'"
                )));
            }
            let summarize = !matches!(
                parts.get(2).map(|s| s.to_ascii_lowercase()).as_deref(),
                Some("no") | Some("false") | Some("0")
            );
            ranks.push(RankDef {
                code: parts[0].to_string(),
                name: parts[1].to_string(),
                summarize,
            });
        }
        RankScheme::new(ranks)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn ranks(&self) -> &[RankDef] {
        &self.ranks
    }

    pub fn get(&self, depth: usize) -> Option<&RankDef> {
        self.ranks.get(depth)
    }

    /// Depth of the rank with this prefix code.
    pub fn depth_of_code(&self, code: &str) -> Option<usize> {
        self.ranks.iter().position(|r| r.code == code)
    }

    /// Looks a rank up by code (`g`) or name (`genus`, case-insensitive).
    pub fn resolve(&self, rank: &str) -> Result<usize> {
        let rank = rank.trim();
        self.depth_of_code(rank)
            .or_else(|| {
                self.ranks
                    .iter()
                    .position(|r| r.name.eq_ignore_ascii_case(rank))
            })
            .ok_or_else(|| Error::UnknownRank(rank.to_string()))
    }

    /// Depths that go into the long-format summary, in scheme order.
    pub fn summary_depths(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranks
            .iter()
            .enumerate()
            .filter(|(_, r)| r.summarize)
            .map(|(i, _)| i)
    }
}
