// src/lineage.rs

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::ranks::RankScheme;

/// Label given to a rank whose text is empty in the source (`p__`).
pub const UNCLASSIFIED_LABEL: &str = "Unclassified";

/// Whole-row clade name MetaPhlAn 4 uses for reads it could not place.
pub const UNCLASSIFIED_ROW: &str = "UNCLASSIFIED";

/// Separator between ranks in a clade path.
pub const PATH_SEPARATOR: char = '|';

/// A classified rank inside a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankLabel {
    /// Index into the rank scheme (kingdom = 0).
    pub depth: usize,
    pub code: String,
    /// Label text with the `code__` prefix removed.
    pub name: String,
    /// False for bare legacy segments, which are written back as-is.
    pub prefixed: bool,
}

/// A contiguous run of rank labels from the root.
///
/// Ranks past `labels.len()` are undefined, so the contiguity invariant holds
/// by construction. Equality, hashing and ordering all follow the clade path,
/// which is also what gets written to the merged table. Prefixed segments are
/// normalised (`p__` becomes `p__Unclassified`), bare segments are kept as
/// written. An `UNCLASSIFIED` row has no labels at all.
#[derive(Debug, Clone)]
pub struct Lineage {
    labels: Vec<RankLabel>,
    path: String,
}

impl Lineage {
    fn from_labels(labels: Vec<RankLabel>) -> Self {
        let path = render_path(&labels);
        Lineage { labels, path }
    }

    pub fn labels(&self) -> &[RankLabel] {
        &self.labels
    }

    /// Canonical clade path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for the profiler's unclassified row, which has no ranks.
    pub fn is_unclassified(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of defined ranks.
    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    /// Deepest classified rank.
    pub fn leaf(&self) -> Option<&RankLabel> {
        self.labels.last()
    }

    pub fn label_at(&self, depth: usize) -> Option<&RankLabel> {
        self.labels.get(depth)
    }

    /// True when this row is classified exactly to `depth`: a label exists
    /// there and nothing deeper is defined.
    pub fn is_exact_at(&self, depth: usize) -> bool {
        self.labels.len() == depth + 1
    }

    /// Clade path truncated after `depth`, or `None` if that rank is undefined.
    pub fn path_to(&self, depth: usize) -> Option<String> {
        if depth >= self.labels.len() {
            return None;
        }
        Some(render_path(&self.labels[..=depth]))
    }
}

impl PartialEq for Lineage {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Lineage {}

impl Hash for Lineage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for Lineage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Lineage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn render_path(labels: &[RankLabel]) -> String {
    let mut path = String::new();
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            path.push(PATH_SEPARATOR);
        }
        if label.prefixed {
            path.push_str(&label.code);
            path.push_str("__");
        }
        path.push_str(&label.name);
    }
    path
}

/// Parses one clade path into a [`Lineage`].
///
/// Segments are either `<code>__<label>` or a bare label from older exports.
/// A bare label takes the next rank position. Prefixed segments must carry
/// exactly the code of the next rank; skipping a rank, repeating one or going
/// back up the hierarchy breaks contiguity and is rejected, as is an empty
/// segment followed by a classified one.
pub fn parse_lineage(raw: &str, scheme: &RankScheme) -> Result<Lineage> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::malformed(raw, "empty clade path"));
    }
    if trimmed.eq_ignore_ascii_case(UNCLASSIFIED_ROW) {
        return Ok(Lineage {
            labels: Vec::new(),
            path: trimmed.to_string(),
        });
    }

    let mut labels: Vec<RankLabel> = Vec::new();
    let mut undefined_from: Option<usize> = None;

    for segment in trimmed.split(PATH_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            undefined_from.get_or_insert(labels.len());
            continue;
        }
        if let Some(gap) = undefined_from {
            return Err(Error::malformed(
                raw,
                format!("classified segment '{segment}' follows undefined rank at depth {gap}"),
            ));
        }

        let depth = labels.len();
        let Some(expected) = scheme.get(depth) else {
            return Err(Error::malformed(
                raw,
                format!("more than {} ranks", scheme.len()),
            ));
        };

        let (text, prefixed) = match split_prefix(segment, scheme) {
            Prefix::Known(code, text) => {
                match scheme.depth_of_code(code) {
                    Some(d) if d == depth => {}
                    Some(d) if d > depth => {
                        return Err(Error::malformed(
                            raw,
                            format!("rank '{code}' follows undefined rank '{}'", expected.code),
                        ));
                    }
                    _ => {
                        return Err(Error::malformed(
                            raw,
                            format!("rank '{code}' out of order, expected '{}'", expected.code),
                        ));
                    }
                }
                (text, true)
            }
            Prefix::Unknown(code) => {
                return Err(Error::malformed(raw, format!("unknown rank code '{code}'")));
            }
            Prefix::Bare => (segment, false),
        };

        let text = text.trim();
        labels.push(RankLabel {
            depth,
            code: expected.code.clone(),
            name: if text.is_empty() {
                UNCLASSIFIED_LABEL.to_string()
            } else {
                text.to_string()
            },
            prefixed,
        });
    }

    if labels.is_empty() {
        return Err(Error::malformed(raw, "no classified ranks"));
    }
    Ok(Lineage::from_labels(labels))
}

enum Prefix<'a> {
    Known(&'a str, &'a str),
    Unknown(&'a str),
    Bare,
}

/// A `__` split only counts as a rank prefix when the left side is a scheme
/// code, or looks like one (a single letter). Anything else is a bare label
/// that happens to contain a double underscore.
fn split_prefix<'a>(segment: &'a str, scheme: &RankScheme) -> Prefix<'a> {
    match segment.split_once("__") {
        Some((code, text)) if scheme.depth_of_code(code).is_some() => Prefix::Known(code, text),
        Some((code, _)) if code.len() == 1 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            Prefix::Unknown(code)
        }
        _ => Prefix::Bare,
    }
}
