// src/profile.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use flate2::read::MultiGzDecoder;

use crate::error::{Error, Result};
use crate::lineage::{parse_lineage, Lineage};
use crate::ranks::RankScheme;

/// File-name suffix MetaPhlAn wrappers append to the sample name.
pub const DEFAULT_SAMPLE_SUFFIX: &str = "_metaphlan_profile.tsv";

/// Column layout of a profile, decided once from its first data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileShape {
    /// A `clade_name ... relative_abundance` header line was present.
    Headered { clade_col: usize, abundance_col: usize },
    /// No header; holds the column count of the first data line. The clade
    /// is column 0, the abundance column 2 when there are 3 or more columns
    /// (`clade_name, tax_id, relative_abundance, extra`), else column 1.
    LegacyPositional(usize),
}

impl FileShape {
    /// Decides the shape from the first non-comment line. Returns `None` when
    /// the line has fewer than two columns.
    pub fn detect(first_line: &str) -> Option<FileShape> {
        let fields: Vec<&str> = first_line.split('\t').map(str::trim).collect();
        if fields.len() < 2 {
            return None;
        }
        if fields[0].eq_ignore_ascii_case("clade_name") {
            let abundance_col = fields
                .iter()
                .position(|f| f.eq_ignore_ascii_case("relative_abundance"))
                .unwrap_or(fields.len() - 1);
            return Some(FileShape::Headered {
                clade_col: 0,
                abundance_col,
            });
        }
        Some(FileShape::LegacyPositional(fields.len()))
    }

    pub fn clade_col(&self) -> usize {
        match *self {
            FileShape::Headered { clade_col, .. } => clade_col,
            FileShape::LegacyPositional(_) => 0,
        }
    }

    pub fn abundance_col(&self) -> usize {
        match *self {
            FileShape::Headered { abundance_col, .. } => abundance_col,
            FileShape::LegacyPositional(n) if n >= 3 => 2,
            FileShape::LegacyPositional(_) => 1,
        }
    }

    fn has_header(&self) -> bool {
        matches!(self, FileShape::Headered { .. })
    }
}

/// Counters collected while reading one profile.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_read: usize,
    /// Rows dropped because their lineage was malformed.
    pub rows_skipped: usize,
    /// Abundances that were missing, non-numeric, non-finite or negative.
    pub values_coerced: usize,
    /// Rows whose lineage had already been seen in this file.
    pub duplicates_summed: usize,
}

/// Ingestion settings shared by every input file of a run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub scheme: RankScheme,
    /// Tried in order when deriving a sample id from a file name.
    pub sample_suffixes: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            scheme: RankScheme::default(),
            sample_suffixes: vec![DEFAULT_SAMPLE_SUFFIX.to_string()],
        }
    }
}

/// One sample's profile: lineage → abundance. Never mutated after parsing.
#[derive(Debug, Clone)]
pub struct SampleTable {
    sample_id: String,
    source: PathBuf,
    shape: FileShape,
    abundances: AHashMap<Lineage, f64>,
    stats: IngestStats,
}

impl SampleTable {
    /// Reads a profile from disk, transparently decompressing `.gz` files.
    ///
    /// The sample id is `sample_id` when given, otherwise derived from the
    /// file name with [`derive_sample_id`]. Any failure to open or read the
    /// file is reported as `Error::UnreadableFile`.
    pub fn from_path(path: &Path, sample_id: Option<&str>, opts: &IngestOptions) -> Result<Self> {
        let f = File::open(path).map_err(|e| Error::unreadable(path, e))?;

        let is_gz = path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(MultiGzDecoder::new(f)))
        } else {
            Box::new(BufReader::new(f))
        };

        let sample_id = match sample_id {
            Some(id) => id.to_string(),
            None => derive_sample_id(path, &opts.sample_suffixes),
        };
        read_profile(reader, path, sample_id, &opts.scheme)
    }

    /// Reads a profile from any buffered source, e.g. an in-memory string.
    pub fn from_reader<R: BufRead>(reader: R, sample_id: &str, scheme: &RankScheme) -> Result<Self> {
        read_profile(reader, Path::new(sample_id), sample_id.to_string(), scheme)
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn shape(&self) -> FileShape {
        self.shape
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.abundances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abundances.is_empty()
    }

    pub fn get(&self, lineage: &Lineage) -> Option<f64> {
        self.abundances.get(lineage).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Lineage, f64)> {
        self.abundances.iter().map(|(l, &v)| (l, v))
    }

    /// Sum of all values in the profile.
    pub fn total(&self) -> f64 {
        self.abundances.values().sum()
    }
}

fn read_profile<R: BufRead>(
    reader: R,
    source: &Path,
    sample_id: String,
    scheme: &RankScheme,
) -> Result<SampleTable> {
    let mut shape: Option<FileShape> = None;
    let mut abundances: AHashMap<Lineage, f64> = AHashMap::new();
    let mut stats = IngestStats::default();

    for (i, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| Error::unreadable(source, e))?;
        let line = line.trim_end_matches(['\r', '\n']);
        let line = if i == 0 {
            line.strip_prefix('\u{feff}').unwrap_or(line)
        } else {
            line
        };
        let head = line.trim_start();
        if head.is_empty() || head.starts_with('#') {
            continue;
        }
        let line_num = i + 1;

        let shape = match shape {
            Some(s) => s,
            None => {
                let detected = FileShape::detect(line)
                    .ok_or_else(|| Error::unreadable(source, "fewer than 2 columns"))?;
                log::debug!("{}: detected {:?}", source.display(), detected);
                shape = Some(detected);
                if detected.has_header() {
                    continue;
                }
                detected
            }
        };

        stats.rows_read += 1;
        let fields: Vec<&str> = line.split('\t').collect();

        let clade = fields.get(shape.clade_col()).copied().unwrap_or("");
        let lineage = match parse_lineage(clade, scheme) {
            Ok(l) => l,
            Err(e) => {
                log::warn!("{}: line {line_num}: {e}; row skipped", source.display());
                stats.rows_skipped += 1;
                continue;
            }
        };

        let raw_value = fields.get(shape.abundance_col()).copied().unwrap_or("");
        let value = match parse_abundance(raw_value) {
            Ok(v) if v < 0.0 => {
                log::warn!(
                    "{}: line {line_num}: negative abundance {v} for {lineage}; using 0",
                    source.display()
                );
                stats.values_coerced += 1;
                0.0
            }
            Ok(v) => v,
            Err(e) => {
                log::warn!("{}: line {line_num}: {e} for {lineage}; using 0", source.display());
                stats.values_coerced += 1;
                0.0
            }
        };

        // Same lineage twice in one file: keep both contributions.
        if let Some(existing) = abundances.get_mut(&lineage) {
            log::warn!(
                "{}: line {line_num}: duplicate lineage {lineage}; values summed",
                source.display()
            );
            stats.duplicates_summed += 1;
            *existing += value;
        } else {
            abundances.insert(lineage, value);
        }
    }

    let Some(shape) = shape else {
        return Err(Error::unreadable(source, "no data rows"));
    };

    log::info!(
        "{}: sample '{}', {} lineages ({} rows skipped, {} values coerced)",
        source.display(),
        sample_id,
        abundances.len(),
        stats.rows_skipped,
        stats.values_coerced
    );

    Ok(SampleTable {
        sample_id,
        source: source.to_path_buf(),
        shape,
        abundances,
        stats,
    })
}

/// Parses an abundance cell. Anything that is not a finite number is a
/// `NonNumericAbundance`; callers coerce it to 0.0.
pub fn parse_abundance(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::NonNumericAbundance {
            value: trimmed.to_string(),
        }),
    }
}

/// Derives a sample id from a file name: a trailing `.gz` is dropped, then
/// the first matching suffix, otherwise the last extension.
///
/// `S01_metaphlan_profile.tsv.gz` → `S01`, `GUAN_049.tabular` → `GUAN_049`.
pub fn derive_sample_id(path: &Path, suffixes: &[String]) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = file_name.strip_suffix(".gz").unwrap_or(&file_name);

    for suffix in suffixes {
        if let Some(stem) = name.strip_suffix(suffix.as_str()) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }

    match name.rfind('.') {
        Some(i) if i > 0 => name[..i].to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(text: &str) -> SampleTable {
        SampleTable::from_reader(text.as_bytes(), "S1", &RankScheme::default()).unwrap()
    }

    fn lineage(s: &str) -> Lineage {
        parse_lineage(s, &RankScheme::default()).unwrap()
    }

    #[test]
    fn test_headered_profile() {
        let t = table(
            "clade_name\trelative_abundance\n\
             k__Bacteria\t100\n\
             k__Bacteria|p__Firmicutes\t60.5\n",
        );
        assert_eq!(
            t.shape(),
            FileShape::Headered {
                clade_col: 0,
                abundance_col: 1
            }
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&lineage("k__Bacteria|p__Firmicutes")), Some(60.5));
        assert_eq!(t.stats().rows_read, 2);
    }

    #[test]
    fn test_metaphlan_four_column_profile() {
        let t = table(
            "#mpa_vJan21_CHOCOPhlAnSGB_202103\n\
             #clade_name\tNCBI_tax_id\trelative_abundance\tadditional_species\n\
             k__Bacteria\t2\t99.5\t\n\
             k__Bacteria|p__Firmicutes\t2|1239\t40.25\tk__Bacteria|p__X\n",
        );
        assert_eq!(t.shape(), FileShape::LegacyPositional(4));
        assert_eq!(t.get(&lineage("k__Bacteria")), Some(99.5));
        assert_eq!(t.get(&lineage("k__Bacteria|p__Firmicutes")), Some(40.25));
    }

    #[test]
    fn test_legacy_two_and_three_columns() {
        let t = table("k__Bacteria\t12\n");
        assert_eq!(t.shape(), FileShape::LegacyPositional(2));
        assert_eq!(t.get(&lineage("k__Bacteria")), Some(12.0));

        let t = table("k__Bacteria\t2\t7.5\n");
        assert_eq!(t.shape().abundance_col(), 2);
        assert_eq!(t.get(&lineage("k__Bacteria")), Some(7.5));
    }

    #[test]
    fn test_header_without_abundance_column_uses_last() {
        let shape = FileShape::detect("clade_name\ttax_id\tS1").unwrap();
        assert_eq!(shape.abundance_col(), 2);
    }

    #[test]
    fn test_non_numeric_and_negative_coerced() {
        let t = table(
            "k__Bacteria\tabc\n\
             k__Archaea\tNaN\n\
             k__Eukaryota\t-3\n\
             k__Viruses\n",
        );
        assert_eq!(t.len(), 4);
        assert!(t.iter().all(|(_, v)| v == 0.0));
        assert_eq!(t.stats().values_coerced, 4);
    }

    #[test]
    fn test_malformed_row_skipped_not_fatal() {
        let t = table(
            "k__Bacteria\t10\n\
             k__Bacteria|c__Bacilli\t5\n\
             k__Bacteria|p__Firmicutes\t6\n",
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.stats().rows_skipped, 1);
    }

    #[test]
    fn test_duplicate_lineages_are_summed() {
        let t = table(
            "k__Bacteria\t10\n\
             k__Bacteria|p__Firmicutes\t6\n\
             k__Bacteria|p__Firmicutes\t1.5\n",
        );
        assert_eq!(t.get(&lineage("k__Bacteria|p__Firmicutes")), Some(7.5));
        assert_eq!(t.stats().duplicates_summed, 1);
    }

    #[test]
    fn test_single_column_is_unreadable() {
        let err = SampleTable::from_reader("k__Bacteria\n".as_bytes(), "S1", &RankScheme::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnreadableFile { .. }));

        let err = SampleTable::from_reader("# only comments\n\n".as_bytes(), "S1", &RankScheme::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnreadableFile { .. }));
    }

    #[test]
    fn test_byte_order_mark_and_indented_comments() {
        let t = table(
            "\u{feff}clade_name\trelative_abundance\n\
             \x20 # indented comment\n\
             \t#tab-indented comment\n\
             k__Bacteria\t100\n",
        );
        assert_eq!(
            t.shape(),
            FileShape::Headered {
                clade_col: 0,
                abundance_col: 1
            }
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.stats().rows_read, 1);
        assert_eq!(t.stats().rows_skipped, 0);

        let t = table("\u{feff}#mpa_v31\nk__Bacteria\t2\t7.5\n");
        assert_eq!(t.shape(), FileShape::LegacyPositional(3));
        assert_eq!(t.get(&lineage("k__Bacteria")), Some(7.5));
    }

    #[test]
    fn test_unclassified_row_is_kept() {
        let t = table(
            "#clade_name\tclade_taxid\trelative_abundance\tcoverage\n\
             UNCLASSIFIED\t-1\t12.5\t\n\
             k__Bacteria\t2\t87.5\t\n",
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.stats().rows_skipped, 0);
        assert_eq!(t.get(&lineage("UNCLASSIFIED")), Some(12.5));
        assert_eq!(t.total(), 100.0);
    }

    #[test]
    fn test_derive_sample_id() {
        let suffixes = vec![DEFAULT_SAMPLE_SUFFIX.to_string()];
        let id = |p: &str| derive_sample_id(Path::new(p), &suffixes);
        assert_eq!(id("out/S01_metaphlan_profile.tsv"), "S01");
        assert_eq!(id("S01_metaphlan_profile.tsv.gz"), "S01");
        assert_eq!(id("dir/GUAN_049.tabular"), "GUAN_049");
        assert_eq!(id("sample.a.txt"), "sample.a");
        assert_eq!(id("noext"), "noext");
        assert_eq!(id(".hidden"), ".hidden");
    }

    #[test]
    fn test_from_path_gz() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S9_metaphlan_profile.tsv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"clade_name\trelative_abundance\nk__Bacteria\t42\n").unwrap();
        enc.finish().unwrap();

        let t = SampleTable::from_path(&path, None, &IngestOptions::default()).unwrap();
        assert_eq!(t.sample_id(), "S9");
        assert_eq!(t.total(), 42.0);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SampleTable::from_path(
            Path::new("/definitely/not/here.tsv"),
            Some("x"),
            &IngestOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnreadableFile { .. }));
    }
}
