use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use taxmerge_rs::error::Result;
use taxmerge_rs::output::{write_clade_tables, write_file, write_rank_tables};
use taxmerge_rs::profile::{IngestOptions, DEFAULT_SAMPLE_SUFFIX};
use taxmerge_rs::ranks::RankScheme;
use taxmerge_rs::{merge_profiles, MergeOptions};

#[derive(Parser)]
#[command(name = "taxmerge-rs")]
#[command(version)]
#[command(about = "Merge per-sample taxonomic profiles and summarise them by rank")]
#[command(
    long_about = "Merges MetaPhlAn-style profiles (clade path + relative abundance) into one wide table.\n\nAlongside the merged table it writes:\n- one merged_<rank>.tsv per rank with only the rows classified exactly to that rank\n- a long-format summary collapsing every row by its label at each rank"
)]
struct Cli {
    /// Profile tables, tab-separated, optionally gzipped
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path of the merged table
    #[arg(short = 'o', long)]
    merged: PathBuf,

    /// Output path of the long-format summary
    #[arg(short = 's', long)]
    summary: PathBuf,

    /// Explicit sample column order (comma-separated); lexicographic otherwise
    #[arg(long, value_delimiter = ',')]
    samples: Option<Vec<String>>,

    /// Ranks to write exact-level tables for, by code or name (default: all)
    #[arg(long, value_delimiter = ',')]
    ranks: Option<Vec<String>>,

    /// Directory for merged_<rank>.tsv files (default: next to the merged table)
    #[arg(long)]
    rank_dir: Option<PathBuf>,

    /// Also write one sample_id/relative_abundance file per clade into this directory
    #[arg(long)]
    per_clade_dir: Option<PathBuf>,

    /// File-name suffix stripped to derive sample ids; may be repeated
    #[arg(long = "sample-suffix")]
    sample_suffixes: Vec<String>,

    /// Tab-separated rank scheme (code, name, [summarize]) replacing k/p/c/o/f/g/s/t
    #[arg(long)]
    rank_scheme: Option<PathBuf>,

    /// Worker threads for parsing input files (0 = one per core)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors, no progress spinners
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn spinner(color: &str, quiet: bool, msg: &'static str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_spinner()
        .tick_strings(&[
            "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
        ])
        .template(&format!("{{spinner:.{color}}} {{msg}}"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(style);
    spinner.set_message(msg);
    spinner
}

fn build_options(cli: &Cli) -> Result<MergeOptions> {
    let scheme = match &cli.rank_scheme {
        Some(path) => RankScheme::from_path(path)?,
        None => RankScheme::default(),
    };
    let sample_suffixes = if cli.sample_suffixes.is_empty() {
        vec![DEFAULT_SAMPLE_SUFFIX.to_string()]
    } else {
        cli.sample_suffixes.clone()
    };
    Ok(MergeOptions {
        ingest: IngestOptions {
            scheme,
            sample_suffixes,
        },
        sample_order: cli.samples.clone(),
        ranks: cli.ranks.clone(),
    })
}

fn run(cli: &Cli) -> Result<()> {
    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
        {
            log::warn!("could not size thread pool: {e}");
        }
    }

    let options = build_options(cli)?;

    // 1. Parse and merge
    let progress = spinner("green", cli.quiet, "Merging profiles...");
    let results = merge_profiles(&cli.inputs, &options);
    let results = match results {
        Ok(r) => r,
        Err(e) => {
            progress.abandon_with_message("Merge failed.");
            return Err(e);
        }
    };
    progress.finish_with_message(format!(
        "Merged {} lineages across {} sample(s), {} file(s) skipped.",
        results.matrix.len(),
        results.matrix.samples().len(),
        results.skipped.len()
    ));

    // 2. Write outputs
    let progress = spinner("yellow", cli.quiet, "Writing output files...");
    write_file(&cli.merged, &results.get_merged_table())?;
    write_file(&cli.summary, &results.get_summary())?;

    let rank_dir: &Path = match &cli.rank_dir {
        Some(dir) => dir.as_path(),
        None => cli
            .merged
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
    };
    let written = write_rank_tables(rank_dir, &results.rank_tables)?;

    if let Some(dir) = &cli.per_clade_dir {
        write_clade_tables(dir, &results.matrix)?;
    }
    progress.finish_with_message(format!(
        "Output files created ({} rank table(s)).",
        written.len()
    ));
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
