//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Find near-duplicates under two directories, 8 hashing threads
//! imgmatch -p 8 ~/Pictures ~/Downloads
//!
//! # Show only the 20 most similar pairs, skipping pairs shown before
//! imgmatch -n 20 -d ~/Pictures
//!
//! # Review each match in feh
//! imgmatch --viewer ~/Pictures
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::report::DEFAULT_VIEWER_ARGS;

/// Finds near-duplicate images by perceptual fingerprint.
///
/// Computes a 64-bit DCT perceptual hash per file (cached across runs in
/// --hash-db) and prints file pairs ranked from most to least similar.
#[derive(Debug, Parser)]
#[command(name = "imgmatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Paths to match images in (files or directories)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Path to the fingerprint cache file
    #[arg(long, value_name = "PATH", default_value = "imgmatch.db")]
    pub hash_db: PathBuf,

    /// Record already-displayed pairs in a ledger file and don't show them
    /// again. Without a value, "reported.db" in the current directory is used.
    #[arg(
        short = 'd',
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "reported.db"
    )]
    pub reported_db: Option<PathBuf>,

    /// How many fingerprint computations may run in parallel
    /// (default: number of logical CPUs)
    #[arg(short = 'p', long, value_name = "THREADS")]
    pub parallel: Option<usize>,

    /// Limit output to the N most similar pairs (0 skips ranking entirely)
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub top_n: Option<usize>,

    /// Run feh for each match, with removal actions defined (see --viewer-args)
    #[arg(long)]
    pub viewer: bool,

    /// Viewer command-line template, space-separated unless quoted with ".
    ///
    /// Available placeholders: {path1} {path2} {pid} {diff} {n} {diff_n}
    /// {diff_count}. The matched pair is always appended as the final two
    /// arguments.
    #[arg(long, value_name = "CMDLINE", default_value = DEFAULT_VIEWER_ARGS)]
    pub viewer_args: String,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress everything except errors and match output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
