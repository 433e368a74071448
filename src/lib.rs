//! imgmatch - perceptual near-duplicate image finder.
//!
//! Computes a compact DCT-based fingerprint per file, caches fingerprints
//! across runs, and reports file pairs whose fingerprints differ by a small
//! Hamming distance, ranked from most to least similar.
//!
//! The interesting machinery lives in three modules:
//! - [`cache`]: the incremental fingerprint cache, persisted atomically and
//!   reconciled against the candidate path set each run
//! - [`pool`]: bounded-concurrency fingerprint computation with
//!   readiness-based collection and guaranteed worker cleanup
//! - [`ranker`]: the lazy ascending-distance stream over all pairs

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

pub mod cache;
pub mod cli;
pub mod error;
pub mod logging;
pub mod phash;
pub mod pool;
pub mod ranker;
pub mod report;
pub mod signal;
pub mod walker;

use cache::FingerprintCache;
use cli::Cli;
use error::ExitCode;
use phash::{DctHasher, FingerprintProvider};
use pool::PoolConfig;
use report::{ReportOptions, ReportedLedger, ViewerCommand};

/// Run the full pipeline: walk roots, reconcile the fingerprint cache,
/// rank, and report.
///
/// Returns the process exit code on orderly completion (including user
/// interruption, which is a clean shutdown path); structural failures are
/// returned as errors and mapped to a non-zero exit in `main`.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let shutdown = signal::install_handler();

    // Parse the viewer template up front so a quoting mistake fails the run
    // before hours of hashing, not after.
    let viewer = if cli.viewer {
        Some(ViewerCommand::parse("feh", &cli.viewer_args)?)
    } else {
        None
    };

    let mut cache = FingerprintCache::load(&cli.hash_db)?;
    log::info!(
        "loaded fingerprints for {} paths from {}",
        cache.len(),
        cli.hash_db.display()
    );

    let candidates = walker::collect_candidates(&cli.paths)?;

    let mut pool_config = PoolConfig::default().with_shutdown_flag(shutdown.get_flag());
    if let Some(parallel) = cli.parallel {
        pool_config = pool_config.with_concurrency(parallel);
    }

    let provider: Arc<dyn FingerprintProvider> = Arc::new(DctHasher::new());
    let reconcile_result = cache.reconcile(&candidates, |missing, sink| {
        log::info!("computing fingerprints for {} new paths", missing.len());
        let bar = ProgressBar::new(missing.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{eta}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        bar.set_message("fingerprinting");

        let mut progress_sink = |path, fingerprint| {
            bar.inc(1);
            sink(path, fingerprint);
        };
        let result = pool::run(missing, provider, &pool_config, &mut progress_sink);
        bar.finish_and_clear();
        result
    });

    // Save on every exit path of reconciliation: completed fingerprints
    // survive pool failures and interrupts.
    let save_result = cache
        .save(&cli.hash_db)
        .with_context(|| format!("saving fingerprint cache to {}", cli.hash_db.display()));
    match (reconcile_result, save_result) {
        (Err(reconcile_err), Err(save_err)) => {
            log::error!("{:#}", save_err);
            return Err(reconcile_err.into());
        }
        (Err(reconcile_err), Ok(())) => return Err(reconcile_err.into()),
        (Ok(()), Err(save_err)) => return Err(save_err),
        (Ok(()), Ok(())) => {}
    }

    if shutdown.is_shutdown_requested() {
        log::info!("interrupted; fingerprint cache saved");
        return Ok(ExitCode::Success);
    }

    if cli.top_n == Some(0) {
        return Ok(ExitCode::Success);
    }

    let mut ledger = match cli.reported_db.clone() {
        Some(path) => {
            let mut ledger = ReportedLedger::load(path)?;
            ledger.prune_missing();
            Some(ledger)
        }
        None => None,
    };

    let options = ReportOptions {
        top_n: cli.top_n,
        viewer,
        shutdown_flag: Some(shutdown.get_flag()),
    };
    report::report_matches(&cache, ledger.as_mut(), &options)?;

    if let Some(ledger) = &ledger {
        ledger.save()?;
    }

    Ok(ExitCode::Success)
}
