//! Reporting driver: prints ranked matches, filters already-reported pairs,
//! and optionally runs an external viewer per match.
//!
//! This sits outside the core cache/pool/ranker machinery and owns the two
//! user-facing conveniences ported from the original workflow: a persistent
//! ledger of pairs that were already shown in earlier runs, and a `feh`
//! invocation per match with enough context substituted into its arguments
//! to label and act on the pair.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::FingerprintCache;
use crate::ranker::rank;

/// Persistent set of already-reported path pairs.
///
/// Keys are canonical: the lexically smaller path first, so the pair is
/// found no matter which order the ranker emits it in.
#[derive(Debug)]
pub struct ReportedLedger {
    path: PathBuf,
    entries: BTreeSet<(PathBuf, PathBuf)>,
}

impl ReportedLedger {
    /// Load the ledger from `path`; a missing file yields an empty ledger.
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("reported-pairs ledger {} is corrupt", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read ledger {}", path.display()))
            }
        };
        Ok(Self { path, entries })
    }

    /// Save the ledger back to its file.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write ledger {}", self.path.display()))
    }

    /// Drop entries whose paths no longer exist on disk.
    pub fn prune_missing(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|(a, b)| a.exists() && b.exists());
        let pruned = before - self.entries.len();
        if pruned > 0 {
            log::debug!("pruned {} ledger entries with missing paths", pruned);
        }
    }

    #[must_use]
    pub fn contains(&self, a: &Path, b: &Path) -> bool {
        self.entries.contains(&Self::key(a, b))
    }

    pub fn record(&mut self, a: &Path, b: &Path) {
        self.entries.insert(Self::key(a, b));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(a: &Path, b: &Path) -> (PathBuf, PathBuf) {
        if a <= b {
            (a.to_path_buf(), b.to_path_buf())
        } else {
            (b.to_path_buf(), a.to_path_buf())
        }
    }
}

/// Context substituted into viewer argument templates.
#[derive(Debug)]
struct MatchContext<'a> {
    path1: &'a Path,
    path2: &'a Path,
    distance: u32,
    /// 1-based index of this match across the whole run.
    n: usize,
    /// 1-based index within the equal-distance tier.
    diff_n: usize,
    /// Size of the equal-distance tier.
    diff_count: usize,
}

/// External viewer invocation with a placeholder-substituted argument
/// template. Placeholders: `{path1}` `{path2}` `{pid}` `{diff}` `{n}`
/// `{diff_n}` `{diff_count}`. The two matched paths are always appended as
/// the final arguments.
#[derive(Debug, Clone)]
pub struct ViewerCommand {
    program: String,
    args: Vec<String>,
}

/// Default viewer argument template: labels each image with its dimensions
/// and the pair's distance, binds action 8 to delete the shown file and
/// action 1 to interrupt the whole run.
pub const DEFAULT_VIEWER_ARGS: &str = "-GNFY --info \"echo '%f %wx%h \
(diff: {diff}, {diff_n} / {diff_count})'\" \
--action8 \"rm %f\" --action1 \"kill -INT {pid}\"";

impl ViewerCommand {
    /// Build a viewer command from a program name and a raw argument line.
    ///
    /// The line is split on whitespace, except that double-quoted spans are
    /// kept as single arguments (so `--info "echo ..."` survives).
    pub fn parse(program: &str, arg_line: &str) -> Result<Self> {
        Ok(Self {
            program: program.to_string(),
            args: split_quoted(arg_line)?,
        })
    }

    /// Run the viewer for one match, waiting for it to exit.
    fn invoke(&self, ctx: &MatchContext<'_>) -> Result<()> {
        let args: Vec<String> = self.args.iter().map(|arg| render(arg, ctx)).collect();
        log::debug!("viewer command: {} {:?}", self.program, args);
        let status = std::process::Command::new(&self.program)
            .args(&args)
            .arg(ctx.path1)
            .arg(ctx.path2)
            .status()
            .with_context(|| format!("failed to run viewer {}", self.program))?;
        if !status.success() {
            log::debug!("viewer exited with {}", status);
        }
        Ok(())
    }
}

/// Split an argument line on whitespace, keeping double-quoted spans intact.
fn split_quoted(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut rest = line;
    loop {
        match rest.find('"') {
            None => {
                args.extend(rest.split_whitespace().map(String::from));
                return Ok(args);
            }
            Some(open) => {
                args.extend(rest[..open].split_whitespace().map(String::from));
                let quoted = &rest[open + 1..];
                let close = quoted
                    .find('"')
                    .ok_or_else(|| anyhow::anyhow!("viewer args: unmatched quote"))?;
                args.push(quoted[..close].to_string());
                rest = &quoted[close + 1..];
            }
        }
    }
}

/// Substitute match-context placeholders into a template argument.
fn render(template: &str, ctx: &MatchContext<'_>) -> String {
    template
        .replace("{path1}", &ctx.path1.display().to_string())
        .replace("{path2}", &ctx.path2.display().to_string())
        .replace("{pid}", &std::process::id().to_string())
        .replace("{diff}", &ctx.distance.to_string())
        .replace("{n}", &ctx.n.to_string())
        .replace("{diff_n}", &ctx.diff_n.to_string())
        .replace("{diff_count}", &ctx.diff_count.to_string())
}

/// Options for the reporting loop.
#[derive(Debug, Default)]
pub struct ReportOptions {
    /// Show at most this many pairs. Suppressed (already-reported) pairs do
    /// not count toward the limit.
    pub top_n: Option<usize>,
    /// Viewer to run per shown match.
    pub viewer: Option<ViewerCommand>,
    /// Shutdown flag, polled between matches.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl ReportOptions {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Rank the cache and print matches, most similar first.
///
/// Each line is `left right distance`. Matches are processed in
/// equal-distance tiers so the viewer template can show "match 2 of 5 at
/// this distance". Pairs found in the ledger are skipped; newly shown pairs
/// are recorded only while both files still exist (the viewer may have
/// deleted one).
pub fn report_matches(
    cache: &FingerprintCache,
    mut ledger: Option<&mut ReportedLedger>,
    options: &ReportOptions,
) -> Result<()> {
    let mut ranked = rank(cache).peekable();
    let mut shown = 0usize;

    'tiers: while let Some(first) = ranked.next() {
        let mut tier = vec![first];
        while ranked.peek().is_some_and(|t| t.distance == tier[0].distance) {
            if let Some(triple) = ranked.next() {
                tier.push(triple);
            }
        }

        let diff_count = tier.len();
        for (tier_idx, triple) in tier.into_iter().enumerate() {
            if options.is_shutdown_requested() {
                log::debug!("shutdown requested, stopping match output");
                break 'tiers;
            }

            if let Some(ledger) = ledger.as_deref_mut() {
                if ledger.contains(&triple.left, &triple.right) {
                    log::debug!(
                        "skipping already-reported pair: {} {}",
                        triple.left.display(),
                        triple.right.display()
                    );
                    continue;
                }
            }

            println!(
                "{} {} {}",
                triple.left.display(),
                triple.right.display(),
                triple.distance
            );
            shown += 1;

            let both_exist = triple.left.exists() && triple.right.exists();

            if let Some(viewer) = &options.viewer {
                if both_exist {
                    let ctx = MatchContext {
                        path1: &triple.left,
                        path2: &triple.right,
                        distance: triple.distance,
                        n: shown,
                        diff_n: tier_idx + 1,
                        diff_count,
                    };
                    if let Err(e) = viewer.invoke(&ctx) {
                        log::warn!("{:#}", e);
                    }
                }
            }

            if let Some(ledger) = ledger.as_deref_mut() {
                if both_exist {
                    ledger.record(&triple.left, &triple.right);
                }
            }

            if options.top_n.is_some_and(|limit| shown >= limit) {
                log::debug!("reached --top-n limit of {} matches", shown);
                break 'tiers;
            }
        }
    }

    Ok(())
}
