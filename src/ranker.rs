//! All-pairs similarity ranking.
//!
//! [`rank`] turns the fingerprint cache into a lazy stream of
//! [`SimilarityTriple`]s ordered by ascending Hamming distance. The stream
//! enumerates every unordered pair of usable cached paths exactly once -
//! O(n²) pairs, an accepted scalability ceiling - pushing each pair into a
//! min-heap keyed by distance. Distance-0 pairs short-circuit the heap: no
//! pair can rank lower, so exact matches are yielded the moment the
//! enumeration finds them, before the pairwise scan completes.
//!
//! Paths whose fingerprint is absent, or equal to the degenerate zero value
//! (blank/unreadable image), are excluded from every comparison.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;

use crate::cache::FingerprintCache;
use crate::phash::hamming_distance;

/// A pair of paths and the Hamming distance between their fingerprints.
///
/// `left` sorts before `right` because pairs are enumerated from the
/// cache's sorted key order. The derived `Ord` (distance first) is what the
/// ranking heap sorts by, and makes tie order deterministic for a given
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimilarityTriple {
    /// Hamming distance between the two fingerprints.
    pub distance: u32,
    /// First path of the pair.
    pub left: PathBuf,
    /// Second path of the pair.
    pub right: PathBuf,
}

/// Produce the ascending-distance stream of similar pairs for a cache.
///
/// The returned iterator is finite and derives everything from the cache at
/// call time; call again for a fresh pass.
#[must_use]
pub fn rank(cache: &FingerprintCache) -> RankedPairs {
    let mut usable = Vec::new();
    for (path, fingerprint) in cache.entries() {
        match fingerprint {
            Some(fp) if *fp != 0 => usable.push((path.clone(), *fp)),
            Some(_) => log::debug!(
                "skipping {}: degenerate zero fingerprint",
                path.display()
            ),
            None => log::debug!("skipping {}: no fingerprint recorded", path.display()),
        }
    }

    RankedPairs {
        usable,
        i: 0,
        j: 1,
        heap: BinaryHeap::new(),
    }
}

/// Lazy iterator over ranked pairs. See [`rank`].
pub struct RankedPairs {
    usable: Vec<(PathBuf, u64)>,
    i: usize,
    j: usize,
    heap: BinaryHeap<Reverse<SimilarityTriple>>,
}

impl Iterator for RankedPairs {
    type Item = SimilarityTriple;

    fn next(&mut self) -> Option<SimilarityTriple> {
        // Enumeration phase: walk remaining pairs, yielding exact matches
        // immediately and deferring everything else to the heap.
        while self.i < self.usable.len() {
            if self.j >= self.usable.len() {
                self.i += 1;
                self.j = self.i + 1;
                continue;
            }

            let (ref left, left_fp) = self.usable[self.i];
            let (ref right, right_fp) = self.usable[self.j];
            self.j += 1;

            let distance = hamming_distance(left_fp, right_fp);
            let triple = SimilarityTriple {
                distance,
                left: left.clone(),
                right: right.clone(),
            };
            if distance == 0 {
                return Some(triple);
            }
            self.heap.push(Reverse(triple));
        }

        // Drain phase: pop remaining pairs in ascending distance order.
        self.heap.pop().map(|Reverse(triple)| triple)
    }
}
