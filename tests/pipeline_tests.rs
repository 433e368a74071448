//! End-to-end pipeline tests with real image files: walk, reconcile through
//! the worker pool with the real DCT hasher, persist, and rank.

use imgmatch::cache::FingerprintCache;
use imgmatch::phash::{DctHasher, FingerprintError, FingerprintProvider};
use imgmatch::pool::{self, PoolConfig};
use imgmatch::ranker::rank;
use imgmatch::walker::collect_candidates;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn gradient_image() -> image::RgbImage {
    image::RgbImage::from_fn(32, 32, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
    })
}

fn checkerboard_image() -> image::RgbImage {
    image::RgbImage::from_fn(32, 32, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            image::Rgb([240, 240, 240])
        } else {
            image::Rgb([15, 15, 15])
        }
    })
}

/// Provider wrapper that counts how many fingerprints were computed.
struct CountingProvider {
    inner: DctHasher,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            inner: DctHasher::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FingerprintProvider for CountingProvider {
    fn fingerprint(&self, path: &Path) -> Result<u64, FingerprintError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fingerprint(path)
    }
}

fn reconcile_with_pool(
    cache: &mut FingerprintCache,
    roots: &[std::path::PathBuf],
    provider: Arc<dyn FingerprintProvider>,
    concurrency: usize,
) {
    let candidates = collect_candidates(roots).unwrap();
    let config = PoolConfig::default().with_concurrency(concurrency);
    cache
        .reconcile(&candidates, |missing, sink| {
            pool::run(missing, provider, &config, sink)
        })
        .unwrap();
}

#[test]
fn full_pipeline_finds_the_duplicate_pair() {
    let dir = tempdir().unwrap();
    let copy1 = dir.path().join("copy1.png");
    let copy2 = dir.path().join("copy2.png");
    let other = dir.path().join("other.png");
    let not_an_image = dir.path().join("notes.txt");

    let gradient = gradient_image();
    gradient.save(&copy1).unwrap();
    gradient.save(&copy2).unwrap();
    checkerboard_image().save(&other).unwrap();
    std::fs::write(&not_an_image, b"just some text").unwrap();

    let cache_path = dir.path().join("imgmatch.db");
    let mut cache = FingerprintCache::load(&cache_path).unwrap();
    assert!(cache.is_empty());

    let roots = vec![dir.path().to_path_buf()];
    reconcile_with_pool(&mut cache, &roots, Arc::new(DctHasher::new()), 2);

    // Everything under the root is cached, the undecodable text file as
    // absent.
    assert_eq!(cache.len(), 4);
    assert_eq!(cache.get(&not_an_image), Some(None));

    let fp1 = cache.get(&copy1).unwrap().unwrap();
    let fp2 = cache.get(&copy2).unwrap().unwrap();
    assert_eq!(fp1, fp2);
    assert_ne!(fp1, 0);

    cache.save(&cache_path).unwrap();

    // The most similar pair is the identical copy, at distance 0.
    let first = rank(&cache).next().expect("at least one ranked pair");
    assert_eq!(first.distance, 0);
    assert_eq!(
        (first.left.as_path(), first.right.as_path()),
        (copy1.as_path(), copy2.as_path())
    );
}

#[test]
fn second_run_reuses_the_persisted_cache() {
    let dir = tempdir().unwrap();
    gradient_image().save(dir.path().join("a.png")).unwrap();
    checkerboard_image().save(dir.path().join("b.png")).unwrap();

    // Keep the cache file outside the scanned tree so the candidate set is
    // stable across runs.
    let cache_dir = tempdir().unwrap();
    let cache_path = cache_dir.path().join("imgmatch.db");
    let roots = vec![dir.path().to_path_buf()];

    let mut cache = FingerprintCache::load(&cache_path).unwrap();
    let first_provider = Arc::new(CountingProvider::new());
    reconcile_with_pool(&mut cache, &roots, first_provider.clone(), 2);
    assert_eq!(first_provider.calls.load(Ordering::SeqCst), 2);
    cache.save(&cache_path).unwrap();

    // Fresh load, unchanged tree: nothing to recompute.
    let mut reloaded = FingerprintCache::load(&cache_path).unwrap();
    assert_eq!(reloaded, cache);

    let second_provider = Arc::new(CountingProvider::new());
    reconcile_with_pool(&mut reloaded, &roots, second_provider.clone(), 2);
    assert_eq!(second_provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(reloaded, cache);
}

#[test]
fn deleted_files_are_pruned_on_the_next_run() {
    let dir = tempdir().unwrap();
    let keep = dir.path().join("keep.png");
    let gone = dir.path().join("gone.png");
    gradient_image().save(&keep).unwrap();
    checkerboard_image().save(&gone).unwrap();

    let roots = vec![dir.path().to_path_buf()];
    let mut cache = FingerprintCache::new();
    reconcile_with_pool(&mut cache, &roots, Arc::new(DctHasher::new()), 1);
    assert_eq!(cache.len(), 2);

    std::fs::remove_file(&gone).unwrap();
    reconcile_with_pool(&mut cache, &roots, Arc::new(DctHasher::new()), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&keep).is_some());
    assert_eq!(cache.get(&gone), None);
}

#[test]
fn corrupt_cache_file_aborts_the_run() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("imgmatch.db");
    std::fs::write(&cache_path, b"\x00\x01 not json").unwrap();

    assert!(FingerprintCache::load(&cache_path).is_err());
}
