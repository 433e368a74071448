//! DCT-based perceptual fingerprints.
//!
//! A fingerprint is a 64-bit value summarizing the perceptual content of an
//! image; two fingerprints are compared by Hamming distance. Fingerprints
//! are computed with [`image_hasher`]'s DCT mean hash (pHash), which is
//! resilient to resizing and recompression.
//!
//! A fingerprint of exactly `0` is the degenerate value produced for blank
//! or unreadable images. It is stored in the cache like any other value but
//! is never compared during ranking (see [`crate::ranker`]).

use image_hasher::{HashAlg, HasherConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while computing a fingerprint.
///
/// These are per-path failures: the affected path is recorded in the cache
/// with the absent marker and the run continues.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// Failed to open or decode the image.
    #[error("failed to decode image {0}: {1}")]
    Decode(PathBuf, #[source] image::ImageError),

    /// The hasher produced a hash of unexpected width.
    #[error("unexpected fingerprint width for {0}: {1} bytes")]
    Width(PathBuf, usize),
}

/// Source of perceptual fingerprints.
///
/// The worker pool holds the provider behind `Arc<dyn FingerprintProvider>`
/// so tests can substitute a deterministic stub.
pub trait FingerprintProvider: Send + Sync {
    /// Compute the 64-bit fingerprint for the image at `path`.
    fn fingerprint(&self, path: &Path) -> Result<u64, FingerprintError>;
}

/// Count of differing bits between two fingerprints.
#[must_use]
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Computes pHash-style fingerprints via `image_hasher`.
///
/// Stateless: the hasher is built per call, which keeps the type trivially
/// `Send + Sync` for use from pool worker threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DctHasher;

impl DctHasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintProvider for DctHasher {
    fn fingerprint(&self, path: &Path) -> Result<u64, FingerprintError> {
        let img = image::open(path)
            .map_err(|e| FingerprintError::Decode(path.to_path_buf(), e))?;

        // 8x8 DCT mean hash: 64 bits, matching the cache's fingerprint width
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        let hash = hasher.hash_image(&img);
        let bytes: [u8; 8] = hash
            .as_bytes()
            .try_into()
            .map_err(|_| FingerprintError::Width(path.to_path_buf(), hash.as_bytes().len()))?;

        Ok(u64::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0b0001, 0b0011), 1);
        assert_eq!(hamming_distance(0b0001, 0b0010), 2);
        assert_eq!(hamming_distance(u64::MAX, 0), 64);
        assert_eq!(hamming_distance(0xdead_beef, 0xdead_beef), 0);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not_an_image.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "plain text").unwrap();

        let result = DctHasher::new().fingerprint(&path);
        assert!(matches!(result, Err(FingerprintError::Decode(..))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = DctHasher::new().fingerprint(Path::new("/nonexistent/image.png"));
        assert!(result.is_err());
    }

    #[test]
    fn test_identical_images_hash_identically() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");

        let img = gradient_image();
        img.save(&a).unwrap();
        img.save(&b).unwrap();

        let hasher = DctHasher::new();
        let fp_a = hasher.fingerprint(&a).unwrap();
        let fp_b = hasher.fingerprint(&b).unwrap();
        assert_eq!(fp_a, fp_b);
        assert_ne!(fp_a, 0, "gradient image must not produce the zero sentinel");
    }

    fn gradient_image() -> image::RgbImage {
        image::RgbImage::from_fn(32, 32, |x, y| {
            image::Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        })
    }
}
