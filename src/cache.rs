//! Content-addressable artifact cache.
//!
//! Artifacts are keyed by `(sha1(source bytes), shape index)`; identical
//! source content always maps to the same path. Entries never expire — the
//! cache directory is the lifetime store.
//!
//! No locking is performed: concurrent invocations racing on the same path
//! may interleave writes, and readers may observe a partially written file.
//! Orphaned artifacts from aborted runs are tolerated by the same
//! idempotence contract.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::ConversionError;

/// Block size for streaming content digests.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Whether `convert_if_absent` found an existing artifact or produced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Artifact already existed; conversion was skipped.
    Hit,
    /// Artifact was produced and written.
    Written,
}

/// Content-addressed artifact store on disk.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (creating if needed) the cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ConversionError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Streaming SHA-1 digest of a file's full byte content, lowercased hex.
    pub fn content_hash(path: &Path) -> Result<String, ConversionError> {
        let mut file = File::open(path)?;
        let mut hasher = Sha1::new();
        let mut buffer = vec![0u8; HASH_BLOCK_SIZE];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Deterministic artifact path for a content hash and shape index.
    pub fn artifact_path(&self, content_hash: &str, index: usize) -> PathBuf {
        self.root.join(format!("{}_{}.json", content_hash, index))
    }

    /// If `path` exists, skip conversion (a hit is a success; contents are
    /// not re-validated). Otherwise invoke `produce` and write its output.
    pub fn convert_if_absent<F>(
        &self,
        path: &Path,
        produce: F,
    ) -> Result<CacheOutcome, ConversionError>
    where
        F: FnOnce() -> Result<String, ConversionError>,
    {
        if path.exists() {
            debug!(artifact = %path.display(), "Artifact cache hit");
            return Ok(CacheOutcome::Hit);
        }

        let json = produce()?;
        std::fs::write(path, json)?;
        debug!(artifact = %path.display(), "Artifact written");
        Ok(CacheOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha1_hex() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("source.step");
        std::fs::write(&file, b"hello world").expect("write");

        // sha1("hello world")
        assert_eq!(
            ArtifactCache::content_hash(&file).expect("hash"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_identical_content_same_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let a = temp.path().join("a.step");
        let b = temp.path().join("b.step");
        std::fs::write(&a, b"same bytes").expect("write");
        std::fs::write(&b, b"same bytes").expect("write");

        let cache = ArtifactCache::new(temp.path().join("cache")).expect("cache");
        let hash_a = ArtifactCache::content_hash(&a).expect("hash");
        let hash_b = ArtifactCache::content_hash(&b).expect("hash");
        assert_eq!(
            cache.artifact_path(&hash_a, 0),
            cache.artifact_path(&hash_b, 0)
        );
        assert_ne!(
            cache.artifact_path(&hash_a, 0),
            cache.artifact_path(&hash_a, 1)
        );
    }

    #[test]
    fn test_convert_if_absent_skips_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ArtifactCache::new(temp.path()).expect("cache");
        let path = cache.artifact_path("abc", 0);

        let outcome = cache
            .convert_if_absent(&path, || Ok("{\"first\":true}".to_string()))
            .expect("convert");
        assert_eq!(outcome, CacheOutcome::Written);

        // Second call must not invoke the producer.
        let outcome = cache
            .convert_if_absent(&path, || {
                panic!("producer must not run on cache hit");
            })
            .expect("convert");
        assert_eq!(outcome, CacheOutcome::Hit);

        // Hit does not re-validate contents.
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "{\"first\":true}"
        );
    }

    #[test]
    fn test_producer_error_leaves_no_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cache = ArtifactCache::new(temp.path()).expect("cache");
        let path = cache.artifact_path("def", 0);

        let result = cache.convert_if_absent(&path, || {
            Err(ConversionError::InvalidShape {
                reason: "null shape".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
