//! Key-value cache for remote lookups.
//!
//! Results of `?go-get=1` discovery, remote ref listings, and GitHub API
//! calls are stored under a string key. [`NoopCache`] never stores anything;
//! [`DirCache`] keeps one file per key, named by a hash of the key.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_128;

use crate::Result;

/// Storage backend for cached lookups.
pub trait Cache {
    /// Returns the stored value for `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `value` under `key`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the value could not be written.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// A cache that always misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// A directory-backed cache.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::cache::{Cache, DirCache};
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = DirCache::new(dir.path());
/// cache.put("git ls-remote https://example.com v1 v1^{}", b"0123456789ab").unwrap();
/// assert_eq!(
///     cache.get("git ls-remote https://example.com v1 v1^{}").as_deref(),
///     Some(&b"0123456789ab"[..])
/// );
/// ```
#[derive(Debug, Clone)]
pub struct DirCache {
    root: PathBuf,
}

impl DirCache {
    /// Creates a cache storing files directly under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if needed and returns a cache rooted there.
    ///
    /// ## Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{:032x}", xxh3_128(key.as_bytes())))
    }
}

impl Cache for DirCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!(key, error = %e, "unreadable cache entry");
                None
            }
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::write(self.path(key), value)?;
        Ok(())
    }
}
