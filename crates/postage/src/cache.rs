//! Content-addressed postmark cache.
//!
//! Every purchased postmark is stored as `<root>/<key>.png`. Entries are
//! immutable: a key names exactly one receiver/product/date combination, so a
//! file that exists is never rewritten.
//!
//! Writes go through a temporary file in the cache root that is flushed,
//! synced and then linked into place without clobbering, so readers only ever
//! see complete files and concurrent writers of the same key both succeed.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use stampdesk_core::PurchaseKey;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur when accessing the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No postmark is stored under the key.
    #[error("no cached postmark for key {0}")]
    NotFound(PurchaseKey),

    /// Filesystem failure.
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a successful [`PostmarkCache::write`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new entry was published.
    Written,
    /// The key was already cached (possibly by a concurrent writer).
    AlreadyPresent,
}

/// Directory of purchased postmarks.
#[derive(Debug, Clone)]
pub struct PostmarkCache {
    root: PathBuf,
}

impl PostmarkCache {
    /// Open a cache rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for a key.
    #[must_use]
    pub fn path_for(&self, key: &PurchaseKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether a postmark for the key is cached.
    #[must_use]
    pub fn exists(&self, key: &PurchaseKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Read a cached postmark.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` if the key is not cached and
    /// `CacheError::Io` for any other filesystem failure.
    pub fn read(&self, key: &PurchaseKey) -> Result<Vec<u8>, CacheError> {
        let path = self.path_for(key);
        std::fs::read(&path).map_err(|e| {
            // A root that is not a directory holds no entries either
            if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) {
                CacheError::NotFound(key.clone())
            } else {
                CacheError::io(&path, e)
            }
        })
    }

    /// Store a postmark under its key.
    ///
    /// Writing a key that is already cached leaves the existing file untouched
    /// and returns `WriteOutcome::AlreadyPresent`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the entry cannot be staged or published. No
    /// partial file is left under the key in that case.
    #[instrument(skip(self, bytes), fields(key = %key, size = bytes.len()))]
    pub fn write(&self, key: &PurchaseKey, bytes: &[u8]) -> Result<WriteOutcome, CacheError> {
        let path = self.path_for(key);
        if path.is_file() {
            debug!("Postmark already cached");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        std::fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;

        // Stage in the cache root so the final link stays on one filesystem
        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| CacheError::io(&self.root, e))?;

        if let Err(e) = stage(&mut staged, bytes) {
            return Err(CacheError::io(staged.path(), e));
        }

        match staged.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Postmark cached");
                Ok(WriteOutcome::Written)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Postmark cached concurrently");
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) => Err(CacheError::io(&path, e.error)),
        }
    }
}

fn stage(file: &mut tempfile::NamedTempFile, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.as_file().sync_all()
}
