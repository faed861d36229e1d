use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use caravel_schema::types::is_hex_digest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Checksum-keyed artifact cache.
///
/// Artifacts are stored as files named by their blake3 hex digest. Publication
/// is atomic (staged file renamed into place under an exclusive per-key lock,
/// then the directory is fsynced), so readers only ever observe complete,
/// verified files and never need a lock of their own. The cache is shared
/// read-only across environments and runs.
pub struct ArtifactCache {
    layout: StoreLayout,
}

/// Exclusive advisory lock for one cache key, released on drop.
struct KeyLock {
    file: File,
}

impl KeyLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(e.to_string()))?;
        Ok(Self { file })
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Stream a file through blake3 and return its hex digest.
pub fn hash_file(path: &Path) -> Result<String, StoreError> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

impl ArtifactCache {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn path_for(&self, checksum: &str) -> PathBuf {
        self.layout.artifacts_dir().join(checksum)
    }

    /// True if an artifact file exists under this key. Does not re-verify
    /// contents; use [`verify`](Self::verify) for that.
    pub fn contains(&self, checksum: &str) -> bool {
        self.path_for(checksum).exists()
    }

    /// Recompute the digest of a cached artifact and compare it to its key.
    pub fn verify(&self, checksum: &str) -> Result<(), StoreError> {
        let path = self.path_for(checksum);
        if !path.exists() {
            return Err(StoreError::ArtifactNotFound(checksum.to_owned()));
        }
        let actual = hash_file(&path)?;
        if actual != checksum {
            return Err(StoreError::IntegrityMismatch {
                key: checksum.to_owned(),
                expected: checksum.to_owned(),
                actual,
            });
        }
        Ok(())
    }

    /// True if the artifact is present and its content matches its key.
    pub fn is_valid(&self, checksum: &str) -> bool {
        self.verify(checksum).is_ok()
    }

    /// Publish a staged file into the cache under `expected` after verifying
    /// its digest. The source file is consumed: renamed into place on
    /// success, deleted on mismatch. Publication holds the exclusive per-key
    /// lock; concurrent writers of the same key serialize here.
    pub fn insert_file(&self, src: &Path, expected: &str) -> Result<PathBuf, StoreError> {
        if !is_hex_digest(expected) {
            return Err(StoreError::InvalidChecksum(expected.to_owned()));
        }

        let _lock = KeyLock::acquire(&self.layout.key_lock_file(expected))?;

        let dest = self.path_for(expected);
        if dest.exists() {
            // Another writer already published this key; the staged copy is
            // redundant.
            let _ = fs::remove_file(src);
            return Ok(dest);
        }

        let actual = hash_file(src)?;
        if actual != expected {
            let _ = fs::remove_file(src);
            return Err(StoreError::IntegrityMismatch {
                key: expected.to_owned(),
                expected: expected.to_owned(),
                actual,
            });
        }

        let dir = self.layout.artifacts_dir();
        fs::rename(src, &dest)?;
        fsync_dir(&dir)?;
        tracing::debug!(checksum = expected, "artifact published to cache");

        Ok(dest)
    }

    pub fn remove(&self, checksum: &str) -> Result<(), StoreError> {
        let _lock = KeyLock::acquire(&self.layout.key_lock_file(checksum))?;
        let path = self.path_for(checksum);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// All cache keys, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.artifacts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_owned());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Total size in bytes of all cached artifacts.
    pub fn total_size(&self) -> Result<u64, StoreError> {
        let mut total = 0;
        for key in self.list()? {
            total += fs::metadata(self.path_for(&key))?.len();
        }
        Ok(total)
    }

    /// Remove every cached artifact. Returns the number removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let keys = self.list()?;
        for key in &keys {
            self.remove(key)?;
        }
        Ok(keys.len())
    }
}
