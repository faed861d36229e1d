use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout for the Caravel store.
///
/// The root holds the shared artifact cache (files named by blake3 checksum),
/// a staging area for in-flight downloads, per-key lock files, and one status
/// record per environment. All subdirectories are created lazily on
/// [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("cache").join("artifacts")
    }

    /// Temporary area for partial downloads (`<checksum>.part` files).
    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("cache").join("staging")
    }

    #[inline]
    pub fn staging_path(&self, checksum: &str) -> PathBuf {
        self.staging_dir().join(format!("{checksum}.part"))
    }

    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("cache").join("locks")
    }

    #[inline]
    pub fn status_dir(&self) -> PathBuf {
        self.root.join("environments")
    }

    /// Lock file guarding the whole `up` operation for one environment.
    #[inline]
    pub fn env_lock_file(&self, env_id: &str) -> PathBuf {
        self.locks_dir().join(format!("env-{env_id}.lock"))
    }

    /// Lock file guarding cache publication for one checksum key.
    #[inline]
    pub fn key_lock_file(&self, checksum: &str) -> PathBuf {
        self.locks_dir().join(format!("key-{checksum}.lock"))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.artifacts_dir())?;
        fs::create_dir_all(self.staging_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        fs::create_dir_all(self.status_dir())?;

        let version_path = self.root.join("cache").join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let cache_dir = self.root.join("cache");
            let mut tmp = NamedTempFile::new_in(&cache_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&cache_dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join("cache").join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}
