//! Local artifact cache and environment status persistence for Caravel.
//!
//! This crate provides the storage layer: a checksum-keyed `ArtifactCache`
//! with atomic publication and exclusive per-key writer locks, a
//! `StatusStore` tracking each environment's last-reached orchestrator state,
//! `StoreLayout` for directory structure management, and a whole-store
//! integrity sweep.

pub mod artifacts;
pub mod integrity;
pub mod layout;
pub mod status;

pub use artifacts::ArtifactCache;
pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use status::{RunState, StatusRecord, StatusStore};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
/// Calling `fsync()` on the parent directory makes the rename durable on
/// all filesystems and mount configurations.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for '{key}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("artifact not found in cache: {0}")]
    ArtifactNotFound(String),
    #[error("environment not found: {0}")]
    EnvNotFound(String),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid checksum key '{0}': expected 64 lowercase hex characters")]
    InvalidChecksum(String),
    #[error("name '{name}' is already used by environment {existing_env_id}")]
    NameConflict {
        name: String,
        existing_env_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_integrity_mismatch() {
        let e = StoreError::IntegrityMismatch {
            key: "k".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }

    #[test]
    fn error_display_artifact_not_found() {
        let e = StoreError::ArtifactNotFound("abc123".to_owned());
        assert!(e.to_string().contains("abc123"));
    }

    #[test]
    fn error_display_env_not_found() {
        let e = StoreError::EnvNotFound("envid".to_owned());
        assert!(e.to_string().contains("envid"));
    }

    #[test]
    fn error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 1,
            found: 7,
        };
        let msg = e.to_string();
        assert!(msg.contains('1'));
        assert!(msg.contains('7'));
    }

    #[test]
    fn error_display_name_conflict() {
        let e = StoreError::NameConflict {
            name: "dup".to_owned(),
            existing_env_id: "abc123def456".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("dup"));
        assert!(msg.contains("abc123def456"));
    }
}
