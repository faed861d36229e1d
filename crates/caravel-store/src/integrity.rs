use crate::artifacts::ArtifactCache;
use crate::layout::StoreLayout;
use crate::status::StatusStore;
use crate::StoreError;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub artifacts_checked: usize,
    pub artifacts_passed: usize,
    pub status_checked: usize,
    pub status_passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub key: String,
    pub reason: String,
}

/// Recompute every cached artifact digest and every status record checksum.
pub fn verify_store_integrity(layout: &StoreLayout) -> Result<IntegrityReport, StoreError> {
    let cache = ArtifactCache::new(layout.clone());
    let status_store = StatusStore::new(layout.clone());

    let keys = cache.list()?;
    let mut report = IntegrityReport {
        artifacts_checked: keys.len(),
        ..Default::default()
    };

    for key in &keys {
        match cache.verify(key) {
            Ok(()) => report.artifacts_passed += 1,
            Err(StoreError::IntegrityMismatch { actual, .. }) => {
                report.failed.push(IntegrityFailure {
                    key: key.clone(),
                    reason: format!("artifact digest mismatch: got {actual}"),
                });
            }
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    key: key.clone(),
                    reason: format!("artifact read error: {e}"),
                });
            }
        }
    }

    for entry in status_store.list_with_errors()? {
        report.status_checked += 1;
        match entry {
            Ok(_) => report.status_passed += 1,
            Err((key, e)) => {
                report.failed.push(IntegrityFailure {
                    key,
                    reason: format!("status record error: {e}"),
                });
            }
        }
    }

    Ok(report)
}
