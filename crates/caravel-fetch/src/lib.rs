//! Image resolution and verified artifact fetching for Caravel.
//!
//! The registry maps declared image identifiers to pinned, checksummed
//! download URLs; the fetcher retrieves artifacts over HTTP with partial-file
//! resume and bounded exponential backoff, verifies the blake3 digest, and
//! publishes the result into the shared artifact cache. A bounded worker pool
//! downloads independent artifacts concurrently.

pub mod fetch;
pub mod pool;
pub mod registry;

pub use fetch::{FetchOutcome, FetchPolicy, Fetcher};
pub use pool::{fetch_all, FetchSummary};
pub use registry::{ArtifactRef, ImageRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unresolved image '{0}': not pinned and not present in any registry")]
    UnresolvedImage(String),
    #[error("integrity mismatch for '{name}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("fetch failed for {url} after {attempts} attempt(s): {reason}")]
    FetchFailed {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("artifact '{0}' is not in the local cache and offline mode forbids downloads")]
    OfflineMiss(String),
    #[error("fetch cancelled")]
    Cancelled,
    #[error("invalid registry file {path}: {reason}")]
    Registry { path: String, reason: String },
    #[error("store error: {0}")]
    Store(#[from] caravel_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
