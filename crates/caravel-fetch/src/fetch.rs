use crate::registry::ArtifactRef;
use crate::FetchError;
use caravel_store::{ArtifactCache, StoreError};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

/// Retry and backoff policy for artifact downloads.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Total attempts per artifact, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Backoff before retrying after `attempt` failed attempts (1-based).
pub fn backoff_delay(policy: &FetchPolicy, attempt: u32) -> Duration {
    let factor = 1u32 << (attempt - 1).min(16);
    policy
        .base_delay
        .saturating_mul(factor)
        .min(policy.max_delay)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Artifact was already cache-valid; no network traffic.
    Cached,
    /// Artifact was downloaded, verified, and published to the cache.
    Downloaded,
}

enum AttemptError {
    /// Worth retrying: transport failures, HTTP 5xx.
    Transient(String),
    /// Not worth retrying: HTTP 4xx, local write failures.
    Permanent(String),
    Cancelled,
}

/// Downloads artifacts into the cache with resume, bounded retries, and
/// digest verification.
pub struct Fetcher {
    agent: ureq::Agent,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            policy,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FetchPolicy::default())
    }

    /// Fetch one artifact into the cache. See [`fetch_with_cancel`](Self::fetch_with_cancel).
    pub fn fetch(
        &self,
        artifact: &ArtifactRef,
        cache: &ArtifactCache,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_with_cancel(artifact, cache, &|| false)
    }

    /// Fetch one artifact into the cache.
    ///
    /// A cache-valid artifact short-circuits without touching the network.
    /// Otherwise the body streams into `<staging>/<checksum>.part`, resuming
    /// any earlier partial download via a Range request. Transient failures
    /// retry with bounded exponential backoff; the verified file is then
    /// published atomically into the cache. A digest mismatch discards the
    /// download and caches nothing.
    pub fn fetch_with_cancel(
        &self,
        artifact: &ArtifactRef,
        cache: &ArtifactCache,
        cancel: &(dyn Fn() -> bool + Sync),
    ) -> Result<FetchOutcome, FetchError> {
        let checksum = artifact.checksum.as_str();
        if cache.is_valid(checksum) {
            tracing::debug!(name = %artifact.name, "artifact already cached");
            return Ok(FetchOutcome::Cached);
        }

        let staged = cache.layout().staging_path(checksum);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel() {
                return Err(FetchError::Cancelled);
            }
            match self.try_download(&artifact.url, &staged, cancel) {
                Ok(()) => break,
                Err(AttemptError::Cancelled) => return Err(FetchError::Cancelled),
                Err(AttemptError::Transient(reason)) if attempt < self.policy.max_attempts => {
                    let delay = backoff_delay(&self.policy, attempt);
                    tracing::warn!(
                        url = %artifact.url,
                        attempt,
                        "transient download failure ({reason}), retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                }
                Err(AttemptError::Transient(reason) | AttemptError::Permanent(reason)) => {
                    return Err(FetchError::FetchFailed {
                        url: artifact.url.clone(),
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }

        match cache.insert_file(&staged, checksum) {
            Ok(_) => {
                tracing::info!(name = %artifact.name, checksum, "artifact fetched and verified");
                Ok(FetchOutcome::Downloaded)
            }
            Err(StoreError::IntegrityMismatch {
                expected, actual, ..
            }) => Err(FetchError::IntegrityMismatch {
                name: artifact.name.clone(),
                expected,
                actual,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// One download attempt: request (with Range when resuming), stream the
    /// body to the staged file.
    fn try_download(
        &self,
        url: &str,
        staged: &Path,
        cancel: &(dyn Fn() -> bool + Sync),
    ) -> Result<(), AttemptError> {
        let offset = std::fs::metadata(staged).map(|m| m.len()).unwrap_or(0);

        let mut req = self.agent.get(url);
        if offset > 0 {
            req = req.header("Range", &format!("bytes={offset}-"));
        }

        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(416)) if offset > 0 => {
                // Nothing left to request; the staged file may already be
                // complete. Verification decides.
                return Ok(());
            }
            Err(ureq::Error::StatusCode(code)) if code >= 500 => {
                return Err(AttemptError::Transient(format!("HTTP {code}")));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(AttemptError::Permanent(format!("HTTP {code}")));
            }
            Err(e) => return Err(AttemptError::Transient(e.to_string())),
        };

        let resuming = resp.status().as_u16() == 206;
        let mut file = if resuming {
            OpenOptions::new()
                .append(true)
                .open(staged)
                .map_err(|e| AttemptError::Permanent(format!("opening staged file: {e}")))?
        } else {
            // Server ignored (or never saw) the Range request; restart.
            std::fs::File::create(staged)
                .map_err(|e| AttemptError::Permanent(format!("creating staged file: {e}")))?
        };
        tracing::debug!(url, offset, resuming, "downloading");

        let mut reader = resp.into_body().into_reader();
        let mut buf = [0u8; 64 * 1024];
        loop {
            if cancel() {
                return Err(AttemptError::Cancelled);
            }
            let n = reader
                .read(&mut buf)
                .map_err(|e| AttemptError::Transient(format!("reading response body: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| AttemptError::Permanent(format!("writing staged file: {e}")))?;
        }
        file.flush()
            .map_err(|e| AttemptError::Permanent(format!("flushing staged file: {e}")))?;

        Ok(())
    }
}
