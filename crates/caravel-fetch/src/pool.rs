use crate::fetch::{FetchOutcome, Fetcher};
use crate::registry::ArtifactRef;
use crate::FetchError;
use caravel_store::ArtifactCache;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    /// Artifacts downloaded over the network this run.
    pub downloaded: usize,
    /// Artifacts satisfied from the cache.
    pub cached: usize,
}

/// Fetch a batch of independent artifacts with a bounded worker pool.
///
/// Workers drain a shared queue; the first failure stops the remaining work
/// and is returned. The external `cancel` flag (operator interrupt) stops
/// in-flight downloads between chunks. Provisioning never overlaps with this:
/// the orchestrator only moves on once every artifact is verified in cache.
pub fn fetch_all(
    fetcher: &Fetcher,
    requests: &[ArtifactRef],
    cache: &ArtifactCache,
    workers: usize,
    cancel: &(dyn Fn() -> bool + Sync),
) -> Result<FetchSummary, FetchError> {
    if requests.is_empty() {
        return Ok(FetchSummary::default());
    }

    let worker_count = workers.clamp(1, requests.len());
    let queue: Mutex<VecDeque<&ArtifactRef>> = Mutex::new(requests.iter().collect());
    let abort = AtomicBool::new(false);
    let downloaded = AtomicUsize::new(0);
    let cached = AtomicUsize::new(0);
    let first_error: Mutex<Option<FetchError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                if abort.load(Ordering::SeqCst) || cancel() {
                    break;
                }
                let Some(artifact) = queue.lock().expect("queue lock").pop_front() else {
                    break;
                };
                match fetcher.fetch_with_cancel(artifact, cache, cancel) {
                    Ok(FetchOutcome::Downloaded) => {
                        downloaded.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(FetchOutcome::Cached) => {
                        cached.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        tracing::error!(name = %artifact.name, "fetch failed: {e}");
                        abort.store(true, Ordering::SeqCst);
                        let mut slot = first_error.lock().expect("error lock");
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        break;
                    }
                }
            });
        }
    });

    if let Some(err) = first_error.into_inner().expect("error lock") {
        return Err(err);
    }
    if cancel() {
        return Err(FetchError::Cancelled);
    }

    Ok(FetchSummary {
        downloaded: downloaded.into_inner(),
        cached: cached.into_inner(),
    })
}

/// Verify that every requested artifact is already cache-valid, for offline
/// runs. Returns the first missing artifact as an error.
pub fn require_cached(
    requests: &[ArtifactRef],
    cache: &ArtifactCache,
) -> Result<FetchSummary, FetchError> {
    for artifact in requests {
        if !cache.is_valid(artifact.checksum.as_str()) {
            return Err(FetchError::OfflineMiss(artifact.name.clone()));
        }
    }
    Ok(FetchSummary {
        downloaded: 0,
        cached: requests.len(),
    })
}
