use crate::concurrency::{shutdown_requested, EnvLock};
use crate::lifecycle::validate_transition;
use crate::provision::apply_steps;
use crate::CoreError;
use caravel_fetch::pool::{self, FetchSummary, DEFAULT_WORKERS};
use caravel_fetch::registry::{ArtifactRef, ImageRegistry};
use caravel_fetch::{FetchPolicy, Fetcher};
use caravel_gateway::{
    open_session, select_transport, wait_ready, Credentials, ReadinessPolicy, SessionTarget,
    SessionTransport,
};
use caravel_schema::{compute_env_id, parse_descriptor_file, EnvIdentity, NormalizedDescriptor};
use caravel_store::{ArtifactCache, RunState, StatusRecord, StatusStore, StoreLayout};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Central orchestration engine for the Caravel environment lifecycle.
///
/// Sequences one `up` operation per environment through
/// `Resolving → Fetching → Provisioning → Ready`, persisting every state
/// transition, and opens authenticated sessions into ready environments.
pub struct Engine {
    layout: StoreLayout,
    cache: ArtifactCache,
    status: StatusStore,
    /// Override for the user registry file; `None` uses the default path.
    registry_path: Option<PathBuf>,
    fetch_policy: FetchPolicy,
    readiness: ReadinessPolicy,
    workers: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpOptions {
    /// Forbid network traffic; every artifact must already be cache-valid.
    pub offline: bool,
}

/// Result of a successful `up` operation.
#[derive(Debug)]
pub struct UpReport {
    pub identity: EnvIdentity,
    pub state: RunState,
    pub summary: FetchSummary,
    pub steps_applied: usize,
    /// The environment was already `Ready`; nothing was re-run.
    pub already_ready: bool,
}

impl Engine {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = store_root.into();
        let layout = StoreLayout::new(&root);
        let cache = ArtifactCache::new(layout.clone());
        let status = StatusStore::new(layout.clone());
        Self {
            layout,
            cache,
            status,
            registry_path: None,
            fetch_policy: FetchPolicy::default(),
            readiness: ReadinessPolicy::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    #[must_use]
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    #[must_use]
    pub fn with_readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Bring an environment up, selecting the session transport declared in
    /// the descriptor. Ctrl-c (once installed via
    /// [`install_signal_handler`](crate::concurrency::install_signal_handler))
    /// cancels between phases and inside downloads.
    pub fn up(&self, descriptor_path: &Path, options: UpOptions) -> Result<UpReport, CoreError> {
        let normalized = self.load_descriptor(descriptor_path)?;
        let transport = select_transport(&normalized.session.transport)?;
        self.run_up(&normalized, options, transport.as_ref(), &shutdown_requested)
    }

    /// `up` with an injected transport and cancel flag.
    pub fn up_with_transport(
        &self,
        descriptor_path: &Path,
        options: UpOptions,
        transport: &dyn SessionTransport,
        cancel: &(dyn Fn() -> bool + Sync),
    ) -> Result<UpReport, CoreError> {
        let normalized = self.load_descriptor(descriptor_path)?;
        self.run_up(&normalized, options, transport, cancel)
    }

    fn load_descriptor(&self, path: &Path) -> Result<NormalizedDescriptor, CoreError> {
        Ok(parse_descriptor_file(path)?.normalize()?)
    }

    fn run_up(
        &self,
        normalized: &NormalizedDescriptor,
        options: UpOptions,
        transport: &dyn SessionTransport,
        cancel: &(dyn Fn() -> bool + Sync),
    ) -> Result<UpReport, CoreError> {
        let identity = compute_env_id(normalized)?;
        self.layout.initialize()?;

        // Startup decision: `Ready` short-circuits, anything else restarts
        // from `Resolving`.
        if let Ok(existing) = self.status.get(&identity.env_id) {
            if existing.state == RunState::Ready {
                info!(env = %identity.short_id, "environment already ready");
                return Ok(UpReport {
                    identity,
                    state: RunState::Ready,
                    summary: FetchSummary::default(),
                    steps_applied: 0,
                    already_ready: true,
                });
            }
        }

        // One logical operation per environment.
        let _lock = EnvLock::try_acquire(&self.layout.env_lock_file(&identity.env_id))?
            .ok_or_else(|| CoreError::OperationInProgress(identity.short_id.to_string()))?;

        let mut record = self.load_or_create_record(&identity, normalized)?;

        self.check_cancel(&mut record, cancel)?;
        self.advance(&mut record, RunState::Resolving)?;

        let artifacts = match self.resolve_artifacts(normalized) {
            Ok(artifacts) => artifacts,
            Err(e) => return Err(self.fail(&mut record, e)),
        };
        record.artifacts = artifacts.iter().map(|a| a.checksum.clone()).collect();
        self.status.put(&record)?;

        self.check_cancel(&mut record, cancel)?;
        self.advance(&mut record, RunState::Fetching)?;

        let fetcher = Fetcher::new(self.fetch_policy.clone());
        let fetch_result = if options.offline {
            pool::require_cached(&artifacts, &self.cache)
        } else {
            pool::fetch_all(&fetcher, &artifacts, &self.cache, self.workers, cancel)
        };
        let summary = match fetch_result {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(&mut record, e)),
        };
        debug!(
            downloaded = summary.downloaded,
            cached = summary.cached,
            "artifacts staged"
        );

        self.check_cancel(&mut record, cancel)?;
        self.advance(&mut record, RunState::Provisioning)?;

        let target = SessionTarget::from(&normalized.session);
        let creds = Credentials::from(&normalized.session);
        if let Err(e) = wait_ready(transport, &target, &self.readiness) {
            return Err(self.fail(&mut record, e));
        }
        if let Err(e) = transport.check_auth(&target, &creds) {
            return Err(self.fail(&mut record, e));
        }
        if let Err(e) = apply_steps(transport, &target, &creds, &normalized.steps) {
            return Err(self.fail(&mut record, e));
        }

        self.advance(&mut record, RunState::Ready)?;
        info!(env = %identity.short_id, "environment ready");

        Ok(UpReport {
            identity,
            state: RunState::Ready,
            summary,
            steps_applied: normalized.steps.len(),
            already_ready: false,
        })
    }

    fn load_or_create_record(
        &self,
        identity: &EnvIdentity,
        normalized: &NormalizedDescriptor,
    ) -> Result<StatusRecord, CoreError> {
        match self.status.get(&identity.env_id) {
            Ok(mut existing) => {
                // A run that died mid-phase restarts from the beginning; mark
                // the stale state failed so the restart transition is
                // well-formed.
                if !existing.state.is_terminal() && existing.state != RunState::NotStarted {
                    warn!(
                        env = %identity.short_id,
                        state = %existing.state,
                        "previous run was interrupted; restarting"
                    );
                    existing.state = RunState::Failed;
                    existing.message = Some("previous run interrupted".to_owned());
                    existing.updated_at = chrono::Utc::now().to_rfc3339();
                    self.status.put(&existing)?;
                }
                Ok(existing)
            }
            Err(_) => {
                let now = chrono::Utc::now().to_rfc3339();
                let record = StatusRecord {
                    env_id: identity.env_id.clone(),
                    short_id: identity.short_id.clone(),
                    name: normalized.name.clone(),
                    image: normalized.image.display_id().to_owned(),
                    state: RunState::NotStarted,
                    message: None,
                    artifacts: Vec::new(),
                    created_at: now.clone(),
                    updated_at: now,
                    checksum: None,
                };
                self.status.put(&record)?;
                Ok(record)
            }
        }
    }

    fn resolve_artifacts(
        &self,
        normalized: &NormalizedDescriptor,
    ) -> Result<Vec<ArtifactRef>, CoreError> {
        let registry = match &self.registry_path {
            Some(path) => ImageRegistry::load(path),
            None => ImageRegistry::load_default(),
        }?;
        let base = registry.resolve(&normalized.image)?;
        info!(image = %normalized.image.display_id(), url = %base.url, "image resolved");

        let mut artifacts = vec![base];
        for a in &normalized.artifacts {
            artifacts.push(ArtifactRef {
                name: a.name.clone(),
                url: a.url.clone(),
                checksum: a.checksum.clone(),
            });
        }
        Ok(artifacts)
    }

    fn advance(&self, record: &mut StatusRecord, to: RunState) -> Result<(), CoreError> {
        validate_transition(record.state, to)?;
        debug!(env = %record.short_id, from = %record.state, to = %to, "state transition");
        record.state = to;
        record.message = None;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.status.put(record)?;
        Ok(())
    }

    /// Persist `Failed` with the cause and hand the error back.
    fn fail(&self, record: &mut StatusRecord, cause: impl Into<CoreError>) -> CoreError {
        let err = cause.into();
        warn!(env = %record.short_id, "run failed: {err}");
        record.state = RunState::Failed;
        record.message = Some(err.to_string());
        record.updated_at = chrono::Utc::now().to_rfc3339();
        if let Err(persist_err) = self.status.put(record) {
            warn!("could not persist failure state: {persist_err}");
        }
        err
    }

    fn check_cancel(
        &self,
        record: &mut StatusRecord,
        cancel: &(dyn Fn() -> bool + Sync),
    ) -> Result<(), CoreError> {
        if cancel() {
            Err(self.fail(record, CoreError::Cancelled))
        } else {
            Ok(())
        }
    }

    /// Open a session into a `Ready` environment: interactive shell, or a
    /// one-shot remote command. Returns the remote exit code.
    pub fn session(
        &self,
        descriptor_path: &Path,
        command: Option<&str>,
    ) -> Result<i32, CoreError> {
        let normalized = self.load_descriptor(descriptor_path)?;
        let transport = select_transport(&normalized.session.transport)?;
        self.run_session(&normalized, command, transport.as_ref())
    }

    /// `session` with an injected transport.
    pub fn session_with_transport(
        &self,
        descriptor_path: &Path,
        command: Option<&str>,
        transport: &dyn SessionTransport,
    ) -> Result<i32, CoreError> {
        let normalized = self.load_descriptor(descriptor_path)?;
        self.run_session(&normalized, command, transport)
    }

    fn run_session(
        &self,
        normalized: &NormalizedDescriptor,
        command: Option<&str>,
        transport: &dyn SessionTransport,
    ) -> Result<i32, CoreError> {
        let identity = compute_env_id(normalized)?;
        let record = self
            .status
            .get(&identity.env_id)
            .map_err(|_| CoreError::EnvNotFound(identity.short_id.to_string()))?;
        if record.state != RunState::Ready {
            return Err(CoreError::NotReady {
                env_id: identity.short_id.to_string(),
                state: record.state.to_string(),
            });
        }

        let handle = open_session(
            transport,
            &identity.env_id,
            SessionTarget::from(&normalized.session),
            Credentials::from(&normalized.session),
            &self.readiness,
        )?;
        let code = match command {
            Some(c) => handle.exec(transport, c)?,
            None => handle.shell(transport)?,
        };
        Ok(code)
    }

    /// Status record for the environment declared by a descriptor.
    pub fn status(&self, descriptor_path: &Path) -> Result<StatusRecord, CoreError> {
        let normalized = self.load_descriptor(descriptor_path)?;
        let identity = compute_env_id(&normalized)?;
        self.status
            .get(&identity.env_id)
            .map_err(|_| CoreError::EnvNotFound(identity.short_id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<StatusRecord>, CoreError> {
        self.layout.initialize()?;
        Ok(self.status.list()?)
    }

    /// Forget an environment: remove its status record. Cached artifacts are
    /// shared across environments and are left to the cache commands.
    pub fn destroy(&self, needle: &str) -> Result<StatusRecord, CoreError> {
        let record = self.find_record(needle)?;
        self.status.remove(record.env_id.as_str())?;
        info!(env = %record.short_id, "environment forgotten");
        Ok(record)
    }

    /// Look an environment up by full id, short id, name, or unambiguous id
    /// prefix.
    pub fn find_record(&self, needle: &str) -> Result<StatusRecord, CoreError> {
        let all = self.status.list()?;
        for r in &all {
            if r.env_id == needle || r.short_id == needle || r.name.as_deref() == Some(needle) {
                return Ok(r.clone());
            }
        }

        let matches: Vec<_> = all
            .iter()
            .filter(|r| r.env_id.starts_with(needle))
            .collect();
        match matches.len() {
            1 => Ok(matches[0].clone()),
            0 => Err(CoreError::EnvNotFound(needle.to_owned())),
            n => Err(CoreError::EnvNotFound(format!(
                "ambiguous prefix '{needle}' matches {n} environments"
            ))),
        }
    }
}
