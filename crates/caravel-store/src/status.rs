use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use caravel_schema::types::{Checksum, EnvId, ShortId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Orchestrator state for one environment run.
///
/// Transitions are strictly forward (`NotStarted` through `Ready`) except
/// `Failed`, which is reachable from any non-terminal state. `Ready` is
/// terminal success; a `Failed` environment restarts from `Resolving`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Resolving,
    Fetching,
    Provisioning,
    Ready,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Ready | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Resolving => write!(f, "resolving"),
            RunState::Fetching => write!(f, "fetching"),
            RunState::Provisioning => write!(f, "provisioning"),
            RunState::Ready => write!(f, "ready"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Persisted record of an environment's last-reached orchestrator state.
///
/// Read on startup to decide whether a run resumes (`Ready` short-circuits)
/// or restarts from `Resolving`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusRecord {
    pub env_id: EnvId,
    pub short_id: ShortId,
    #[serde(default)]
    pub name: Option<String>,
    /// Operator-facing image identifier (registry id or pinned URL).
    pub image: String,
    pub state: RunState,
    /// Failure cause when `state` is `Failed`.
    #[serde(default)]
    pub message: Option<String>,
    /// Checksums of the artifacts staged for this environment.
    #[serde(default)]
    pub artifacts: Vec<Checksum>,
    pub created_at: String,
    pub updated_at: String,
    /// blake3 self-checksum for corruption detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl StatusRecord {
    /// Compute the checksum over the record content (excluding the checksum
    /// field itself).
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

pub struct StatusStore {
    layout: StoreLayout,
}

impl StatusStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, record: &StatusRecord) -> Result<(), StoreError> {
        if let Some(ref name) = record.name {
            if let Ok(existing) = self.get_by_name(name) {
                if existing.env_id != record.env_id {
                    return Err(StoreError::NameConflict {
                        name: name.clone(),
                        existing_env_id: existing.short_id.into_inner(),
                    });
                }
            }
        }

        let dest = self.layout.status_dir().join(record.env_id.as_str());

        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let dir = self.layout.status_dir();
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(())
    }

    pub fn get(&self, env_id: &str) -> Result<StatusRecord, StoreError> {
        let path = self.layout.status_dir().join(env_id);
        if !path.exists() {
            return Err(StoreError::EnvNotFound(env_id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let record: StatusRecord = serde_json::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityMismatch {
                    key: env_id.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(record)
    }

    pub fn update_state(
        &self,
        env_id: &str,
        state: RunState,
        message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut record = self.get(env_id)?;
        record.state = state;
        record.message = message;
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.put(&record)
    }

    pub fn exists(&self, env_id: &str) -> bool {
        self.layout.status_dir().join(env_id).exists()
    }

    pub fn remove(&self, env_id: &str) -> Result<(), StoreError> {
        let path = self.layout.status_dir().join(env_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<StatusRecord>, StoreError> {
        let dir = self.layout.status_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name();
                let name_str = name.to_str().unwrap_or("");
                if !name_str.starts_with('.') {
                    match self.get(name_str) {
                        Ok(record) => results.push(record),
                        Err(e) => {
                            tracing::warn!("skipping corrupted status record '{name_str}': {e}");
                        }
                    }
                }
            }
        }
        results.sort_by(|a, b| a.env_id.cmp(&b.env_id));
        Ok(results)
    }

    /// Like `list()`, but returns per-entry `Result`s so callers can surface
    /// individual corruption errors.
    #[allow(clippy::type_complexity)]
    pub fn list_with_errors(
        &self,
    ) -> Result<Vec<Result<StatusRecord, (String, StoreError)>>, StoreError> {
        let dir = self.layout.status_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name();
                let name_str = name.to_str().unwrap_or("").to_owned();
                if !name_str.starts_with('.') {
                    match self.get(&name_str) {
                        Ok(record) => results.push(Ok(record)),
                        Err(e) => results.push(Err((name_str, e))),
                    }
                }
            }
        }
        Ok(results)
    }

    pub fn get_by_name(&self, name: &str) -> Result<StatusRecord, StoreError> {
        let all = self.list()?;
        all.into_iter()
            .find(|r| r.name.as_deref() == Some(name))
            .ok_or_else(|| StoreError::EnvNotFound(format!("name '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_status_store() -> (tempfile::TempDir, StatusStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, StatusStore::new(layout))
    }

    fn sample_record() -> StatusRecord {
        StatusRecord {
            env_id: "abc123def456".into(),
            short_id: "abc123def456".into(),
            name: None,
            image: "ubuntu-24.04".to_owned(),
            state: RunState::NotStarted,
            message: None,
            artifacts: vec![],
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
            checksum: None,
        }
    }

    #[test]
    fn record_roundtrip() {
        let (_dir, store) = test_status_store();
        let record = sample_record();
        store.put(&record).unwrap();
        let retrieved = store.get(&record.env_id).unwrap();
        assert_eq!(record.env_id, retrieved.env_id);
        assert_eq!(record.state, retrieved.state);
        assert!(retrieved.checksum.is_some(), "put() must embed a checksum");
    }

    #[test]
    fn state_transition_persists() {
        let (_dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();
        store
            .update_state("abc123def456", RunState::Resolving, None)
            .unwrap();
        let record = store.get("abc123def456").unwrap();
        assert_eq!(record.state, RunState::Resolving);
        assert_ne!(record.updated_at, record.created_at);
    }

    #[test]
    fn failure_message_is_kept() {
        let (_dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();
        store
            .update_state(
                "abc123def456",
                RunState::Failed,
                Some("checksum mismatch on base image".to_owned()),
            )
            .unwrap();
        let record = store.get("abc123def456").unwrap();
        assert_eq!(record.state, RunState::Failed);
        assert_eq!(
            record.message.as_deref(),
            Some("checksum mismatch on base image")
        );
    }

    #[test]
    fn tampered_record_fails_integrity() {
        let (dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();

        let path = dir.path().join("environments").join("abc123def456");
        let content = fs::read_to_string(&path).unwrap();
        let tampered = content.replace("ubuntu-24.04", "debian-12");
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            store.get("abc123def456"),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn list_skips_corrupt_records() {
        let (dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();
        fs::write(
            dir.path().join("environments").join("corrupt_env"),
            "NOT VALID JSON",
        )
        .unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].env_id, "abc123def456");
    }

    #[test]
    fn list_with_errors_surfaces_corruption() {
        let (dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();
        fs::write(dir.path().join("environments").join("corrupt_env"), "GARBAGE").unwrap();

        let results = store.list_with_errors().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn get_by_name_works() {
        let (_dir, store) = test_status_store();
        let mut record = sample_record();
        record.name = Some("dev-vm".to_owned());
        store.put(&record).unwrap();
        let found = store.get_by_name("dev-vm").unwrap();
        assert_eq!(found.env_id, record.env_id);
        assert!(store.get_by_name("other").is_err());
    }

    #[test]
    fn name_uniqueness_enforced() {
        let (_dir, store) = test_status_store();
        let mut first = sample_record();
        first.name = Some("shared".to_owned());
        store.put(&first).unwrap();

        let mut second = sample_record();
        second.env_id = "xyz789".into();
        second.short_id = "xyz789".into();
        second.name = Some("shared".to_owned());
        assert!(matches!(
            store.put(&second),
            Err(StoreError::NameConflict { .. })
        ));
    }

    #[test]
    fn same_name_same_env_allowed() {
        let (_dir, store) = test_status_store();
        let mut record = sample_record();
        record.name = Some("dev-vm".to_owned());
        store.put(&record).unwrap();
        // Re-writing the same environment under the same name is fine.
        record.state = RunState::Resolving;
        store.put(&record).unwrap();
    }

    #[test]
    fn remove_deletes_record() {
        let (_dir, store) = test_status_store();
        store.put(&sample_record()).unwrap();
        store.remove("abc123def456").unwrap();
        assert!(!store.exists("abc123def456"));
        // Idempotent.
        store.remove("abc123def456").unwrap();
    }

    #[test]
    fn get_nonexistent_fails() {
        let (_dir, store) = test_status_store();
        assert!(matches!(
            store.get("nonexistent"),
            Err(StoreError::EnvNotFound(_))
        ));
    }

    #[test]
    fn run_state_display() {
        assert_eq!(RunState::NotStarted.to_string(), "not started");
        assert_eq!(RunState::Resolving.to_string(), "resolving");
        assert_eq!(RunState::Fetching.to_string(), "fetching");
        assert_eq!(RunState::Provisioning.to_string(), "provisioning");
        assert_eq!(RunState::Ready.to_string(), "ready");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Ready.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::NotStarted.is_terminal());
        assert!(!RunState::Fetching.is_terminal());
    }

    #[test]
    fn artifacts_roundtrip() {
        let (_dir, store) = test_status_store();
        let mut record = sample_record();
        record.artifacts = vec![Checksum::new("a".repeat(64)), Checksum::new("b".repeat(64))];
        store.put(&record).unwrap();
        let retrieved = store.get(&record.env_id).unwrap();
        assert_eq!(retrieved.artifacts.len(), 2);
    }
}
