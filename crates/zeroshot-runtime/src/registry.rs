//! The cluster registry: `clusters.json` in the storage directory.
//!
//! A map of cluster id → persisted record. Writes go through the advisory
//! file lock with bounded retry and land via temp-file-plus-rename so a
//! crashed writer never leaves a torn file. Readers tolerate a transiently
//! missing file (fresh install, mid-rename) by returning an empty map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use zeroshot_core::config::ClusterConfig;
use zeroshot_core::state::ClusterState;

use crate::error::{Result, RuntimeError};
use crate::file_lock::FileLock;

const LOCK_ATTEMPTS: u32 = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// One persisted cluster record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Cluster id.
    pub id: String,
    /// The config the cluster was started with.
    pub config: ClusterConfig,
    /// Last known lifecycle state.
    pub state: ClusterState,
    /// Creation time, epoch millis.
    pub created_at: i64,
    /// Holder process id (display only, not load-bearing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Registry over `clusters.json`.
pub struct ClusterRegistry {
    path: PathBuf,
    lock: FileLock,
}

impl ClusterRegistry {
    /// Open the registry inside `storage_dir` (created if missing).
    pub fn open(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)?;
        let path = storage_dir.join("clusters.json");
        let lock = FileLock::new(&path)?;
        Ok(Self { path, lock })
    }

    /// Insert or replace an entry.
    pub fn upsert(&self, entry: RegistryEntry) -> Result<()> {
        let _guard = self
            .lock
            .exclusive_with_retry(LOCK_ATTEMPTS, LOCK_RETRY_DELAY)?;
        let mut entries = self.read_unlocked()?;
        let _ = entries.insert(entry.id.clone(), entry);
        self.write_unlocked(&entries)
    }

    /// Update just the state of an entry. Unknown ids are a no-op.
    pub fn set_state(&self, id: &str, state: ClusterState) -> Result<()> {
        let _guard = self
            .lock
            .exclusive_with_retry(LOCK_ATTEMPTS, LOCK_RETRY_DELAY)?;
        let mut entries = self.read_unlocked()?;
        if let Some(entry) = entries.get_mut(id) {
            entry.state = state;
            self.write_unlocked(&entries)?;
        }
        Ok(())
    }

    /// Look up one entry.
    pub fn get(&self, id: &str) -> Result<Option<RegistryEntry>> {
        let _guard = self.lock.shared()?;
        Ok(self.read_unlocked()?.remove(id))
    }

    /// All entries, ordered by id.
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        let _guard = self.lock.shared()?;
        Ok(self.read_unlocked()?.into_values().collect())
    }

    fn read_unlocked(&self) -> Result<BTreeMap<String, RegistryEntry>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| RuntimeError::Registry(format!("clusters.json is unreadable: {e}")))
    }

    fn write_unlocked(&self, entries: &BTreeMap<String, RegistryEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| RuntimeError::Registry(format!("failed to serialize registry: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ClusterConfig {
        serde_json::from_value(json!({
            "agents": [{
                "id": "worker", "role": "implementation", "prompt": "p",
                "triggers": [{"topic": "ISSUE_OPENED"}]
            }]
        }))
        .unwrap()
    }

    fn entry(id: &str, state: ClusterState) -> RegistryEntry {
        RegistryEntry {
            id: id.into(),
            config: config(),
            state,
            created_at: 1_700_000_000_000,
            pid: Some(4242),
        }
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClusterRegistry::open(dir.path()).unwrap();
        assert!(registry.list().unwrap().is_empty());
        assert!(registry.get("cl_x").unwrap().is_none());
    }

    #[test]
    fn upsert_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClusterRegistry::open(dir.path()).unwrap();
        registry.upsert(entry("cl_a", ClusterState::Running)).unwrap();

        let found = registry.get("cl_a").unwrap().unwrap();
        assert_eq!(found.state, ClusterState::Running);
        assert_eq!(found.pid, Some(4242));
        assert_eq!(found.config.agents.len(), 1);
    }

    #[test]
    fn set_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClusterRegistry::open(dir.path()).unwrap();
        registry.upsert(entry("cl_a", ClusterState::Running)).unwrap();
        registry.set_state("cl_a", ClusterState::Stopped).unwrap();

        assert_eq!(
            registry.get("cl_a").unwrap().unwrap().state,
            ClusterState::Stopped
        );
    }

    #[test]
    fn set_state_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClusterRegistry::open(dir.path()).unwrap();
        registry.set_state("cl_missing", ClusterState::Failed).unwrap();
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn list_is_ordered_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = ClusterRegistry::open(dir.path()).unwrap();
            registry.upsert(entry("cl_b", ClusterState::Stopped)).unwrap();
            registry.upsert(entry("cl_a", ClusterState::Running)).unwrap();
        }

        let reopened = ClusterRegistry::open(dir.path()).unwrap();
        let entries = reopened.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "cl_a");
        assert_eq!(entries[1].id, "cl_b");
    }

    #[test]
    fn wire_form_is_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClusterRegistry::open(dir.path()).unwrap();
        registry.upsert(entry("cl_a", ClusterState::Running)).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("clusters.json")).unwrap();
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"running\""));
    }

    #[test]
    fn concurrent_upserts_do_not_lose_entries() {
        let dir = tempfile::tempdir().unwrap();
        let registry = std::sync::Arc::new(ClusterRegistry::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .upsert(entry(&format!("cl_{i}"), ClusterState::Running))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.list().unwrap().len(), 8);
    }
}
