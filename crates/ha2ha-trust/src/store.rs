//! Durable trust storage: a single versioned JSON document with a one-shot
//! backup. Saves write a temporary sibling and rename it into place, so a
//! crash can lose the latest mutation but never leaves the file partially
//! written. Loads fall back to the backup when the primary is corrupt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::AgentId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entry::TrustEntry;

const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    agents: HashMap<AgentId, TrustEntry>,
}

pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".backup");
        PathBuf::from(os)
    }

    fn temp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".tmp");
        PathBuf::from(os)
    }

    /// Load all entries. A missing file is an empty registry; a corrupted
    /// primary falls back to the backup.
    pub fn load(&self) -> Result<HashMap<AgentId, TrustEntry>, Ha2haError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        match Self::read_file(&self.path) {
            Ok(agents) => Ok(agents),
            Err(primary_err) => {
                warn!(
                    path = %self.path.display(),
                    "trust store corrupted ({primary_err}); trying backup"
                );
                let backup = self.backup_path();
                if backup.exists() {
                    Self::read_file(&backup)
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    fn read_file(path: &Path) -> Result<HashMap<AgentId, TrustEntry>, Ha2haError> {
        let raw = std::fs::read_to_string(path).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        let file: StoreFile =
            serde_json::from_str(&raw).map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        if file.version != SCHEMA_VERSION {
            warn!(
                version = file.version,
                "unknown trust store schema version; loading best-effort"
            );
        }
        Ok(file.agents)
    }

    /// Atomic rewrite: back up the current file, write a temporary sibling,
    /// rename into place.
    pub fn save(&self, agents: &HashMap<AgentId, TrustEntry>) -> Result<(), Ha2haError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        }
        if self.path.exists() {
            std::fs::copy(&self.path, self.backup_path())
                .map_err(|e| Ha2haError::Storage(e.to_string()))?;
        }
        let file = StoreFile {
            version: SCHEMA_VERSION,
            agents: agents.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entries(n: usize) -> HashMap<AgentId, TrustEntry> {
        (0..n)
            .map(|i| {
                let id = AgentId::new(format!("peer-{i}"));
                (id.clone(), TrustEntry::first_contact(id, Utc::now()))
            })
            .collect()
    }

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("agents.json"));
        let agents = entries(3);
        store.save(&agents).unwrap();
        assert_eq!(store.load().unwrap(), agents);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("agents.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupted_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("agents.json"));
        let first = entries(2);
        store.save(&first).unwrap();
        // Second save creates the backup of the first generation.
        let second = entries(3);
        store.save(&second).unwrap();

        std::fs::write(store.path(), "{ corrupted").unwrap();
        assert_eq!(store.load().unwrap(), first);
    }

    #[test]
    fn corrupted_primary_without_backup_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("agents.json"));
        std::fs::write(store.path(), "{ corrupted").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(dir.path().join("agents.json"));
        store.save(&entries(1)).unwrap();
        assert!(!dir.path().join("agents.json.tmp").exists());
    }
}
