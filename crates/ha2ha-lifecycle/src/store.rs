//! Durable task records: one JSON file per task plus an index of known ids.
//!
//! Writes are idempotent (same record, same file). Reads survive a missing
//! or stale index by falling back to a directory scan.

use std::path::{Path, PathBuf};

use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::TaskId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::task::PendingTask;

const INDEX_FILE: &str = "index.json";

#[derive(Serialize, Deserialize, Default)]
struct TaskIndex {
    tasks: Vec<TaskId>,
}

pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Task ids can be peer-supplied; keep them out of path syntax.
    fn file_name(task_id: &TaskId) -> String {
        let safe: String = task_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{safe}.json")
    }

    fn task_path(&self, task_id: &TaskId) -> PathBuf {
        self.dir.join(Self::file_name(task_id))
    }

    /// Persist one task record and refresh the index.
    pub fn save(&self, task: &PendingTask, all_ids: &[TaskId]) -> Result<(), Ha2haError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        let json = serde_json::to_string_pretty(task)
            .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        std::fs::write(self.task_path(&task.id), json)
            .map_err(|e| Ha2haError::Storage(e.to_string()))?;

        let index = TaskIndex {
            tasks: all_ids.to_vec(),
        };
        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        std::fs::write(self.dir.join(INDEX_FILE), json)
            .map_err(|e| Ha2haError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load every stored task. The index is consulted first; when it is
    /// missing or unreadable, the directory is scanned instead.
    pub fn load_all(&self) -> Result<Vec<PendingTask>, Ha2haError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let ids = self.read_index();
        match ids {
            Some(ids) => {
                let mut tasks = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.read_task_file(&self.task_path(&id)) {
                        Ok(task) => tasks.push(task),
                        Err(e) => warn!(task_id = %id, "skipping unreadable task record: {e}"),
                    }
                }
                Ok(tasks)
            }
            None => self.scan_dir(),
        }
    }

    fn read_index(&self) -> Option<Vec<TaskId>> {
        let raw = std::fs::read_to_string(self.dir.join(INDEX_FILE)).ok()?;
        match serde_json::from_str::<TaskIndex>(&raw) {
            Ok(index) => Some(index.tasks),
            Err(e) => {
                warn!("task index unreadable ({e}); falling back to directory scan");
                None
            }
        }
    }

    fn scan_dir(&self) -> Result<Vec<PendingTask>, Ha2haError> {
        let mut tasks = Vec::new();
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Ha2haError::Storage(e.to_string()))?;
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if path.file_name().map(|n| n == INDEX_FILE).unwrap_or(false) {
                continue;
            }
            match self.read_task_file(&path) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(path = %path.display(), "skipping unreadable task record: {e}"),
            }
        }
        Ok(tasks)
    }

    fn read_task_file(&self, path: &Path) -> Result<PendingTask, Ha2haError> {
        let raw = std::fs::read_to_string(path).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| Ha2haError::Serialization(e.to_string()))
    }
}
