//! Hash-linked append-only audit log.
//!
//! Storage is newline-delimited JSON, one canonical entry per line, at a
//! per-agent path. Appends serialize under a single-writer mutex: read the
//! last hash, compose the new entry, durably write one line. A chain that
//! fails verification records one final CHAIN_TAMPER_DETECTED entry and
//! refuses further appends; the rest of the core keeps running.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TrustLevel};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entry::{AuditEntry, AuditEventType, AuditInput, AuditOutcome};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorKind {
    HashMismatch,
    PrevHashMismatch,
    InvalidFormat,
}

/// Result of walking the chain in order.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<VerifyErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Up to three entries around the break.
    pub evidence: Vec<AuditEntry>,
}

impl ChainVerification {
    fn ok() -> Self {
        Self {
            valid: true,
            broken_at: None,
            error_kind: None,
            message: None,
            evidence: Vec::new(),
        }
    }

    fn broken(
        entries: &[AuditEntry],
        index: usize,
        kind: VerifyErrorKind,
        message: String,
    ) -> Self {
        let from = index.saturating_sub(1);
        let to = (index + 2).min(entries.len());
        Self {
            valid: false,
            broken_at: Some(index),
            error_kind: Some(kind),
            message: Some(message),
            evidence: entries[from..to].to_vec(),
        }
    }
}

struct ChainInner {
    entries: Vec<AuditEntry>,
    /// Index and message of a line that failed to decode, if any.
    invalid_line: Option<(usize, String)>,
    /// Set once tampering is detected; all further appends are refused.
    poisoned: bool,
}

/// The append-only, hash-linked audit log of one agent.
pub struct AuditChain {
    agent_id: AgentId,
    path: PathBuf,
    inner: Mutex<ChainInner>,
}

impl AuditChain {
    /// Open the chain at `path`, creating it (with a genesis entry) when no
    /// storage exists. With `verify_on_open`, a failed verification poisons
    /// the chain immediately.
    pub fn open(path: &Path, agent_id: AgentId, verify_on_open: bool) -> Result<Self, Ha2haError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Ha2haError::Storage(e.to_string()))?;
        }

        let mut entries = Vec::new();
        let mut invalid_line = None;
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| Ha2haError::Storage(e.to_string()))?;
            for (i, line) in raw.lines().filter(|l| !l.trim().is_empty()).enumerate() {
                match serde_json::from_str::<AuditEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        warn!(index = i, "undecodable audit line: {e}");
                        invalid_line = Some((i, e.to_string()));
                        break;
                    }
                }
            }
        }

        let chain = Self {
            agent_id: agent_id.clone(),
            path: path.to_path_buf(),
            inner: Mutex::new(ChainInner {
                entries,
                invalid_line,
                poisoned: false,
            }),
        };

        if chain.len() == 0 && chain.inner.lock().unwrap().invalid_line.is_none() {
            chain.append(AuditInput::new(
                AuditEventType::ChainGenesis,
                agent_id.clone(),
                agent_id,
                AuditOutcome::Success,
            ))?;
            info!(path = %chain.path.display(), "audit chain initialised with genesis entry");
        } else if verify_on_open {
            let report = chain.verify();
            if !report.valid {
                error!(broken_at = ?report.broken_at, "audit chain failed verification on open");
            }
        }

        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current entries, for queries and verification.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Append a new entry linked to the current chain head.
    pub fn append(&self, input: AuditInput) -> Result<AuditEntry, Ha2haError> {
        self.append_at(input, Utc::now())
    }

    /// Append with an explicit timestamp.
    pub fn append_at(
        &self,
        input: AuditInput,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, Ha2haError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.poisoned {
            return Err(Ha2haError::ChainCorrupted {
                broken_at: inner.entries.len(),
                kind: "chain poisoned after tamper detection".into(),
            });
        }
        let entry = Self::compose(&inner.entries, input, now)?;
        Self::write_line(&self.path, &entry)?;
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    fn compose(
        entries: &[AuditEntry],
        input: AuditInput,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, Ha2haError> {
        let prev_hash = entries.last().map(|e| e.hash.clone());
        let mut entry = AuditEntry {
            seq: entries.len() as u64,
            timestamp: now,
            entry_id: Uuid::new_v4(),
            event_type: input.event_type,
            source: input.source,
            target: input.target,
            task_id: input.task_id,
            human_id: input.human_id,
            trust_level: input.trust_level,
            outcome: input.outcome,
            detail: input.detail,
            prev_hash,
            hash: String::new(),
            extra: serde_json::Map::new(),
        };
        entry.hash = entry.compute_hash()?;
        Ok(entry)
    }

    fn write_line(path: &Path, entry: &AuditEntry) -> Result<(), Ha2haError> {
        let line =
            serde_json::to_string(entry).map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Ha2haError::Storage(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| Ha2haError::Storage(e.to_string()))?;
        file.sync_data().map_err(|e| Ha2haError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Walk the log in order and check every link and every hash.
    ///
    /// On the first mismatch, records one final CHAIN_TAMPER_DETECTED entry
    /// (with the evidence) and poisons the chain against further appends.
    pub fn verify(&self) -> ChainVerification {
        let mut inner = self.inner.lock().unwrap();
        let report = Self::verify_entries(&inner.entries, inner.invalid_line.as_ref());
        if !report.valid && !inner.poisoned {
            inner.poisoned = true;
            warn!(
                broken_at = ?report.broken_at,
                "audit chain tamper detected; refusing further appends"
            );
            // One final tamper record, linked to the current head. Failure to
            // write it must not mask the verification result.
            let detail = json!({
                "brokenAt": report.broken_at,
                "errorKind": report.error_kind,
                "evidence": report.evidence,
            });
            let input = AuditInput::new(
                AuditEventType::ChainTamperDetected,
                self.agent_id.clone(),
                self.agent_id.clone(),
                AuditOutcome::Error,
            )
            .trust(TrustLevel::Unknown)
            .detail(detail);
            match Self::compose(&inner.entries, input, Utc::now()) {
                Ok(entry) => {
                    if let Err(e) = Self::write_line(&self.path, &entry) {
                        error!("failed to persist tamper-detection record: {e}");
                    }
                    inner.entries.push(entry);
                }
                Err(e) => error!("failed to compose tamper-detection record: {e}"),
            }
        }
        report
    }

    fn verify_entries(
        entries: &[AuditEntry],
        invalid_line: Option<&(usize, String)>,
    ) -> ChainVerification {
        if let Some((index, message)) = invalid_line {
            return ChainVerification::broken(
                entries,
                *index,
                VerifyErrorKind::InvalidFormat,
                format!("entry {index} is not a decodable audit record: {message}"),
            );
        }

        for (i, entry) in entries.iter().enumerate() {
            if i == 0 {
                if entry.prev_hash.is_some() {
                    return ChainVerification::broken(
                        entries,
                        0,
                        VerifyErrorKind::PrevHashMismatch,
                        "genesis entry must have a null prev_hash".into(),
                    );
                }
            } else {
                let expected = &entries[i - 1].hash;
                if entry.prev_hash.as_ref() != Some(expected) {
                    return ChainVerification::broken(
                        entries,
                        i,
                        VerifyErrorKind::PrevHashMismatch,
                        format!("entry {i} does not link to its predecessor"),
                    );
                }
            }
            match entry.compute_hash() {
                Ok(recomputed) if recomputed == entry.hash => {}
                Ok(_) => {
                    return ChainVerification::broken(
                        entries,
                        i,
                        VerifyErrorKind::HashMismatch,
                        format!("entry {i} hash does not match its contents"),
                    );
                }
                Err(e) => {
                    return ChainVerification::broken(
                        entries,
                        i,
                        VerifyErrorKind::InvalidFormat,
                        format!("entry {i} cannot be canonicalized: {e}"),
                    );
                }
            }
        }
        ChainVerification::ok()
    }

    /// Test/recovery hook: replace the in-memory entries. Used by tamper
    /// tests; leaves the file untouched.
    #[doc(hidden)]
    pub fn replace_entries(&self, entries: Vec<AuditEntry>) {
        self.inner.lock().unwrap().entries = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha2ha_core::types::TaskId;

    fn input(event: AuditEventType) -> AuditInput {
        AuditInput::new(
            event,
            AgentId::new("partner.external"),
            AgentId::new("local"),
            AuditOutcome::Success,
        )
        .task(TaskId::new("t-1"))
    }

    fn open_chain(dir: &tempfile::TempDir) -> AuditChain {
        AuditChain::open(&dir.path().join("audit.ndjson"), AgentId::new("local"), false).unwrap()
    }

    #[test]
    fn fresh_chain_starts_with_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(&dir);
        let entries = chain.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, AuditEventType::ChainGenesis);
        assert!(entries[0].prev_hash.is_none());
        assert!(chain.verify().valid);
    }

    #[test]
    fn appends_link_to_the_previous_hash() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(&dir);
        chain.append(input(AuditEventType::TaskSubmitted)).unwrap();
        chain.append(input(AuditEventType::TaskApproved)).unwrap();

        let entries = chain.entries();
        assert_eq!(entries.len(), 3);
        for i in 1..entries.len() {
            assert_eq!(entries[i].prev_hash.as_ref(), Some(&entries[i - 1].hash));
            assert_eq!(entries[i].seq, i as u64);
        }
        assert!(chain.verify().valid);
    }

    #[test]
    fn chain_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.ndjson");
        {
            let chain = AuditChain::open(&path, AgentId::new("local"), false).unwrap();
            chain.append(input(AuditEventType::TaskSubmitted)).unwrap();
        }
        let reopened = AuditChain::open(&path, AgentId::new("local"), true).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.verify().valid);
    }

    #[test]
    fn mutating_an_entry_is_detected_with_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(&dir);
        for event in [
            AuditEventType::TaskSubmitted,
            AuditEventType::TaskApproved,
            AuditEventType::TaskCompleted,
        ] {
            chain.append(input(event)).unwrap();
        }

        let mut entries = chain.entries();
        entries[2].trust_level = TrustLevel::Verified;
        chain.replace_entries(entries);

        let report = chain.verify();
        assert!(!report.valid);
        assert_eq!(report.broken_at, Some(2));
        assert_eq!(report.error_kind, Some(VerifyErrorKind::HashMismatch));
        assert_eq!(report.evidence.len(), 3);
        assert_eq!(report.evidence[1].seq, 2);
    }

    #[test]
    fn broken_link_reports_prev_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(&dir);
        chain.append(input(AuditEventType::TaskSubmitted)).unwrap();
        chain.append(input(AuditEventType::TaskApproved)).unwrap();

        let mut entries = chain.entries();
        entries[2].prev_hash = Some("00".repeat(32));
        // Keep the entry self-consistent so only the link is broken.
        entries[2].hash = entries[2].compute_hash().unwrap();
        chain.replace_entries(entries);

        let report = chain.verify();
        assert_eq!(report.error_kind, Some(VerifyErrorKind::PrevHashMismatch));
        assert_eq!(report.broken_at, Some(2));
    }

    #[test]
    fn tampered_chain_refuses_further_appends() {
        let dir = tempfile::tempdir().unwrap();
        let chain = open_chain(&dir);
        chain.append(input(AuditEventType::TaskSubmitted)).unwrap();

        let mut entries = chain.entries();
        entries[1].detail = json!({"altered": true});
        chain.replace_entries(entries);
        assert!(!chain.verify().valid);

        // The final record is the tamper-detection entry; appends now fail.
        let entries = chain.entries();
        assert_eq!(
            entries.last().unwrap().event_type,
            AuditEventType::ChainTamperDetected
        );
        let result = chain.append(input(AuditEventType::TaskApproved));
        assert!(matches!(result, Err(Ha2haError::ChainCorrupted { .. })));
    }

    #[test]
    fn undecodable_line_reports_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.ndjson");
        {
            let chain = AuditChain::open(&path, AgentId::new("local"), false).unwrap();
            chain.append(input(AuditEventType::TaskSubmitted)).unwrap();
        }
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("this is not json\n");
        std::fs::write(&path, raw).unwrap();

        let chain = AuditChain::open(&path, AgentId::new("local"), false).unwrap();
        let report = chain.verify();
        assert!(!report.valid);
        assert_eq!(report.error_kind, Some(VerifyErrorKind::InvalidFormat));
        assert_eq!(report.broken_at, Some(2));
    }
}
