use chrono::{DateTime, Utc};
use ha2ha_core::canonical::payload_hash;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TaskId, TrustLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed set of auditable events.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    TaskSubmitted,
    TaskApproved,
    TaskRejected,
    TaskCompleted,
    TaskFailed,
    TaskTimeout,
    TaskEscalated,
    TrustElevated,
    TrustReduced,
    TrustBlocked,
    TrustUnblocked,
    TrustViolation,
    SecurityAlert,
    SecurityCircuitOpen,
    SecurityCircuitReset,
    ChainGenesis,
    ChainTamperDetected,
}

impl AuditEventType {
    /// Events surfaced by the security-subset query.
    pub fn is_security(self) -> bool {
        matches!(
            self,
            Self::SecurityAlert
                | Self::SecurityCircuitOpen
                | Self::SecurityCircuitReset
                | Self::TrustViolation
                | Self::ChainTamperDetected
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Error,
    Pending,
}

/// One hash-linked audit record.
///
/// `hash` is the SHA-256 of the canonical form of every other field;
/// `prev_hash` links to the preceding entry (null only on the genesis
/// entry). Unknown fields found in stored records are preserved verbatim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub entry_id: Uuid,
    pub event_type: AuditEventType,
    pub source: AgentId,
    pub target: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_id: Option<String>,
    pub trust_level: TrustLevel,
    pub outcome: AuditOutcome,
    #[serde(default)]
    pub detail: Value,
    pub prev_hash: Option<String>,
    pub hash: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AuditEntry {
    /// Recompute this entry's hash over every field except `hash` itself.
    pub fn compute_hash(&self) -> Result<String, Ha2haError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| Ha2haError::Serialization(e.to_string()))?;
        value
            .as_object_mut()
            .expect("audit entry serializes to an object")
            .remove("hash");
        payload_hash(&value)
    }
}

/// Caller-supplied fields of a new audit record. The chain fills in the
/// ordering, linking, and hash fields.
#[derive(Clone, Debug)]
pub struct AuditInput {
    pub event_type: AuditEventType,
    pub source: AgentId,
    pub target: AgentId,
    pub task_id: Option<TaskId>,
    pub human_id: Option<String>,
    pub trust_level: TrustLevel,
    pub outcome: AuditOutcome,
    pub detail: Value,
}

impl AuditInput {
    pub fn new(
        event_type: AuditEventType,
        source: AgentId,
        target: AgentId,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_type,
            source,
            target,
            task_id: None,
            human_id: None,
            trust_level: TrustLevel::Unknown,
            outcome,
            detail: Value::Null,
        }
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn human(mut self, human_id: impl Into<String>) -> Self {
        self.human_id = Some(human_id.into());
        self
    }

    pub fn trust(mut self, level: TrustLevel) -> Self {
        self.trust_level = level;
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> AuditEntry {
        AuditEntry {
            seq: 3,
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            entry_id: Uuid::new_v4(),
            event_type: AuditEventType::TaskSubmitted,
            source: AgentId::new("partner.external"),
            target: AgentId::new("local"),
            task_id: Some(TaskId::new("t-1")),
            human_id: None,
            trust_level: TrustLevel::Unknown,
            outcome: AuditOutcome::Pending,
            detail: json!({"action": "fetch_weather"}),
            prev_hash: Some("ff".repeat(32)),
            hash: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn hash_excludes_the_hash_field() {
        let mut e = entry();
        let h1 = e.compute_hash().unwrap();
        e.hash = "00".repeat(32);
        assert_eq!(e.compute_hash().unwrap(), h1);
    }

    #[test]
    fn hash_covers_every_other_field() {
        let e = entry();
        let base = e.compute_hash().unwrap();

        let mut t = e.clone();
        t.trust_level = TrustLevel::Standard;
        assert_ne!(t.compute_hash().unwrap(), base);

        let mut t = e.clone();
        t.prev_hash = None;
        assert_ne!(t.compute_hash().unwrap(), base);

        let mut t = e.clone();
        t.detail = json!({"action": "transfer_funds"});
        assert_ne!(t.compute_hash().unwrap(), base);
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let mut raw = serde_json::to_value(entry()).unwrap();
        raw["vendorExtension"] = json!({"k": 1});
        let parsed: AuditEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(parsed.extra.get("vendorExtension"), Some(&json!({"k": 1})));
        let rewritten = serde_json::to_value(&parsed).unwrap();
        assert_eq!(rewritten["vendorExtension"], json!({"k": 1}));
    }

    #[test]
    fn wire_names_are_camel_case() {
        let v = serde_json::to_value(entry()).unwrap();
        assert!(v.get("eventType").is_some());
        assert!(v.get("prevHash").is_some());
        assert!(v.get("trustLevel").is_some());
        assert_eq!(v["eventType"], json!("TASK_SUBMITTED"));
        assert_eq!(v["outcome"], json!("pending"));
    }
}
