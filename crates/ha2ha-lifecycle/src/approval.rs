use chrono::{DateTime, Duration, Utc};
use ha2ha_core::constants::SIMILAR_APPROVAL_EXPIRY_SECS;
use ha2ha_core::types::{TaskId, TrustLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How far an approval reaches.
///
/// SINGLE approves exactly one (task id, hash) pair. SIMILAR extends
/// validity for the expiry window against further tasks with the same hash.
/// CATEGORY is declared but not yet specified; validators reject it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalScope {
    Single,
    Similar,
    Category,
}

impl ApprovalScope {
    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Similar => "SIMILAR",
            Self::Category => "CATEGORY",
        }
    }
}

impl std::fmt::Display for ApprovalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Optional conditions attached to an approval.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// A human's signed decision to let a task run.
///
/// The record commits to the task's payload hash; the signature covers the
/// canonical message `ha2ha/approve:<task id>:<hash>:<scope>`. `created_at`
/// is authoritative; receipt time is never recorded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub task_id: TaskId,
    pub approver: String,
    pub scope: ApprovalScope,
    pub payload_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ApprovalConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// A SINGLE-scope approval of one (task id, hash) pair.
    pub fn single(
        task_id: TaskId,
        approver: impl Into<String>,
        payload_hash: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            approver: approver.into(),
            scope: ApprovalScope::Single,
            payload_hash: payload_hash.into(),
            expires_at: None,
            conditions: None,
            signature: None,
            created_at,
        }
    }

    /// A SIMILAR-scope approval; expiry defaults to 24 hours from creation.
    pub fn similar(
        task_id: TaskId,
        approver: impl Into<String>,
        payload_hash: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            task_id,
            approver: approver.into(),
            scope: ApprovalScope::Similar,
            payload_hash: payload_hash.into(),
            expires_at: Some(
                expires_at
                    .unwrap_or(created_at + Duration::seconds(SIMILAR_APPROVAL_EXPIRY_SECS)),
            ),
            conditions: None,
            signature: None,
            created_at,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_conditions(mut self, conditions: ApprovalConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// The effective expiry of a SIMILAR approval (explicit, or the default
    /// window from creation). SINGLE approvals do not expire on their own.
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        match self.scope {
            ApprovalScope::Similar => Some(self.expires_at.unwrap_or(
                self.created_at + Duration::seconds(SIMILAR_APPROVAL_EXPIRY_SECS),
            )),
            _ => None,
        }
    }
}

/// What happens to the source peer's trust after a rejection.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustAction {
    #[default]
    None,
    Reduce,
    Block,
}

/// A human's decision to refuse a task.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub task_id: TaskId,
    pub rejector: String,
    pub reason: String,
    #[serde(default)]
    pub trust_action: TrustAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<TrustLevel>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similar_defaults_to_24h_expiry() {
        let now = Utc::now();
        let a = ApprovalRecord::similar(TaskId::new("t"), "alice", "h", now, None);
        assert_eq!(a.expires_at, Some(now + Duration::hours(24)));
        assert_eq!(a.effective_expiry(), Some(now + Duration::hours(24)));
    }

    #[test]
    fn single_never_expires_on_its_own() {
        let a = ApprovalRecord::single(TaskId::new("t"), "alice", "h", Utc::now());
        assert!(a.effective_expiry().is_none());
    }

    #[test]
    fn scope_names_match_the_signed_message_form() {
        assert_eq!(ApprovalScope::Single.to_string(), "SINGLE");
        assert_eq!(ApprovalScope::Similar.to_string(), "SIMILAR");
        assert_eq!(ApprovalScope::Category.to_string(), "CATEGORY");
    }

    #[test]
    fn wire_encoding_is_camel_case() {
        let a = ApprovalRecord::single(TaskId::new("t"), "alice", "h", Utc::now());
        let v = serde_json::to_value(a).unwrap();
        assert!(v.get("taskId").is_some());
        assert!(v.get("payloadHash").is_some());
        assert!(v.get("createdAt").is_some());
    }
}
