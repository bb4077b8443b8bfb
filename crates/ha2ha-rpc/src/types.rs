//! Request and response bodies of the HA2HA endpoints. Task, approval, and
//! rejection records cross the wire in their canonical camelCase schemas.

use chrono::{DateTime, Utc};
use ha2ha_audit::{AuditEntry, AuditEventType, AuditOutcome};
use ha2ha_core::card::AgentCard;
use ha2ha_core::types::{AgentId, TaskId, WorkflowMeta};
use ha2ha_lifecycle::PendingTask;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /.well-known/ha2ha/v1/task`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskBody {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub payload: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
    #[serde(default)]
    pub workflow: Option<WorkflowMeta>,
    /// The submitting peer's signed card. When present its attestation is
    /// verified and extension negotiation runs before the task is queued.
    #[serde(default)]
    pub card: Option<AgentCard>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskResponse {
    pub task: PendingTask,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub task: PendingTask,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub task: PendingTask,
}

/// Body of `POST /.well-known/ha2ha/v1/escalate`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateBody {
    pub task_id: TaskId,
    pub reason: String,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateResponse {
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// Body of `POST /.well-known/ha2ha/v1/audit`: a peer notifying us of an
/// event on its side.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditNoticeBody {
    pub event_type: AuditEventType,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    pub outcome: AuditOutcome,
    #[serde(default)]
    pub detail: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditNoticeResponse {
    pub recorded: bool,
    pub seq: u64,
}

/// Query string of `GET /.well-known/ha2ha/v1/audit`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryParams {
    #[serde(default)]
    pub event_type: Option<AuditEventType>,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub source: Option<AgentId>,
    #[serde(default)]
    pub target: Option<AgentId>,
    #[serde(default)]
    pub human_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<AuditOutcome>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// `asc` (default) or `desc`.
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryResponse {
    pub entries: Vec<AuditEntry>,
    pub count: usize,
}
