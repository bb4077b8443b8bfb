use chrono::{DateTime, Utc};
use ha2ha_core::types::{AgentId, TaskId, TrustLevel, WorkflowMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task lifecycle states.
///
/// ```text
/// SUBMITTED ──approve──► WORKING ──complete──► COMPLETED
///     │                      │
///     ├──reject──► CANCELED   └──fail──────► FAILED
///     └──timeout─► CANCELED
/// ```
///
/// There is no path from SUBMITTED directly to COMPLETED.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Working => "WORKING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Legal transitions of the state machine.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Working)
                | (Self::Submitted, Self::Canceled)
                | (Self::Working, Self::Completed)
                | (Self::Working, Self::Failed)
        )
    }

    /// Whether this is an end state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a task ended up CANCELED.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    Timeout,
    Rejected,
}

/// A task awaiting (or past) human approval.
///
/// `payload_hash` is bound to the payload at creation and never changes;
/// every approval must commit to exactly this hash.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub id: TaskId,
    pub source: AgentId,
    pub target: AgentId,
    pub payload: Value,
    pub payload_hash: String,
    pub state: TaskState,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub trust_at_submission: TrustLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub workflow: WorkflowMeta,
    /// Set when the task reaches CANCELED; distinguishes a timeout from an
    /// explicit rejection in later error reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
}

impl PendingTask {
    /// Whether the approval window has passed at `now` (the expiry instant
    /// itself is already expired).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_cannot_jump_to_completed() {
        assert!(!TaskState::Submitted.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Submitted.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn legal_paths_are_exactly_the_four() {
        let states = [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
        ];
        let mut legal = 0;
        for from in states {
            for to in states {
                if from.can_transition_to(to) {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 4);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [TaskState::Completed, TaskState::Failed, TaskState::Canceled] {
            assert!(terminal.is_terminal());
            for to in [TaskState::Submitted, TaskState::Working, TaskState::Completed] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }
}
