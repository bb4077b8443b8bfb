//! The approval validator.
//!
//! An approval succeeds only if every check below passes, in order. The
//! checks return the closed lifecycle error taxonomy; success is never
//! signalled by anything but `Ok`.

use chrono::{DateTime, Utc};
use ha2ha_core::error::Ha2haError;
use ha2ha_identity::verify_approval;

use crate::approval::{ApprovalRecord, ApprovalScope};
use crate::task::{PendingTask, TaskState};

/// How strictly approval signatures are enforced.
#[derive(Clone, Debug, Default)]
pub struct SignaturePolicy {
    /// When on, every approval must carry a signature that verifies under
    /// the approver's public key.
    pub enforce: bool,
    /// The approver's hex public key, resolved by the host.
    pub approver_key: Option<String>,
}

impl SignaturePolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn require(approver_key: impl Into<String>) -> Self {
        Self {
            enforce: true,
            approver_key: Some(approver_key.into()),
        }
    }
}

fn hash_prefix(hash: &str) -> String {
    hash.chars().take(12).collect()
}

/// Validate `approval` against `task` at time `now`.
///
/// Check order: task state (already rejected / already approved), task
/// expiry, task-id binding, payload-hash commitment, scope support,
/// approval expiry (SIMILAR, strict at the expiry instant), signature.
pub fn validate_approval(
    task: &PendingTask,
    approval: &ApprovalRecord,
    policy: &SignaturePolicy,
    now: DateTime<Utc>,
) -> Result<(), Ha2haError> {
    match task.state {
        TaskState::Submitted => {}
        TaskState::Canceled => {
            // A task canceled by the timeout sweep reports the timeout, not
            // a human rejection.
            if task.cancel_reason == Some(crate::task::CancelReason::Timeout) {
                return Err(Ha2haError::TaskTimeout {
                    expired_at: task.expires_at,
                });
            }
            return Err(Ha2haError::TaskAlreadyRejected);
        }
        state => {
            return Err(Ha2haError::TaskAlreadyApproved {
                state: state.name().into(),
            })
        }
    }

    if task.is_expired(now) {
        return Err(Ha2haError::TaskTimeout {
            expired_at: task.expires_at,
        });
    }

    // SINGLE binds one (task id, hash) pair exactly. A SIMILAR approval may
    // be replayed against additional tasks, but only ever with an equal
    // hash (enforced next).
    if approval.task_id != task.id && approval.scope != ApprovalScope::Similar {
        return Err(Ha2haError::TaskNotFound(approval.task_id.to_string()));
    }

    if approval.payload_hash != task.payload_hash {
        return Err(Ha2haError::HashMismatch {
            expected: hash_prefix(&task.payload_hash),
            got: hash_prefix(&approval.payload_hash),
        });
    }

    match approval.scope {
        ApprovalScope::Category => return Err(Ha2haError::CategoryScopeUnsupported),
        ApprovalScope::Similar => {
            let expiry = approval
                .effective_expiry()
                .expect("SIMILAR scope always has an effective expiry");
            if now >= expiry {
                return Err(Ha2haError::ApprovalExpired { expired_at: expiry });
            }
        }
        ApprovalScope::Single => {}
    }

    if policy.enforce {
        let signature = approval
            .signature
            .as_deref()
            .ok_or(Ha2haError::SignatureInvalid)?;
        let key = policy
            .approver_key
            .as_deref()
            .ok_or_else(|| Ha2haError::ApproverNotQualified(approval.approver.clone()))?;
        verify_approval(
            key,
            approval.task_id.as_str(),
            &approval.payload_hash,
            approval.scope.name(),
            signature,
        )?;
    }

    Ok(())
}
