//! Workflow depth limiter.
//!
//! Every task carries (depth, ordered task chain, origin). Delegation
//! increments the depth and appends the new task id; the maximum admissible
//! depth is a compile-time constant. This bounds cascading delegation:
//! a runaway agent loop dies at the depth limit instead of fanning out.

use ha2ha_core::constants::MAX_WORKFLOW_DEPTH;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{TaskId, WorkflowMeta};

/// Structural validation of delegation metadata.
///
/// Rejects depth 0, a chain longer than the depth claims, and a chain whose
/// head is not the origin task.
pub fn validate_meta(meta: &WorkflowMeta) -> Result<(), Ha2haError> {
    if meta.depth == 0 {
        return Err(Ha2haError::InvalidWorkflowMeta(
            "depth must be at least 1".into(),
        ));
    }
    if meta.chain.len() > meta.depth as usize {
        return Err(Ha2haError::InvalidWorkflowMeta(format!(
            "chain of {} tasks is longer than depth {}",
            meta.chain.len(),
            meta.depth
        )));
    }
    if meta.chain.first() != Some(&meta.origin) {
        return Err(Ha2haError::InvalidWorkflowMeta(
            "chain must start at the origin task".into(),
        ));
    }
    Ok(())
}

/// Fail a task whose own depth already exceeds the maximum.
/// A task at exactly the maximum is still admissible.
pub fn check_depth(meta: &WorkflowMeta) -> Result<(), Ha2haError> {
    validate_meta(meta)?;
    if meta.depth > MAX_WORKFLOW_DEPTH {
        return Err(Ha2haError::WorkflowDepthExceeded {
            max: MAX_WORKFLOW_DEPTH,
            got: meta.depth,
        });
    }
    Ok(())
}

/// Whether the task may delegate one step further.
pub fn can_delegate(meta: &WorkflowMeta) -> bool {
    validate_meta(meta).is_ok() && meta.depth < MAX_WORKFLOW_DEPTH
}

/// Delegation step: one level deeper, the new task appended to the chain.
pub fn delegate(meta: &WorkflowMeta, new_task: TaskId) -> Result<WorkflowMeta, Ha2haError> {
    validate_meta(meta)?;
    if !can_delegate(meta) {
        return Err(Ha2haError::WorkflowDepthExceeded {
            max: MAX_WORKFLOW_DEPTH,
            got: meta.depth + 1,
        });
    }
    let mut chain = meta.chain.clone();
    chain.push(new_task);
    Ok(WorkflowMeta {
        depth: meta.depth + 1,
        chain,
        origin: meta.origin.clone(),
    })
}
