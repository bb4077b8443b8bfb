use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use ha2ha_audit::{AuditEventType, AuditInput, AuditOutcome, AuditSink};
use ha2ha_core::canonical::payload_hash;
use ha2ha_core::constants::DEFAULT_TASK_TIMEOUT_SECS;
use ha2ha_core::error::Ha2haError;
use ha2ha_core::types::{AgentId, TaskId, TrustLevel, WorkflowMeta};
use ha2ha_trust::{TrustSink, ViolationSeverity};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::approval::{ApprovalRecord, RejectionRecord, TrustAction};
use crate::events::{LifecycleEvent, LifecycleObserver, ObserverHandle, ObserverSet};
use crate::store::TaskStore;
use crate::task::{PendingTask, TaskState};
use crate::validate::{validate_approval, SignaturePolicy};

/// A peer-initiated task entering the queue.
#[derive(Clone, Debug)]
pub struct SubmitRequest {
    /// Peer-supplied id; a fresh UUID is generated when absent.
    pub task_id: Option<TaskId>,
    pub source: AgentId,
    pub target: AgentId,
    pub payload: Value,
    pub description: Option<String>,
    /// Override of the default 1-hour approval window.
    pub timeout_secs: Option<i64>,
    /// Trust level snapshot taken by the caller at authorization time.
    pub trust_at_submission: TrustLevel,
    pub workflow: Option<WorkflowMeta>,
}

/// The approval queue: the single owner of task state.
///
/// Per-task updates serialize under the queue mutex; listings are snapshots.
/// A task leaves SUBMITTED only via one successful approval, a rejection,
/// or a timeout.
pub struct ApprovalQueue {
    agent_id: AgentId,
    tasks: Mutex<HashMap<TaskId, PendingTask>>,
    store: Option<TaskStore>,
    audit: Arc<dyn AuditSink>,
    trust: Option<Arc<dyn TrustSink>>,
    observers: ObserverSet,
    default_timeout: Duration,
}

impl ApprovalQueue {
    pub fn new(agent_id: AgentId, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            agent_id,
            tasks: Mutex::new(HashMap::new()),
            store: None,
            audit,
            trust: None,
            observers: ObserverSet::new(),
            default_timeout: Duration::seconds(DEFAULT_TASK_TIMEOUT_SECS),
        }
    }

    /// Attach durable task storage, restoring any persisted records.
    pub fn with_store(mut self, store: TaskStore) -> Result<Self, Ha2haError> {
        let restored = store.load_all()?;
        info!(tasks = restored.len(), "approval queue restored");
        let mut tasks = HashMap::with_capacity(restored.len());
        for task in restored {
            tasks.insert(task.id.clone(), task);
        }
        self.tasks = Mutex::new(tasks);
        self.store = Some(store);
        Ok(self)
    }

    /// Route rejection trust actions and detected violations into the
    /// trust registry.
    pub fn with_trust(mut self, trust: Arc<dyn TrustSink>) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Subscribe to lifecycle events. Dropping the handle unsubscribes.
    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> ObserverHandle {
        self.observers.subscribe(observer)
    }

    fn persist(&self, task: &PendingTask, tasks: &HashMap<TaskId, PendingTask>) {
        if let Some(store) = &self.store {
            let ids: Vec<TaskId> = tasks.keys().cloned().collect();
            if let Err(e) = store.save(task, &ids) {
                warn!(task_id = %task.id, "task persist failed: {e}");
            }
        }
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Enqueue a task in SUBMITTED with its payload hash bound.
    ///
    /// Canonicalization failure rejects the request before any state
    /// mutation.
    pub fn submit(
        &self,
        request: SubmitRequest,
        now: DateTime<Utc>,
    ) -> Result<PendingTask, Ha2haError> {
        let hash = payload_hash(&request.payload)?;
        let task_id = request.task_id.unwrap_or_else(TaskId::generate);
        let timeout = request
            .timeout_secs
            .map(Duration::seconds)
            .unwrap_or(self.default_timeout);
        let task = PendingTask {
            id: task_id.clone(),
            source: request.source,
            target: request.target,
            payload: request.payload,
            payload_hash: hash,
            state: TaskState::Submitted,
            received_at: now,
            expires_at: now + timeout,
            trust_at_submission: request.trust_at_submission,
            description: request.description,
            workflow: request
                .workflow
                .unwrap_or_else(|| WorkflowMeta::root(task_id.clone())),
            cancel_reason: None,
        };

        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.id) {
            // Same request id replayed: idempotent, no second record.
            return Ok(tasks[&task.id].clone());
        }
        tasks.insert(task.id.clone(), task.clone());
        self.persist(&task, &tasks);
        drop(tasks);

        info!(task_id = %task.id, source = %task.source, "task submitted");
        self.audit.record(
            AuditInput::new(
                AuditEventType::TaskSubmitted,
                task.source.clone(),
                task.target.clone(),
                AuditOutcome::Pending,
            )
            .task(task.id.clone())
            .trust(task.trust_at_submission)
            .detail(json!({
                "payloadHash": task.payload_hash,
                "expiresAt": task.expires_at,
                "depth": task.workflow.depth,
            })),
        );
        self.observers.emit(&LifecycleEvent::Submitted(task.clone()));
        Ok(task)
    }

    // ── Approval ─────────────────────────────────────────────────────────────

    /// Validate `approval` against the task it names and move that task to
    /// WORKING.
    ///
    /// A duplicate approval of the same task observes
    /// `TASK_ALREADY_APPROVED` and has no effect.
    pub fn approve(
        &self,
        approval: &ApprovalRecord,
        policy: &SignaturePolicy,
        now: DateTime<Utc>,
    ) -> Result<PendingTask, Ha2haError> {
        let task_id = approval.task_id.clone();
        self.approve_task(&task_id, approval, policy, now)
    }

    /// Apply `approval` to `task_id`. The ids may differ only for a
    /// SIMILAR-scope approval replayed against an equal-hash task.
    pub fn approve_task(
        &self,
        task_id: &TaskId,
        approval: &ApprovalRecord,
        policy: &SignaturePolicy,
        now: DateTime<Utc>,
    ) -> Result<PendingTask, Ha2haError> {
        self.sweep_timeouts(now);

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Ha2haError::TaskNotFound(task_id.to_string()))?;

        if let Err(e) = validate_approval(task, approval, policy, now) {
            let snapshot = task.clone();
            drop(tasks);
            self.on_approval_failure(&snapshot, approval, &e);
            return Err(e);
        }

        task.state = TaskState::Working;
        let snapshot = task.clone();
        self.persist(&snapshot, &tasks);
        drop(tasks);

        info!(task_id = %snapshot.id, approver = %approval.approver, "task approved");
        self.audit.record(
            AuditInput::new(
                AuditEventType::TaskApproved,
                snapshot.source.clone(),
                snapshot.target.clone(),
                AuditOutcome::Success,
            )
            .task(snapshot.id.clone())
            .human(approval.approver.clone())
            .trust(snapshot.trust_at_submission)
            .detail(json!({
                "scope": approval.scope,
                "payloadHash": approval.payload_hash,
            })),
        );
        self.observers.emit(&LifecycleEvent::Approved {
            task: snapshot.clone(),
            approver: approval.approver.clone(),
        });
        Ok(snapshot)
    }

    /// A failed hash commitment is a violation, not a benign error: it flows
    /// back into audit and trust.
    fn on_approval_failure(
        &self,
        task: &PendingTask,
        approval: &ApprovalRecord,
        error: &Ha2haError,
    ) {
        if let Ha2haError::HashMismatch { expected, got } = error {
            warn!(task_id = %task.id, "approval hash mismatch; possible payload tampering");
            self.audit.record(
                AuditInput::new(
                    AuditEventType::SecurityAlert,
                    task.source.clone(),
                    task.target.clone(),
                    AuditOutcome::Rejected,
                )
                .task(task.id.clone())
                .human(approval.approver.clone())
                .trust(task.trust_at_submission)
                .detail(json!({
                    "kind": "HASH_MISMATCH",
                    "expectedPrefix": expected,
                    "gotPrefix": got,
                })),
            );
            if let Some(trust) = &self.trust {
                trust.record_violation(
                    &task.source,
                    ViolationSeverity::Medium,
                    "approval payload hash mismatch",
                );
            }
        }
    }

    // ── Rejection ────────────────────────────────────────────────────────────

    /// Refuse a SUBMITTED task, moving it to CANCELED, and route the
    /// requested trust action.
    pub fn reject(
        &self,
        rejection: &RejectionRecord,
        now: DateTime<Utc>,
    ) -> Result<PendingTask, Ha2haError> {
        self.sweep_timeouts(now);

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&rejection.task_id)
            .ok_or_else(|| Ha2haError::TaskNotFound(rejection.task_id.to_string()))?;
        match task.state {
            TaskState::Submitted => {}
            TaskState::Canceled => {
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

        task.state = TaskState::Canceled;
        task.cancel_reason = Some(crate::task::CancelReason::Rejected);
        let snapshot = task.clone();
        self.persist(&snapshot, &tasks);
        drop(tasks);

        info!(task_id = %snapshot.id, rejector = %rejection.rejector, "task rejected");
        self.audit.record(
            AuditInput::new(
                AuditEventType::TaskRejected,
                snapshot.source.clone(),
                snapshot.target.clone(),
                AuditOutcome::Rejected,
            )
            .task(snapshot.id.clone())
            .human(rejection.rejector.clone())
            .trust(snapshot.trust_at_submission)
            .detail(json!({
                "reason": rejection.reason,
                "trustAction": rejection.trust_action,
            })),
        );

        if let Some(trust) = &self.trust {
            match rejection.trust_action {
                TrustAction::None => {}
                TrustAction::Reduce => trust.record_violation(
                    &snapshot.source,
                    ViolationSeverity::Medium,
                    &format!("task rejected: {}", rejection.reason),
                ),
                TrustAction::Block => {
                    trust.block_peer(&snapshot.source, &rejection.reason, &rejection.rejector)
                }
            }
        }

        self.observers.emit(&LifecycleEvent::Rejected {
            task: snapshot.clone(),
            rejector: rejection.rejector.clone(),
            reason: rejection.reason.clone(),
        });
        Ok(snapshot)
    }

    // ── Execution ────────────────────────────────────────────────────────────

    /// Run the opaque executor for a WORKING task. `Ok` completes the task;
    /// `Err` fails it. The executor runs outside the queue lock.
    pub fn execute<F>(
        &self,
        task_id: &TaskId,
        executor: F,
    ) -> Result<Value, Ha2haError>
    where
        F: FnOnce(&PendingTask) -> Result<Value, String>,
    {
        let task = {
            let tasks = self.tasks.lock().unwrap();
            let task = tasks
                .get(task_id)
                .ok_or_else(|| Ha2haError::TaskNotFound(task_id.to_string()))?;
            if task.state != TaskState::Working {
                return Err(Ha2haError::InvalidStateTransition {
                    from: task.state.name().into(),
                    to: TaskState::Completed.name().into(),
                });
            }
            task.clone()
        };

        let outcome = executor(&task);

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Ha2haError::TaskNotFound(task_id.to_string()))?;

        match outcome {
            Ok(result) => {
                task.state = TaskState::Completed;
                let snapshot = task.clone();
                self.persist(&snapshot, &tasks);
                drop(tasks);

                info!(task_id = %task_id, "task completed");
                self.audit.record(
                    AuditInput::new(
                        AuditEventType::TaskCompleted,
                        snapshot.source.clone(),
                        snapshot.target.clone(),
                        AuditOutcome::Success,
                    )
                    .task(snapshot.id.clone())
                    .trust(snapshot.trust_at_submission)
                    .detail(json!({"payloadHash": snapshot.payload_hash})),
                );
                self.observers.emit(&LifecycleEvent::Completed(snapshot));
                Ok(result)
            }
            Err(error) => {
                task.state = TaskState::Failed;
                let snapshot = task.clone();
                self.persist(&snapshot, &tasks);
                drop(tasks);

                warn!(task_id = %task_id, error, "task failed");
                self.audit.record(
                    AuditInput::new(
                        AuditEventType::TaskFailed,
                        snapshot.source.clone(),
                        snapshot.target.clone(),
                        AuditOutcome::Error,
                    )
                    .task(snapshot.id.clone())
                    .trust(snapshot.trust_at_submission)
                    .detail(json!({"error": error})),
                );
                self.observers.emit(&LifecycleEvent::Failed {
                    task: snapshot,
                    error: error.clone(),
                });
                Err(Ha2haError::ExecutionFailed(error))
            }
        }
    }

    // ── Timeouts ─────────────────────────────────────────────────────────────

    /// Move every SUBMITTED task past its expiry to CANCELED. Runs lazily on
    /// every approve/reject and periodically from the host's sweeper.
    pub fn sweep_timeouts(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut expired = Vec::new();
        let mut tasks = self.tasks.lock().unwrap();
        let snapshot_ids: Vec<TaskId> = tasks.keys().cloned().collect();
        let mut swept = Vec::new();
        for task in tasks.values_mut() {
            if task.state == TaskState::Submitted && task.is_expired(now) {
                task.state = TaskState::Canceled;
                task.cancel_reason = Some(crate::task::CancelReason::Timeout);
                expired.push(task.id.clone());
                swept.push(task.clone());
            }
        }
        if let Some(store) = &self.store {
            for task in &swept {
                if let Err(e) = store.save(task, &snapshot_ids) {
                    warn!(task_id = %task.id, "task persist failed: {e}");
                }
            }
        }
        drop(tasks);

        for task in swept {
            info!(task_id = %task.id, "task timed out");
            self.audit.record(
                AuditInput::new(
                    AuditEventType::TaskTimeout,
                    task.source.clone(),
                    task.target.clone(),
                    AuditOutcome::Rejected,
                )
                .task(task.id.clone())
                .trust(task.trust_at_submission)
                .detail(json!({"expiredAt": task.expires_at})),
            );
            self.observers.emit(&LifecycleEvent::TimedOut(task));
        }
        expired
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get(&self, task_id: &TaskId) -> Option<PendingTask> {
        self.tasks.lock().unwrap().get(task_id).cloned()
    }

    /// Snapshot of every task, oldest first.
    pub fn list(&self) -> Vec<PendingTask> {
        let mut tasks: Vec<PendingTask> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        tasks
    }

    /// Snapshot of tasks still awaiting approval, oldest first.
    pub fn pending(&self) -> Vec<PendingTask> {
        self.list()
            .into_iter()
            .filter(|t| t.state == TaskState::Submitted)
            .collect()
    }

    pub fn local_agent(&self) -> &AgentId {
        &self.agent_id
    }
}
