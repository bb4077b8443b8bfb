pub mod approval;
pub mod events;
pub mod queue;
pub mod store;
pub mod task;
pub mod validate;

pub use approval::{
    ApprovalConditions, ApprovalRecord, ApprovalScope, RejectionRecord, TrustAction,
};
pub use events::{LifecycleEvent, LifecycleObserver, ObserverHandle, ObserverSet};
pub use queue::{ApprovalQueue, SubmitRequest};
pub use store::TaskStore;
pub use task::{CancelReason, PendingTask, TaskState};
pub use validate::{validate_approval, SignaturePolicy};
