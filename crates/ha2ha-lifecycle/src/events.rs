//! Lifecycle observers.
//!
//! Hosts subscribe to task transitions (to notify a human, update a UI,
//! forward to an escalation channel). Subscriptions are backed by a vector
//! of handles; dropping a handle removes the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::task::PendingTask;

/// One task transition, as seen by observers.
#[derive(Clone, Debug)]
pub enum LifecycleEvent {
    Submitted(PendingTask),
    Approved {
        task: PendingTask,
        approver: String,
    },
    Rejected {
        task: PendingTask,
        rejector: String,
        reason: String,
    },
    Completed(PendingTask),
    Failed {
        task: PendingTask,
        error: String,
    },
    TimedOut(PendingTask),
}

pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

type Listeners = Mutex<Vec<(u64, Arc<dyn LifecycleObserver>)>>;

/// Subscriber list dispatching each event to every live listener.
#[derive(Default)]
pub struct ObserverSet {
    listeners: Arc<Listeners>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned handle owns the subscription:
    /// dropping it removes the listener.
    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, observer));
        ObserverHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn emit(&self, event: &LifecycleEvent) {
        let listeners = self.listeners.lock().unwrap();
        for (_, observer) in listeners.iter() {
            observer.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns one subscription; dropping it unsubscribes.
pub struct ObserverHandle {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ha2ha_core::types::{AgentId, TaskId, TrustLevel, WorkflowMeta};
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl LifecycleObserver for Counter {
        fn on_event(&self, _: &LifecycleEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event() -> LifecycleEvent {
        let id = TaskId::new("t");
        LifecycleEvent::Submitted(crate::task::PendingTask {
            id: id.clone(),
            source: AgentId::new("a"),
            target: AgentId::new("b"),
            payload: serde_json::Value::Null,
            payload_hash: String::new(),
            state: crate::task::TaskState::Submitted,
            received_at: Utc::now(),
            expires_at: Utc::now(),
            trust_at_submission: TrustLevel::Unknown,
            description: None,
            workflow: WorkflowMeta::root(id),
            cancel_reason: None,
        })
    }

    #[test]
    fn events_reach_every_listener() {
        let set = ObserverSet::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        let _ha = set.subscribe(a.clone());
        let _hb = set.subscribe(b.clone());
        set.emit(&event());
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let set = ObserverSet::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let handle = set.subscribe(counter.clone());
        set.emit(&event());
        drop(handle);
        set.emit(&event());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }
}
