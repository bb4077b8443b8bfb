use tracing::warn;

use crate::chain::AuditChain;
use crate::entry::AuditInput;

/// Narrow port through which the other components record audit events.
///
/// Recording is fire-and-forget: a failed append is logged and never
/// retro-invalidates the caller's primary outcome.
pub trait AuditSink: Send + Sync {
    fn record(&self, input: AuditInput);
}

impl AuditSink for AuditChain {
    fn record(&self, input: AuditInput) {
        if let Err(e) = self.append(input) {
            warn!("audit append failed: {e}");
        }
    }
}

/// Sink that drops every event. Used by hosts that run without an audit
/// chain and by tests.
#[derive(Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _input: AuditInput) {}
}
