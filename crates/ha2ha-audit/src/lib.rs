pub mod chain;
pub mod entry;
pub mod query;
pub mod sink;

pub use chain::{AuditChain, ChainVerification, VerifyErrorKind};
pub use entry::{AuditEntry, AuditEventType, AuditInput, AuditOutcome};
pub use query::AuditQuery;
pub use sink::{AuditSink, NullAuditSink};
