pub mod entry;
pub mod registry;
pub mod store;

pub use entry::{TransitionReason, TrustContext, TrustEntry, TrustTransition, ViolationSeverity};
pub use registry::{TrustRegistry, TrustSink, TrustStats};
pub use store::TrustStore;
