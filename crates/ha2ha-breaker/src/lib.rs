pub mod circuit;
pub mod depth;
pub mod registry;

pub use circuit::{BreakerConfig, CircuitBreaker, CircuitState, FailureRecord, ProceedDecision};
pub use depth::{can_delegate, check_depth, delegate, validate_meta};
pub use registry::BreakerRegistry;
