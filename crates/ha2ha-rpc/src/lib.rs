pub mod error;
pub mod headers;
pub mod server;
pub mod types;

pub use error::{map_error, ApiError, ErrorBody};
pub use headers::validate_headers;
pub use server::{EnforcementMode, RpcConfig, RpcServer, RpcState, ServerHandle};
