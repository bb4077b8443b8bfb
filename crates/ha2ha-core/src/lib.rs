pub mod canonical;
pub mod card;
pub mod constants;
pub mod error;
pub mod types;

pub use canonical::{payload_hash, sha256_hex, to_canonical_json};
pub use card::{AgentCard, CardExtension, Ha2haParams, SignedSubset};
pub use constants::*;
pub use error::Ha2haError;
pub use types::*;
