pub mod approval;
pub mod attestation;
pub mod ed25519;
pub mod headers;
pub mod keypair;

pub use approval::{approval_message, sign_approval, verify_approval};
pub use attestation::{sign_card, verify_card};
pub use headers::RequestHeaders;
pub use keypair::AgentKeyPair;
