pub mod config;
pub mod node;

pub use config::{FederationConfig, Ha2haConfig, KnownAgent};
pub use node::{expand_tilde, Node, NodeOptions};
