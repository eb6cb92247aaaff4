//! The transport relay: wire protocol, hub, and supervised consumer side.
//!
//! The relay carries parsed readings from the acquisition side to any
//! number of consumers over newline-framed text, with per-connection
//! error isolation on the hub side and indefinite reconnection with
//! backoff on the consumer side.

pub mod client;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use client::{BackoffPolicy, ConnectionState, ConsumerHandle};
pub use protocol::Message;
pub use server::RelayHub;
