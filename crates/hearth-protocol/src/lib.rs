//! Shared data shapes for Hearth
//!
//! The pending-message record persisted by the client, the documents
//! exchanged with the remote message store, and the live-feed protocol.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
