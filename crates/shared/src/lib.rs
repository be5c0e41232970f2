//! Shared types for the attendly realtime client: Socket.IO framing and the
//! payloads of the events the dashboard listens to.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
