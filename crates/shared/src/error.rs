//! Shared error types for the realtime wire codec and payload validation.

use thiserror::Error;

/// Errors raised while decoding Engine.IO / Socket.IO frames or validating
/// the payload of a known server event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{found}'")]
    UnknownPacketType { layer: &'static str, found: char },

    #[error("invalid JSON in packet: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed event packet: {0}")]
    MalformedEvent(String),

    #[error("binary packets are not supported")]
    BinaryUnsupported,

    #[error("invalid payload for '{event}': {reason}")]
    Payload { event: String, reason: String },
}

impl ProtocolError {
    pub fn payload(event: &str, reason: impl std::fmt::Display) -> Self {
        ProtocolError::Payload {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}
