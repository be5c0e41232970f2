//! Transport abstraction and reconnect policy.
//!
//! This module provides the shared types and the seam the connection
//! manager opens transports through. The native tokio-tungstenite
//! implementation lives in `connection_native`.

use std::sync::Arc;

use attendly_shared::DisconnectReason;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::config::SocketConfig;

/// Connection state of the shared socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted; only a fresh `connect` leaves this state.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
    /// Jitter as a fraction of the computed delay (0.0 = none)
    pub randomization_factor: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            randomization_factor: 0.5,
        }
    }
}

impl ReconnectConfig {
    /// Un-jittered delay for a given 0-based attempt number
    pub fn base_delay_for_attempt(&self, attempt: u32) -> u32 {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(exponent);
        if !delay.is_finite() {
            return self.max_delay_ms;
        }
        (delay as u32).min(self.max_delay_ms)
    }

    /// Delay for a given 0-based attempt number, with jitter applied
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let base = self.base_delay_for_attempt(attempt);
        let factor = self.randomization_factor.clamp(0.0, 1.0);
        if factor == 0.0 || base == 0 {
            return base;
        }
        let deviation = (base as f32 * factor) as i64;
        let offset = rand::thread_rng().gen_range(-deviation..=deviation);
        (base as i64 + offset).clamp(0, self.max_delay_ms as i64) as u32
    }

    /// Whether another attempt is allowed after `attempts_made` failures
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.max_attempts == 0 || attempts_made < self.max_attempts
    }
}

/// Raw transport occurrence delivered to the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect { socket_id: String },
    Disconnect { reason: DisconnectReason },
    ConnectError { message: String },
    ReconnectAttempt { attempt: u32 },
    Reconnect { attempt: u32 },
    ReconnectFailed,
    /// A server-pushed domain event.
    Event { name: String, data: Value },
}

/// Callback a transport reports its events through.
pub type TransportSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Everything a transport needs to open a connection.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub config: SocketConfig,
    pub token: String,
}

/// Control surface of one opened transport.
pub trait TransportHandle: Send {
    /// Reconnect right away, skipping the backoff. Used after the server
    /// closed the socket on purpose, which the transport never retries on its
    /// own.
    fn reconnect(&self);

    /// Tear the transport down. No events are reported afterwards.
    fn close(&self);
}

/// Opens transports. The process-wide service uses [`NativeConnector`];
/// tests substitute a scripted one.
pub trait Connector: Send + Sync {
    fn open(&self, request: ConnectRequest, sink: TransportSink) -> Box<dyn TransportHandle>;
}

mod connection_native;
pub use connection_native::NativeConnector;
