//! Process-wide connection manager for the realtime socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use attendly_shared::{DisconnectReason, LifecycleEvent};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;

use super::connection::{
    ConnectRequest, ConnectionState, Connector, NativeConnector, TransportEvent, TransportHandle,
    TransportSink,
};
use super::registry::{EventRegistry, ListenerId};
use crate::config::SocketConfig;

/// Point-in-time view of the shared connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub socket_id: Option<String>,
    pub reconnect_attempts: u32,
    pub state: ConnectionState,
    pub connected_since: Option<DateTime<Utc>>,
}

struct Inner {
    transport: Option<Box<dyn TransportHandle>>,
    /// Bumped whenever a transport is opened or retired; events carrying an
    /// older value are ignored.
    generation: u64,
    state: ConnectionState,
    socket_id: Option<String>,
    reconnect_attempts: u32,
    connected_since: Option<DateTime<Utc>>,
}

impl Inner {
    fn reset(&mut self, state: ConnectionState) {
        self.state = state;
        self.socket_id = None;
        self.reconnect_attempts = 0;
        self.connected_since = None;
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: SocketConfig,
    registry: EventRegistry,
    inner: Mutex<Inner>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the one realtime connection of the application and the listeners
/// attached to it. Cloning yields another handle to the same connection.
///
/// Nothing here returns an error or panics: bad preconditions are logged and
/// ignored, runtime failures surface as lifecycle events
/// (`socket_connection_error`, `socket_connection_failed`, ...).
#[derive(Clone)]
pub struct SocketService {
    shared: Arc<Shared>,
}

static SOCKET_SERVICE: Lazy<SocketService> =
    Lazy::new(|| SocketService::new(Arc::new(NativeConnector), SocketConfig::from_env()));

/// The process-wide socket service, configured from the environment.
pub fn socket_service() -> SocketService {
    SOCKET_SERVICE.clone()
}

impl SocketService {
    pub fn new(connector: Arc<dyn Connector>, config: SocketConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                registry: EventRegistry::new(),
                inner: Mutex::new(Inner {
                    transport: None,
                    generation: 0,
                    state: ConnectionState::Disconnected,
                    socket_id: None,
                    reconnect_attempts: 0,
                    connected_since: None,
                }),
            }),
        }
    }

    /// Open the connection with a bearer token.
    ///
    /// A no-op when already connected or when the token is missing. A
    /// transport that exists but isn't connected is closed and replaced.
    pub fn connect<'a>(&self, token: impl Into<Option<&'a str>>) {
        let Some(token) = token.into().filter(|t| !t.is_empty()) else {
            crate::log_warn!("socket connect skipped: no auth token");
            return;
        };

        let (generation, stale, in_flight) = {
            let mut inner = self.shared.inner();
            if inner.transport.is_some() && inner.state.is_connected() {
                crate::log_debug!("socket already connected");
                return;
            }
            let in_flight = inner.state.is_connecting();
            let stale = inner.transport.take();
            inner.generation += 1;
            inner.reset(ConnectionState::Connecting);
            (inner.generation, stale, in_flight)
        };

        if let Some(stale) = stale {
            if in_flight {
                crate::log_info!("abandoning in-flight connection attempt");
            } else {
                crate::log_info!("replacing stale socket transport");
            }
            stale.close();
        }

        crate::log_info!("connecting socket to {}", self.shared.config.server_url);
        let request = ConnectRequest {
            config: self.shared.config.clone(),
            token: token.to_string(),
        };
        let handle = self.shared.connector.open(request, self.sink(generation));

        let mut inner = self.shared.inner();
        if inner.generation == generation {
            inner.transport = Some(handle);
        } else {
            // A disconnect or newer connect won the race.
            drop(inner);
            handle.close();
        }
    }

    /// Tear down the transport and forget every listener.
    pub fn disconnect(&self) {
        let (transport, was_connected) = {
            let mut inner = self.shared.inner();
            let Some(transport) = inner.transport.take() else {
                return;
            };
            let was_connected = inner.state.is_connected();
            inner.generation += 1;
            inner.reset(ConnectionState::Disconnected);
            (transport, was_connected)
        };

        crate::log_info!("disconnecting socket");
        transport.close();

        if was_connected {
            self.emit_lifecycle(&LifecycleEvent::Disconnected {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
        self.shared.registry.clear();
    }

    /// Listen for a server or lifecycle event. Requires a transport, i.e. a
    /// prior `connect`; otherwise logs a warning and returns `None`.
    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Option<ListenerId> {
        if self.shared.inner().transport.is_none() {
            crate::log_warn!("cannot listen for '{}': socket not connected", event);
            return None;
        }
        Some(self.shared.registry.on(event, Arc::new(callback)))
    }

    /// Stop one listener, or all listeners of `event` when `id` is `None`.
    pub fn off(&self, event: &str, id: Option<ListenerId>) -> bool {
        self.shared.registry.off(event, id)
    }

    /// Dispatch an event to local listeners only; nothing goes on the wire.
    pub fn emit_local(&self, event: &str, data: &Value) -> usize {
        self.shared.registry.emit(event, data)
    }

    /// Whether a registration made through [`on`](Self::on) is still live.
    /// `disconnect` drops every registration.
    pub fn is_listening(&self, event: &str, id: ListenerId) -> bool {
        self.shared.registry.contains(event, id)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.registry.listener_count(event)
    }

    pub fn status(&self) -> ConnectionStatus {
        let inner = self.shared.inner();
        ConnectionStatus {
            is_connected: inner.state.is_connected(),
            socket_id: inner.socket_id.clone(),
            reconnect_attempts: inner.reconnect_attempts,
            state: inner.state.clone(),
            connected_since: inner.connected_since,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.inner().state.is_connected()
    }

    pub fn socket_id(&self) -> Option<String> {
        self.shared.inner().socket_id.clone()
    }

    fn sink(&self, generation: u64) -> TransportSink {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                SocketService { shared }.handle_transport_event(generation, event);
            }
        })
    }

    fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        let lifecycle = {
            let mut inner = self.shared.inner();
            if inner.generation != generation {
                crate::log_debug!("dropping {:?} from a retired transport", event);
                return;
            }

            match event {
                TransportEvent::Event { name, data } => {
                    drop(inner);
                    self.shared.registry.emit(&name, &data);
                    return;
                }
                TransportEvent::Connect { socket_id } => {
                    inner.state = ConnectionState::Connected;
                    inner.socket_id = Some(socket_id.clone());
                    inner.reconnect_attempts = 0;
                    inner.connected_since = Some(Utc::now());
                    LifecycleEvent::Connected { socket_id }
                }
                TransportEvent::Disconnect { reason } => {
                    let next = if reason == DisconnectReason::ServerDisconnect {
                        crate::log_info!("server closed the socket, reconnecting");
                        if let Some(transport) = inner.transport.as_ref() {
                            transport.reconnect();
                        }
                        ConnectionState::Connecting
                    } else if self.shared.config.reconnection {
                        ConnectionState::Reconnecting { attempt: 0 }
                    } else {
                        ConnectionState::Disconnected
                    };
                    inner.reset(next);
                    LifecycleEvent::Disconnected { reason }
                }
                TransportEvent::ConnectError { message } => {
                    inner.state = if self.shared.config.reconnection {
                        ConnectionState::Reconnecting {
                            attempt: inner.reconnect_attempts,
                        }
                    } else {
                        ConnectionState::Disconnected
                    };
                    inner.socket_id = None;
                    LifecycleEvent::ConnectionError { message }
                }
                TransportEvent::ReconnectAttempt { attempt } => {
                    inner.state = ConnectionState::Reconnecting { attempt };
                    inner.reconnect_attempts = attempt;
                    LifecycleEvent::ReconnectAttempt {
                        attempt_number: attempt,
                    }
                }
                TransportEvent::Reconnect { attempt } => {
                    crate::log_info!("socket reconnected after {} attempts", attempt);
                    inner.state = ConnectionState::Connected;
                    inner.reconnect_attempts = 0;
                    LifecycleEvent::Reconnected {
                        attempt_number: attempt,
                    }
                }
                TransportEvent::ReconnectFailed => {
                    let reason = format!(
                        "reconnection failed after {} attempts",
                        inner.reconnect_attempts
                    );
                    crate::log_error!("socket {}", reason);
                    inner.state = ConnectionState::Failed { reason };
                    inner.socket_id = None;
                    inner.connected_since = None;
                    LifecycleEvent::ConnectionFailed
                }
            }
        };

        self.emit_lifecycle(&lifecycle);
    }

    fn emit_lifecycle(&self, event: &LifecycleEvent) {
        crate::log_debug!("lifecycle: {}", event.name());
        self.shared.registry.emit(event.name(), &event.payload());
    }
}
