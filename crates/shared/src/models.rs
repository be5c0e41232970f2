//! Realtime event names and payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

// --- Server event names ---

pub const ATTENDANCE_UPDATED: &str = "attendance_updated";
pub const NEW_NOTIFICATION: &str = "new_notification";
pub const NOTIFICATION_UPDATED: &str = "notification_updated";
pub const NOTIFICATION_DELETED: &str = "notification_deleted";
pub const NOTIFICATION_COUNT_UPDATED: &str = "notification_count_updated";

// --- Lifecycle event names (re-emitted locally by the connection manager) ---

pub const SOCKET_CONNECTED: &str = "socket_connected";
pub const SOCKET_DISCONNECTED: &str = "socket_disconnected";
pub const SOCKET_RECONNECTED: &str = "socket_reconnected";
pub const SOCKET_RECONNECT_ATTEMPT: &str = "socket_reconnect_attempt";
pub const SOCKET_CONNECTION_ERROR: &str = "socket_connection_error";
pub const SOCKET_CONNECTION_FAILED: &str = "socket_connection_failed";

// --- Attendance ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceUpdate {
    pub attendance: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

// --- Notifications ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Everything else the server sent (type, read flag, timestamps...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notification {
    /// Title and message, if both are present and non-empty.
    pub fn toast_text(&self) -> Option<(&str, &str)> {
        let title = self.title.as_deref().filter(|t| !t.is_empty())?;
        let message = self.message.as_deref().filter(|m| !m.is_empty())?;
        Some((title, message))
    }
}

/// What is left of a notification once it has been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRef {
    pub id: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct NotificationEnvelope {
    notification: Notification,
}

#[derive(Debug, Clone, Deserialize)]
struct NotificationDeletedEnvelope {
    notification_id: Value,
}

/// A known server-pushed domain event, validated from its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    AttendanceUpdated(AttendanceUpdate),
    NewNotification(Notification),
    NotificationUpdated(Notification),
    NotificationDeleted(NotificationRef),
    NotificationCountUpdated,
}

impl ServerEvent {
    /// Validate the payload of a named event.
    ///
    /// Returns `Ok(None)` for names this client doesn't know about.
    pub fn decode(name: &str, data: &Value) -> Result<Option<Self>, ProtocolError> {
        let parse_err = |e: serde_json::Error| ProtocolError::payload(name, e);

        let event = match name {
            ATTENDANCE_UPDATED => ServerEvent::AttendanceUpdated(
                AttendanceUpdate::deserialize(data).map_err(parse_err)?,
            ),
            NEW_NOTIFICATION => ServerEvent::NewNotification(
                NotificationEnvelope::deserialize(data)
                    .map_err(parse_err)?
                    .notification,
            ),
            NOTIFICATION_UPDATED => ServerEvent::NotificationUpdated(
                NotificationEnvelope::deserialize(data)
                    .map_err(parse_err)?
                    .notification,
            ),
            NOTIFICATION_DELETED => {
                let envelope = NotificationDeletedEnvelope::deserialize(data).map_err(parse_err)?;
                ServerEvent::NotificationDeleted(NotificationRef {
                    id: envelope.notification_id,
                })
            }
            NOTIFICATION_COUNT_UPDATED => ServerEvent::NotificationCountUpdated,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::AttendanceUpdated(_) => ATTENDANCE_UPDATED,
            ServerEvent::NewNotification(_) => NEW_NOTIFICATION,
            ServerEvent::NotificationUpdated(_) => NOTIFICATION_UPDATED,
            ServerEvent::NotificationDeleted(_) => NOTIFICATION_DELETED,
            ServerEvent::NotificationCountUpdated => NOTIFICATION_COUNT_UPDATED,
        }
    }
}

// --- Lifecycle ---

/// Why a connection went away, using the Socket.IO reason strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the socket on purpose; no automatic reconnect.
    ServerDisconnect,
    ClientDisconnect,
    PingTimeout,
    TransportClose,
    TransportError,
    ParseError,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::ParseError => "parse error",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection lifecycle transition, re-emitted to local listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Connected { socket_id: String },
    Disconnected { reason: DisconnectReason },
    Reconnected { attempt_number: u32 },
    ReconnectAttempt { attempt_number: u32 },
    ConnectionError { message: String },
    ConnectionFailed,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Connected { .. } => SOCKET_CONNECTED,
            LifecycleEvent::Disconnected { .. } => SOCKET_DISCONNECTED,
            LifecycleEvent::Reconnected { .. } => SOCKET_RECONNECTED,
            LifecycleEvent::ReconnectAttempt { .. } => SOCKET_RECONNECT_ATTEMPT,
            LifecycleEvent::ConnectionError { .. } => SOCKET_CONNECTION_ERROR,
            LifecycleEvent::ConnectionFailed => SOCKET_CONNECTION_FAILED,
        }
    }

    /// The JSON payload listeners receive for this event.
    pub fn payload(&self) -> Value {
        match self {
            LifecycleEvent::Connected { socket_id } => {
                serde_json::json!({ "socketId": socket_id })
            }
            LifecycleEvent::Disconnected { reason } => {
                serde_json::json!({ "reason": reason.as_str() })
            }
            LifecycleEvent::Reconnected { attempt_number }
            | LifecycleEvent::ReconnectAttempt { attempt_number } => {
                serde_json::json!({ "attemptNumber": attempt_number })
            }
            LifecycleEvent::ConnectionError { message } => {
                serde_json::json!({ "message": message })
            }
            LifecycleEvent::ConnectionFailed => Value::Null,
        }
    }
}
