//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the pieces a realtime client on the default namespace needs are
//! covered: the engine handshake and heartbeat, and the socket-level
//! connect, disconnect, event and connect-error packets. Binary packets are
//! rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_IO_VERSION: &str = "4";

/// Default Socket.IO mount path on the server.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Longest heartbeat window a server can impose, in milliseconds.
pub const MAX_HEARTBEAT_MS: u64 = 10 * 60 * 1000;

/// Payload of the engine `open` packet sent by the server right after the
/// WebSocket upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong (and we wait for a ping).
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Silence after which the connection counts as dead: one ping interval
    /// plus the grace period, capped at [`MAX_HEARTBEAT_MS`].
    pub fn heartbeat_timeout_ms(&self) -> u64 {
        self.ping_interval
            .saturating_add(self.ping_timeout)
            .min(MAX_HEARTBEAT_MS)
    }
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode a single WebSocket text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(body)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(ProtocolError::BinaryUnsupported),
            found => Err(ProtocolError::UnknownPacketType {
                layer: "engine",
                found,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(payload) => format!("2{payload}"),
            EnginePacket::Pong(payload) => format!("3{payload}"),
            EnginePacket::Message(body) => format!("4{body}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Client → server: optional auth payload. Server → client: `{ "sid" }`.
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        data: Value,
        ack_id: Option<u64>,
    },
    Ack {
        ack_id: u64,
        data: Value,
    },
    ConnectError(Value),
}

impl SocketPacket {
    /// Decode the body of an engine `message` packet.
    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ProtocolError::BinaryUnsupported);
        }

        if rest.starts_with('/') {
            let (namespace, tail) = match rest.find(',') {
                Some(idx) => (&rest[..idx], &rest[idx + 1..]),
                None => (rest, ""),
            };
            if namespace != "/" {
                return Err(ProtocolError::MalformedEvent(format!(
                    "unsupported namespace '{namespace}'"
                )));
            }
            rest = tail;
        }

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        let json = &rest[digits..];

        match kind {
            '0' => {
                let data = if json.is_empty() {
                    None
                } else {
                    Some(serde_json::from_str(json)?)
                };
                Ok(SocketPacket::Connect(data))
            }
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let (name, data) = split_event_array(serde_json::from_str(json)?)?;
                Ok(SocketPacket::Event { name, data, ack_id })
            }
            '3' => {
                let ack_id = ack_id.ok_or_else(|| {
                    ProtocolError::MalformedEvent("ack packet without id".to_string())
                })?;
                let data = match serde_json::from_str::<Value>(json)? {
                    Value::Array(mut args) if !args.is_empty() => args.remove(0),
                    Value::Array(_) => Value::Null,
                    other => other,
                };
                Ok(SocketPacket::Ack { ack_id, data })
            }
            '4' => {
                let data = if json.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(json)?
                };
                Ok(SocketPacket::ConnectError(data))
            }
            found => Err(ProtocolError::UnknownPacketType {
                layer: "socket",
                found,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(data)) => format!("0{data}"),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, data, ack_id } => {
                let args = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                match ack_id {
                    Some(id) => format!("2{id}{args}"),
                    None => format!("2{args}"),
                }
            }
            SocketPacket::Ack { ack_id, data } => {
                format!("3{ack_id}{}", Value::Array(vec![data.clone()]))
            }
            SocketPacket::ConnectError(data) => format!("4{data}"),
        }
    }

    /// Wrap this packet in an engine `message` frame ready to send.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }

    /// Human-readable message of a connect-error payload.
    pub fn connect_error_message(data: &Value) -> String {
        match data {
            Value::String(message) => message.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
            Value::Null => "connection refused".to_string(),
            other => other.to_string(),
        }
    }
}

fn split_event_array(value: Value) -> Result<(String, Value), ProtocolError> {
    let Value::Array(args) = value else {
        return Err(ProtocolError::MalformedEvent(
            "event payload is not an array".to_string(),
        ));
    };
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(ProtocolError::MalformedEvent(
                "event name missing".to_string(),
            ))
        }
    };
    Ok((name, args.next().unwrap_or(Value::Null)))
}
