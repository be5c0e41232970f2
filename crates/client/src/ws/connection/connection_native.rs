//! Native WebSocket transport using tokio-tungstenite.
//!
//! Speaks Engine.IO v4 framing with Socket.IO packets on the default
//! namespace, and owns the reconnect loop: backoff, attempt cap and the
//! manual reconnect after a server-initiated disconnect.

use std::time::Duration;

use attendly_shared::{DisconnectReason, EnginePacket, OpenHandshake, SocketPacket};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{ConnectRequest, Connector, TransportEvent, TransportHandle, TransportSink};
use crate::config::{SocketConfig, TransportKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Reconnect,
    Close,
}

/// Opens Socket.IO-over-WebSocket transports on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    fn open(&self, request: ConnectRequest, sink: TransportSink) -> Box<dyn TransportHandle> {
        let (control_tx, control_rx) = unbounded();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_transport(request, sink, control_rx));
            }
            Err(_) => {
                crate::log_error!("no tokio runtime available, socket transport not started");
                sink(TransportEvent::ConnectError {
                    message: "no async runtime available".to_string(),
                });
                sink(TransportEvent::ReconnectFailed);
            }
        }

        Box::new(NativeHandle {
            control: control_tx,
        })
    }
}

struct NativeHandle {
    control: UnboundedSender<Control>,
}

impl TransportHandle for NativeHandle {
    fn reconnect(&self) {
        let _ = self.control.unbounded_send(Control::Reconnect);
    }

    fn close(&self) {
        let _ = self.control.unbounded_send(Control::Close);
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.control.close_channel();
    }
}

enum PumpExit {
    /// Closed from our side; the transport is done.
    Closed,
    Dropped(DisconnectReason),
}

/// Connection management loop, one per opened transport.
async fn run_transport(
    request: ConnectRequest,
    sink: TransportSink,
    mut control: UnboundedReceiver<Control>,
) {
    let ConnectRequest { config, token } = request;
    let policy = config.reconnect.clone();
    let mut attempt = 0u32;
    let mut reconnecting = false;

    loop {
        if reconnecting {
            if !config.reconnection || !policy.allows_attempt(attempt) {
                if config.reconnection {
                    crate::log_error!(
                        "giving up on socket after {} reconnect attempts",
                        attempt
                    );
                    sink(TransportEvent::ReconnectFailed);
                }
                if !wait_for_reconnect(&mut control).await {
                    return;
                }
                attempt = 0;
                reconnecting = false;
            } else {
                let delay = policy.delay_for_attempt(attempt);
                attempt += 1;
                crate::log_info!("reconnecting socket in {}ms (attempt {})", delay, attempt);

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay as u64)) => {}
                    ctl = control.next() => {
                        if !matches!(ctl, Some(Control::Reconnect)) {
                            return;
                        }
                    }
                }
                sink(TransportEvent::ReconnectAttempt { attempt });
            }
        }

        let result = tokio::select! {
            _ = wait_for_close(&mut control) => return,
            result = tokio::time::timeout(config.connect_timeout, handshake(&config, &token)) => result,
        };

        match result {
            Ok(Ok((stream, socket_id, open))) => {
                crate::log_info!("socket connected ({})", socket_id);
                sink(TransportEvent::Connect { socket_id });
                if reconnecting {
                    sink(TransportEvent::Reconnect { attempt });
                }
                attempt = 0;
                reconnecting = false;

                match pump(stream, &open, &sink, &mut control).await {
                    PumpExit::Closed => return,
                    PumpExit::Dropped(reason) => {
                        crate::log_warn!("socket disconnected: {}", reason);
                        let by_server = reason == DisconnectReason::ServerDisconnect;
                        sink(TransportEvent::Disconnect { reason });
                        if by_server {
                            // The server meant it; only the manager decides to come back.
                            if !wait_for_reconnect(&mut control).await {
                                return;
                            }
                        } else {
                            reconnecting = true;
                        }
                    }
                }
            }
            Ok(Err(message)) => {
                crate::log_warn!("socket connection error: {}", message);
                sink(TransportEvent::ConnectError { message });
                reconnecting = true;
            }
            Err(_) => {
                crate::log_warn!(
                    "socket connection timed out after {:?}",
                    config.connect_timeout
                );
                sink(TransportEvent::ConnectError {
                    message: "timeout".to_string(),
                });
                reconnecting = true;
            }
        }
    }
}

/// Park until the manager asks for a reconnect. `false` means close.
async fn wait_for_reconnect(control: &mut UnboundedReceiver<Control>) -> bool {
    matches!(control.next().await, Some(Control::Reconnect))
}

/// Resolve once the handle is closed or dropped; reconnect requests are moot
/// while a connection attempt is already running.
async fn wait_for_close(control: &mut UnboundedReceiver<Control>) {
    loop {
        match control.next().await {
            Some(Control::Reconnect) => continue,
            Some(Control::Close) | None => return,
        }
    }
}

/// Engine open, Socket.IO connect with the bearer token, wait for the ack.
async fn handshake(
    config: &SocketConfig,
    token: &str,
) -> Result<(WsStream, String, OpenHandshake), String> {
    if !config.transports.contains(&TransportKind::Websocket) {
        return Err("no supported transport configured (websocket disabled)".to_string());
    }

    let url = config
        .engine_url()
        .map_err(|e| format!("invalid server url '{}': {}", config.server_url, e))?;
    crate::log_debug!("opening socket to {}", url);

    let (mut stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| e.to_string())?;

    let open = loop {
        match next_packet(&mut stream).await? {
            EnginePacket::Open(open) => break open,
            other => crate::log_debug!("ignoring {:?} before engine open", other),
        }
    };

    let connect = SocketPacket::Connect(Some(json!({ "token": token })));
    stream
        .send(Message::text(connect.to_frame()))
        .await
        .map_err(|e| e.to_string())?;

    loop {
        match next_packet(&mut stream).await? {
            EnginePacket::Ping(payload) => {
                stream
                    .send(Message::text(EnginePacket::Pong(payload).encode()))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                Ok(SocketPacket::Connect(data)) => {
                    let socket_id = data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| open.sid.clone());
                    return Ok((stream, socket_id, open));
                }
                Ok(SocketPacket::ConnectError(data)) => {
                    return Err(SocketPacket::connect_error_message(&data));
                }
                Ok(other) => crate::log_debug!("ignoring {:?} before connect ack", other),
                Err(e) => return Err(format!("protocol error: {e}")),
            },
            EnginePacket::Close => return Err("server closed the connection".to_string()),
            _ => {}
        }
    }
}

async fn next_packet(stream: &mut WsStream) -> Result<EnginePacket, String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return EnginePacket::decode(text.as_str()).map_err(|e| e.to_string());
            }
            Some(Ok(Message::Close(_))) | None => return Err("connection closed".to_string()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.to_string()),
        }
    }
}

/// Read loop of a live connection: heartbeat, event delivery, shutdown.
async fn pump(
    stream: WsStream,
    open: &OpenHandshake,
    sink: &TransportSink,
    control: &mut UnboundedReceiver<Control>,
) -> PumpExit {
    let (mut write, mut read) = stream.split();
    let heartbeat = Duration::from_millis(open.heartbeat_timeout_ms());

    loop {
        tokio::select! {
            ctl = control.next() => {
                if matches!(ctl, Some(Control::Reconnect)) {
                    // Already connected.
                } else {
                    let _ = write.send(Message::text(SocketPacket::Disconnect.to_frame())).await;
                    let _ = write.send(Message::Close(None)).await;
                    return PumpExit::Closed;
                }
            }
            frame = tokio::time::timeout(heartbeat, read.next()) => {
                let Ok(frame) = frame else {
                    return PumpExit::Dropped(DisconnectReason::PingTimeout);
                };
                match frame {
                    None | Some(Ok(Message::Close(_))) => {
                        return PumpExit::Dropped(DisconnectReason::TransportClose);
                    }
                    Some(Err(e)) => {
                        crate::log_error!("socket read error: {}", e);
                        return PumpExit::Dropped(DisconnectReason::TransportError);
                    }
                    Some(Ok(Message::Text(text))) => match EnginePacket::decode(text.as_str()) {
                        Ok(EnginePacket::Ping(payload)) => {
                            let pong = Message::text(EnginePacket::Pong(payload).encode());
                            if let Err(e) = write.send(pong).await {
                                crate::log_error!("socket pong failed: {}", e);
                                return PumpExit::Dropped(DisconnectReason::TransportError);
                            }
                        }
                        Ok(EnginePacket::Message(body)) => match SocketPacket::decode(&body) {
                            Ok(SocketPacket::Event { name, data, .. }) => {
                                crate::log_debug!("socket event '{}'", name);
                                sink(TransportEvent::Event { name, data });
                            }
                            Ok(SocketPacket::Disconnect) => {
                                return PumpExit::Dropped(DisconnectReason::ServerDisconnect);
                            }
                            Ok(other) => crate::log_debug!("ignoring socket packet {:?}", other),
                            Err(e) => {
                                crate::log_error!("undecodable socket packet: {}", e);
                                return PumpExit::Dropped(DisconnectReason::ParseError);
                            }
                        },
                        Ok(EnginePacket::Close) => {
                            return PumpExit::Dropped(DisconnectReason::TransportClose);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            crate::log_error!("undecodable engine packet: {}", e);
                            return PumpExit::Dropped(DisconnectReason::ParseError);
                        }
                    },
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
