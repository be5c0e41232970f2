//! The tokio-tungstenite transport against a scripted Socket.IO server on
//! localhost.

mod common;

use std::sync::Arc;
use std::time::Duration;

use attendly_client::ws::{NativeConnector, ReconnectConfig};
use attendly_client::{ConnectionState, SocketConfig, SocketService};
use attendly_shared::{
    ATTENDANCE_UPDATED, SOCKET_CONNECTED, SOCKET_CONNECTION_ERROR, SOCKET_CONNECTION_FAILED,
    SOCKET_DISCONNECTED, SOCKET_RECONNECT_ATTEMPT,
};
use common::Recorder;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const OPEN: &str = r#"0{"sid":"engine-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

fn config_for(port: u16) -> SocketConfig {
    SocketConfig {
        server_url: format!("http://127.0.0.1:{port}"),
        connect_timeout: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            max_attempts: 2,
            initial_delay_ms: 10,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
            randomization_factor: 0.0,
        },
        ..SocketConfig::default()
    }
}

fn native_service(port: u16) -> SocketService {
    SocketService::new(Arc::new(NativeConnector), config_for(port))
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// Accept one client, run the engine open and acknowledge its connect with
/// `socket_id`. Returns the client's connect frame.
async fn accept_client(
    listener: &TcpListener,
    socket_id: &str,
) -> (WebSocketStream<TcpStream>, String) {
    accept_client_with(listener, OPEN, socket_id).await
}

async fn accept_client_with(
    listener: &TcpListener,
    open: &str,
    socket_id: &str,
) -> (WebSocketStream<TcpStream>, String) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();
    ws.send(Message::text(open)).await.unwrap();
    let connect = next_text(&mut ws).await.unwrap();
    ws.send(Message::text(format!(r#"40{{"sid":"{socket_id}"}}"#)))
        .await
        .unwrap();
    (ws, connect)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn handshake_heartbeat_and_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut ws, connect) = accept_client(&listener, "socket-1").await;
        ws.send(Message::text("2")).await.unwrap();
        let pong = next_text(&mut ws).await;
        ws.send(Message::text(
            r#"42["attendance_updated",{"attendance":{"id":7},"event_type":"create"}]"#,
        ))
        .await
        .unwrap();
        let goodbye = next_text(&mut ws).await;
        (connect, pong, goodbye)
    });

    let service = native_service(port);
    let seen = Recorder::new();
    service.connect("tok123");
    let sink = seen.clone();
    service
        .on(ATTENDANCE_UPDATED, move |data: &Value| sink.push(data.clone()))
        .unwrap();

    wait_until("attendance event", || seen.len() == 1).await;
    assert_eq!(
        seen.items(),
        vec![json!({ "attendance": { "id": 7 }, "event_type": "create" })]
    );
    let status = service.status();
    assert!(status.is_connected);
    assert_eq!(status.socket_id.as_deref(), Some("socket-1"));

    service.disconnect();

    let (connect, pong, goodbye) = server.await.unwrap();
    assert_eq!(connect, r#"40{"token":"tok123"}"#);
    assert_eq!(pong.as_deref(), Some("3"));
    assert_eq!(goodbye.as_deref(), Some("41"));
}

#[tokio::test]
async fn unreachable_server_exhausts_retries() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let service = native_service(port);
    let seen = Recorder::new();
    service.connect("tok123");
    for name in [
        SOCKET_CONNECTION_ERROR,
        SOCKET_RECONNECT_ATTEMPT,
        SOCKET_CONNECTION_FAILED,
    ] {
        let sink = seen.clone();
        service
            .on(name, move |data: &Value| {
                let detail = data.get("attemptNumber").cloned().unwrap_or(Value::Null);
                sink.push(format!("{name}:{detail}"));
            })
            .unwrap();
    }

    wait_until("connection failure", || {
        seen.items()
            .iter()
            .any(|e| e.starts_with(SOCKET_CONNECTION_FAILED))
    })
    .await;

    assert_eq!(
        seen.items(),
        vec![
            "socket_connection_error:null",
            "socket_reconnect_attempt:1",
            "socket_connection_error:null",
            "socket_reconnect_attempt:2",
            "socket_connection_error:null",
            "socket_connection_failed:null",
        ]
    );
    assert!(matches!(
        service.status().state,
        ConnectionState::Failed { .. }
    ));
    assert!(!service.is_connected());
}

#[tokio::test]
async fn server_disconnect_is_followed_by_an_immediate_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut first, _) = accept_client(&listener, "socket-1").await;
        first.send(Message::text("41")).await.unwrap();

        let (mut second, connect) = accept_client(&listener, "socket-2").await;
        drop(first);
        let goodbye = next_text(&mut second).await;
        (connect, goodbye)
    });

    let service = native_service(port);
    let seen = Recorder::new();
    service.connect("tok123");
    for name in [SOCKET_CONNECTED, SOCKET_DISCONNECTED] {
        let sink = seen.clone();
        service
            .on(name, move |data: &Value| sink.push(format!("{name}:{data}")))
            .unwrap();
    }

    wait_until("second connection", || seen.len() == 3).await;
    assert_eq!(
        seen.items(),
        vec![
            r#"socket_connected:{"socketId":"socket-1"}"#,
            r#"socket_disconnected:{"reason":"io server disconnect"}"#,
            r#"socket_connected:{"socketId":"socket-2"}"#,
        ]
    );
    assert_eq!(service.socket_id().as_deref(), Some("socket-2"));

    service.disconnect();
    let (connect, goodbye) = server.await.unwrap();
    assert_eq!(connect, r#"40{"token":"tok123"}"#);
    assert_eq!(goodbye.as_deref(), Some("41"));
}

/// Records disconnect reasons and reconnect attempts in order.
fn record_drops(service: &SocketService) -> Recorder<String> {
    let seen = Recorder::new();
    let sink = seen.clone();
    service
        .on(SOCKET_DISCONNECTED, move |data: &Value| {
            sink.push(format!("down:{}", data["reason"]))
        })
        .unwrap();
    let sink = seen.clone();
    service
        .on(SOCKET_RECONNECT_ATTEMPT, move |data: &Value| {
            sink.push(format!("attempt:{}", data["attemptNumber"]))
        })
        .unwrap();
    seen
}

#[tokio::test]
async fn oversized_ping_interval_is_survivable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let open = r#"0{"sid":"engine-1","upgrades":[],"pingInterval":18446744073709551615,"pingTimeout":1}"#;
        let (mut ws, _) = accept_client_with(&listener, open, "socket-1").await;
        ws.close(None).await.unwrap();
    });

    let service = native_service(port);
    service.connect("tok123");
    let seen = record_drops(&service);

    wait_until("reconnect attempt", || seen.len() >= 2).await;
    assert_eq!(
        seen.items()[..2],
        [r#"down:"transport close""#, "attempt:1"]
    );
    assert!(!service.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn silent_server_times_out_the_heartbeat() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let open = r#"0{"sid":"engine-1","upgrades":[],"pingInterval":50,"pingTimeout":50}"#;
        let (mut ws, _) = accept_client_with(&listener, open, "socket-1").await;
        // Never ping; just wait for the client to give up.
        next_text(&mut ws).await
    });

    let service = native_service(port);
    service.connect("tok123");
    let seen = record_drops(&service);

    wait_until("reconnect attempt", || seen.len() >= 2).await;
    assert_eq!(
        seen.items()[..2],
        [r#"down:"ping timeout""#, "attempt:1"]
    );
    assert_eq!(server.await.unwrap(), None);
}
