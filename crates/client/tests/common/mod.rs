//! Scripted transport for driving the socket service without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use attendly_client::ws::{
    ConnectRequest, Connector, SocketService, TransportEvent, TransportHandle, TransportSink,
};
use attendly_client::SocketConfig;
use attendly_shared::DisconnectReason;
use serde_json::Value;

#[derive(Default)]
struct HandleState {
    closed: AtomicBool,
    reconnects: AtomicUsize,
}

struct FakeHandle(Arc<HandleState>);

impl TransportHandle for FakeHandle {
    fn reconnect(&self) {
        self.0.reconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// One transport opened by the service; lets a test play the server.
#[derive(Clone)]
pub struct FakeTransport {
    pub token: String,
    sink: TransportSink,
    state: Arc<HandleState>,
}

impl FakeTransport {
    pub fn send(&self, event: TransportEvent) {
        (self.sink)(event)
    }

    pub fn connect(&self, socket_id: &str) {
        self.send(TransportEvent::Connect {
            socket_id: socket_id.to_string(),
        });
    }

    pub fn drop_connection(&self, reason: DisconnectReason) {
        self.send(TransportEvent::Disconnect { reason });
    }

    pub fn server_event(&self, name: &str, data: Value) {
        self.send(TransportEvent::Event {
            name: name.to_string(),
            data,
        });
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn reconnect_requests(&self) -> usize {
        self.state.reconnects.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<FakeTransport>>,
}

impl Connector for FakeConnector {
    fn open(&self, request: ConnectRequest, sink: TransportSink) -> Box<dyn TransportHandle> {
        let state = Arc::new(HandleState::default());
        self.opened.lock().unwrap().push(FakeTransport {
            token: request.token,
            sink,
            state: state.clone(),
        });
        Box::new(FakeHandle(state))
    }
}

impl FakeConnector {
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last(&self) -> FakeTransport {
        self.opened
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport opened")
    }

    pub fn nth(&self, index: usize) -> FakeTransport {
        self.opened.lock().unwrap()[index].clone()
    }
}

/// A fresh service backed by a scripted connector.
pub fn service() -> (SocketService, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::default());
    let service = SocketService::new(connector.clone(), SocketConfig::default());
    (service, connector)
}

/// Thread-safe list of whatever a callback observed.
#[derive(Clone)]
pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, item: T) {
        self.0.lock().unwrap().push(item);
    }

    pub fn items(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}
