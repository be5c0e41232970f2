//! Realtime socket layer of the dashboard.
//!
//! This module provides:
//! - One process-wide connection with explicit backoff and reconnect
//! - A per-event listener registry with ordered, isolated fan-out
//! - Component-scoped subscriptions for attendance and notifications
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────────────┐   ┌──────────────────────┐
//!   │  AttendanceSocket  │   │  NotificationSocket  │   (one per component)
//!   └────────────────────┘   └──────────────────────┘
//!             │  on / off               │  on / off / disconnect
//!             └────────────┬────────────┘
//!                          ▼
//!              ┌──────────────────────┐
//!              │    SocketService     │  status, lifecycle events
//!              │   + EventRegistry    │
//!              └──────────────────────┘
//!                          │  Connector::open
//!                          ▼
//!              ┌──────────────────────┐
//!              │   NativeConnector    │  Socket.IO over tokio-tungstenite
//!              └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let session = SessionStore::new();
//! session.login(token);
//!
//! let service = socket_service();
//! let feed = use_attendance_socket(&service, &session, |record, event_type| {
//!     println!("{event_type:?}: {record}");
//! });
//! // ... later, when the component goes away:
//! drop(feed);
//! ```

mod connection;
mod hooks;
mod manager;
mod registry;

pub use connection::{
    ConnectRequest, ConnectionState, Connector, NativeConnector, ReconnectConfig, TransportEvent,
    TransportHandle, TransportSink,
};

pub use manager::{socket_service, ConnectionStatus, SocketService};

pub use registry::{EventRegistry, Listener, ListenerId};

pub use hooks::{
    use_attendance_socket, use_notification_socket, AttendanceCallback, AttendanceSocket,
    NotificationCallbacks, NotificationChange, NotificationEvent, NotificationSocket,
};
