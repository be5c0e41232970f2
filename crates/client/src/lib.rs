//! Attendly Client - realtime layer
//!
//! Keeps the dashboard's single Socket.IO connection alive and fans server
//! pushes (attendance changes, notifications) out to component-scoped
//! subscribers.

pub mod auth_session;
pub mod config;
pub mod logging;
pub mod notifier;
pub mod storage;
pub mod ws;

pub use auth_session::SessionStore;
pub use config::{SocketConfig, TransportKind};
pub use notifier::{Notifier, Toast, TracingNotifier};
pub use storage::Storage;
pub use ws::{socket_service, ConnectionState, ConnectionStatus, SocketService};
