//! Attendly Client - headless realtime monitor
//!
//! Connects to the dashboard's realtime server with the current session
//! token and logs attendance changes and notifications until Ctrl-C.

use anyhow::Context;
use attendly_client::notifier::TracingNotifier;
use attendly_client::ws::{
    use_attendance_socket, use_notification_socket, NotificationCallbacks, NotificationEvent,
};
use attendly_client::{logging, socket_service, SessionStore, Storage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("attendly_client=debug,{}=info", logging::TARGET))
        }))
        .init();

    let storage = Storage::config_dir().context("no config directory on this platform")?;
    let session = SessionStore::with_storage(storage);
    if let Ok(token) = std::env::var("ATTENDLY_TOKEN") {
        session.login(token);
    }
    if !session.is_authenticated() {
        tracing::warn!("no session token (set ATTENDLY_TOKEN); waiting for a login");
    }

    let service = socket_service();

    let mut notifications = use_notification_socket(
        &service,
        &session,
        TracingNotifier,
        NotificationCallbacks::new()
            .on_notification(|event| match &event {
                NotificationEvent::New(n) => tracing::info!(id = %n.id, "new notification"),
                other => tracing::info!(
                    id = %other.id(),
                    kind = other.kind().map(|k| k.as_str()).unwrap_or("new"),
                    "notification changed"
                ),
            })
            .on_count_update(|| tracing::info!("notification count changed, refresh badge")),
    );

    let mut attendance = use_attendance_socket(&service, &session, |record, event_type| {
        tracing::info!(
            event_type = event_type.as_deref().unwrap_or("update"),
            "attendance: {}",
            record
        );
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = notifications.session_changed() => {
                if !changed {
                    break;
                }
                notifications.sync();
                attendance.sync();
            }
        }
    }

    tracing::info!(status = ?service.status(), "shutting down");
    drop(attendance);
    drop(notifications);
    service.disconnect();
    Ok(())
}
