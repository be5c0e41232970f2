//! Component-scoped realtime subscriptions.
//!
//! Each subscription type stands in for a UI hook: constructing it is the
//! mount, [`sync`](AttendanceSocket::sync) is a re-render that re-runs the
//! effect when the session token changed, and dropping it is the unmount.
//! Callbacks live in a single-slot holder that is read at delivery time, so
//! swapping a callback never re-subscribes.

use std::sync::{Arc, PoisonError, RwLock};

use attendly_shared::{
    Notification, NotificationRef, ServerEvent, ATTENDANCE_UPDATED, NEW_NOTIFICATION,
    NOTIFICATION_COUNT_UPDATED, NOTIFICATION_DELETED, NOTIFICATION_UPDATED, SOCKET_CONNECTED,
    SOCKET_DISCONNECTED, SOCKET_RECONNECTED,
};
use serde_json::Value;
use tokio::sync::watch;

use super::manager::{ConnectionStatus, SocketService};
use super::registry::ListenerId;
use crate::auth_session::SessionStore;
use crate::notifier::{Notifier, SharedNotifier, Toast};

/// Single-slot holder for the most recently supplied callback(s).
struct Latest<T: Clone>(RwLock<T>);

impl<T: Clone> Latest<T> {
    fn new(value: T) -> Arc<Self> {
        Arc::new(Self(RwLock::new(value)))
    }

    fn get(&self) -> T {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, value: T) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

fn decode(event: &str, data: &Value) -> Option<ServerEvent> {
    match ServerEvent::decode(event, data) {
        Ok(decoded) => decoded,
        Err(e) => {
            crate::log_warn!("dropping '{}' event: {}", event, e);
            None
        }
    }
}

// =========================================
// Attendance
// =========================================

pub type AttendanceCallback = Arc<dyn Fn(Value, Option<String>) + Send + Sync>;

/// Live stream of `attendance_updated` events for one component.
pub struct AttendanceSocket {
    service: SocketService,
    session: SessionStore,
    token_rx: watch::Receiver<Option<String>>,
    callback: Arc<Latest<AttendanceCallback>>,
    active_token: Option<String>,
    listener: Option<ListenerId>,
}

/// Mount an attendance subscription. See [`AttendanceSocket::new`].
pub fn use_attendance_socket(
    service: &SocketService,
    session: &SessionStore,
    on_received: impl Fn(Value, Option<String>) + Send + Sync + 'static,
) -> AttendanceSocket {
    AttendanceSocket::new(service.clone(), session, on_received)
}

impl AttendanceSocket {
    /// Connects with the session token and listens for attendance changes.
    /// Without a token nothing happens until a later [`sync`](Self::sync)
    /// finds one.
    pub fn new(
        service: SocketService,
        session: &SessionStore,
        on_received: impl Fn(Value, Option<String>) + Send + Sync + 'static,
    ) -> Self {
        let callback: AttendanceCallback = Arc::new(on_received);
        let mut socket = Self {
            service,
            session: session.clone(),
            token_rx: session.subscribe(),
            callback: Latest::new(callback),
            active_token: None,
            listener: None,
        };
        socket.mount();
        socket
    }

    fn mount(&mut self) {
        self.active_token = self.session.token();
        let Some(token) = self.active_token.as_deref() else {
            crate::log_debug!("attendance feed idle: not authenticated");
            return;
        };

        self.service.connect(token);

        let callback = self.callback.clone();
        self.listener = self.service.on(ATTENDANCE_UPDATED, move |data| {
            if let Some(ServerEvent::AttendanceUpdated(update)) = decode(ATTENDANCE_UPDATED, data) {
                crate::log_debug!("attendance update received: {:?}", update.event_type);
                (callback.get())(update.attendance, update.event_type);
            }
        });
    }

    fn unmount(&mut self) {
        if let Some(id) = self.listener.take() {
            self.service.off(ATTENDANCE_UPDATED, Some(id));
        }
    }

    /// Replace the callback without touching the subscription.
    pub fn set_callback(&self, on_received: impl Fn(Value, Option<String>) + Send + Sync + 'static) {
        let callback: AttendanceCallback = Arc::new(on_received);
        self.callback.set(callback);
    }

    /// Re-run the subscription if the session token changed since the last
    /// run, or if a `disconnect` elsewhere dropped our listener. Returns
    /// whether it did.
    pub fn sync(&mut self) -> bool {
        self.token_rx.borrow_and_update();
        let dropped = self.listener.is_some() && !self.is_subscribed();
        if !dropped && self.session.token() == self.active_token {
            return false;
        }
        self.unmount();
        self.mount();
        true
    }

    /// Resolves when the in-memory session token changes; follow with
    /// [`sync`](Self::sync).
    pub async fn session_changed(&mut self) -> bool {
        self.token_rx.changed().await.is_ok()
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener
            .is_some_and(|id| self.service.is_listening(ATTENDANCE_UPDATED, id))
    }

    pub fn status(&self) -> ConnectionStatus {
        self.service.status()
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_connected()
    }

    pub fn socket_id(&self) -> Option<String> {
        self.service.socket_id()
    }
}

impl Drop for AttendanceSocket {
    fn drop(&mut self) {
        // Only our own listener: the connection is shared.
        self.unmount();
    }
}

// =========================================
// Notifications
// =========================================

/// How an existing notification changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChange {
    Update,
    Delete,
}

impl NotificationChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChange::Update => "update",
            NotificationChange::Delete => "delete",
        }
    }
}

/// What the notification callback receives.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    New(Notification),
    Updated(Notification),
    /// Only the id survives a deletion.
    Deleted(NotificationRef),
}

impl NotificationEvent {
    /// `None` for a new notification, otherwise the mutation kind.
    pub fn kind(&self) -> Option<NotificationChange> {
        match self {
            NotificationEvent::New(_) => None,
            NotificationEvent::Updated(_) => Some(NotificationChange::Update),
            NotificationEvent::Deleted(_) => Some(NotificationChange::Delete),
        }
    }

    pub fn id(&self) -> &Value {
        match self {
            NotificationEvent::New(n) | NotificationEvent::Updated(n) => &n.id,
            NotificationEvent::Deleted(r) => &r.id,
        }
    }
}

/// Callbacks of a [`NotificationSocket`]. The count callback is separate so
/// a badge can refresh independently of a notification list.
#[derive(Clone, Default)]
pub struct NotificationCallbacks {
    pub on_notification: Option<Arc<dyn Fn(NotificationEvent) + Send + Sync>>,
    pub on_count_update: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl NotificationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_notification(mut self, f: impl Fn(NotificationEvent) + Send + Sync + 'static) -> Self {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_count_update(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_count_update = Some(Arc::new(f));
        self
    }

    fn notify(&self, event: NotificationEvent) {
        if let Some(f) = &self.on_notification {
            f(event);
        }
    }

    fn refresh_count(&self) {
        if let Some(f) = &self.on_count_update {
            f();
        }
    }
}

/// Live notification feed for one component.
///
/// Unlike [`AttendanceSocket`], losing the session closes the whole shared
/// connection: notifications are the primary realtime consumer.
pub struct NotificationSocket {
    service: SocketService,
    session: SessionStore,
    token_rx: watch::Receiver<Option<String>>,
    callbacks: Arc<Latest<NotificationCallbacks>>,
    notifier: SharedNotifier,
    active_token: Option<String>,
    listeners: Vec<(&'static str, ListenerId)>,
}

/// Mount a notification subscription. See [`NotificationSocket::new`].
pub fn use_notification_socket(
    service: &SocketService,
    session: &SessionStore,
    notifier: impl Notifier + 'static,
    callbacks: NotificationCallbacks,
) -> NotificationSocket {
    NotificationSocket::new(service.clone(), session, Arc::new(notifier), callbacks)
}

impl NotificationSocket {
    pub fn new(
        service: SocketService,
        session: &SessionStore,
        notifier: SharedNotifier,
        callbacks: NotificationCallbacks,
    ) -> Self {
        let mut socket = Self {
            service,
            session: session.clone(),
            token_rx: session.subscribe(),
            callbacks: Latest::new(callbacks),
            notifier,
            active_token: None,
            listeners: Vec::new(),
        };
        socket.mount();
        socket
    }

    fn mount(&mut self) {
        self.active_token = self.session.token();
        let Some(token) = self.active_token.clone() else {
            crate::log_info!("no session, closing realtime connection");
            self.service.disconnect();
            return;
        };

        self.service.connect(token.as_str());

        let callbacks = self.callbacks.clone();
        let notifier = self.notifier.clone();
        self.listen(NEW_NOTIFICATION, move |data| {
            if let Some(ServerEvent::NewNotification(notification)) = decode(NEW_NOTIFICATION, data)
            {
                let toast = notification.toast_text().map(|(title, message)| Toast {
                    title: title.to_string(),
                    message: message.to_string(),
                });
                callbacks.get().notify(NotificationEvent::New(notification));
                if let Some(toast) = toast {
                    notifier.show(toast);
                }
            }
        });

        let callbacks = self.callbacks.clone();
        self.listen(NOTIFICATION_UPDATED, move |data| {
            if let Some(ServerEvent::NotificationUpdated(notification)) =
                decode(NOTIFICATION_UPDATED, data)
            {
                callbacks
                    .get()
                    .notify(NotificationEvent::Updated(notification));
            }
        });

        let callbacks = self.callbacks.clone();
        self.listen(NOTIFICATION_DELETED, move |data| {
            if let Some(ServerEvent::NotificationDeleted(deleted)) =
                decode(NOTIFICATION_DELETED, data)
            {
                callbacks.get().notify(NotificationEvent::Deleted(deleted));
            }
        });

        let callbacks = self.callbacks.clone();
        self.listen(NOTIFICATION_COUNT_UPDATED, move |_| {
            callbacks.get().refresh_count();
        });

        self.listen(SOCKET_CONNECTED, |data| {
            crate::log_info!("notifications live ({})", data["socketId"]);
        });

        self.listen(SOCKET_DISCONNECTED, |data| {
            crate::log_warn!("notifications paused: {}", data["reason"]);
        });

        // Events may have been missed while offline; the count must come
        // from the source of truth again.
        let callbacks = self.callbacks.clone();
        self.listen(SOCKET_RECONNECTED, move |data| {
            crate::log_info!(
                "notifications resumed after {} attempts",
                data["attemptNumber"]
            );
            callbacks.get().refresh_count();
        });
    }

    fn listen(&mut self, event: &'static str, handler: impl Fn(&Value) + Send + Sync + 'static) {
        if let Some(id) = self.service.on(event, handler) {
            self.listeners.push((event, id));
        }
    }

    fn unmount(&mut self) {
        for (event, id) in self.listeners.drain(..) {
            self.service.off(event, Some(id));
        }
    }

    /// Replace the callbacks without touching the subscriptions.
    pub fn set_callbacks(&self, callbacks: NotificationCallbacks) {
        self.callbacks.set(callbacks);
    }

    /// Re-run the subscription if the session token changed since the last
    /// run, or if a `disconnect` dropped our listeners. Returns whether it
    /// did.
    pub fn sync(&mut self) -> bool {
        self.token_rx.borrow_and_update();
        let dropped = !self.listeners.is_empty() && !self.is_subscribed();
        if !dropped && self.session.token() == self.active_token {
            return false;
        }
        self.unmount();
        self.mount();
        true
    }

    /// Resolves when the in-memory session token changes; follow with
    /// [`sync`](Self::sync).
    pub async fn session_changed(&mut self) -> bool {
        self.token_rx.changed().await.is_ok()
    }

    pub fn is_subscribed(&self) -> bool {
        !self.listeners.is_empty()
            && self
                .listeners
                .iter()
                .all(|(event, id)| self.service.is_listening(event, *id))
    }

    pub fn status(&self) -> ConnectionStatus {
        self.service.status()
    }
}

impl Drop for NotificationSocket {
    fn drop(&mut self) {
        self.unmount();
    }
}
