//! User-facing toast notifications.

use std::sync::Arc;

/// A message to flash at the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub message: String,
}

/// Fire-and-forget "show message" capability supplied by the UI layer.
pub trait Notifier: Send + Sync {
    fn show(&self, toast: Toast);
}

impl<F> Notifier for F
where
    F: Fn(Toast) + Send + Sync,
{
    fn show(&self, toast: Toast) {
        self(toast)
    }
}

/// Notifier for headless use: writes the toast to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(&self, toast: Toast) {
        tracing::info!(title = %toast.title, "{}", toast.message);
    }
}

pub type SharedNotifier = Arc<dyn Notifier>;
