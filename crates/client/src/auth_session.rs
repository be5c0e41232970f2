//! Authentication session: the bearer token the realtime layer connects with.
//!
//! The token lives in memory and, when a [`Storage`] is attached, is mirrored
//! to disk so a restarted client can pick it up as a fallback.

use std::sync::Arc;

use tokio::sync::watch;

use crate::storage::Storage;

const STORAGE_KEY: &str = "attendly_token";

/// Shared handle to the current session. Clones observe the same session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: watch::Sender<Option<String>>,
    storage: Option<Storage>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// In-memory session, no persistence.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Session persisted through `storage`, starting from whatever token is
    /// already stored there.
    pub fn with_storage(storage: Storage) -> Self {
        let persisted = storage.load::<String>(STORAGE_KEY).filter(|t| !t.is_empty());
        Self::build(persisted, Some(storage))
    }

    fn build(token: Option<String>, storage: Option<Storage>) -> Self {
        let (token, _) = watch::channel(token);
        Self {
            inner: Arc::new(SessionInner { token, storage }),
        }
    }

    /// Start a session.
    pub fn login(&self, token: impl Into<String>) {
        let token = token.into();
        if let Some(storage) = &self.inner.storage {
            if !storage.save(STORAGE_KEY, &token) {
                crate::log_warn!("could not persist session token");
            }
        }
        self.inner.token.send_replace(Some(token));
    }

    /// End the session and forget the persisted token.
    pub fn logout(&self) {
        if let Some(storage) = &self.inner.storage {
            storage.remove(STORAGE_KEY);
        }
        self.inner.token.send_replace(None);
    }

    /// Current token: the in-memory one, else the persisted fallback.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = self.inner.token.borrow().clone() {
            return Some(token);
        }
        self.inner
            .storage
            .as_ref()
            .and_then(|s| s.load::<String>(STORAGE_KEY))
            .filter(|t| !t.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Change feed for the in-memory token.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.inner.token.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> Storage {
        Storage::at(std::env::temp_dir().join(format!("attendly-session-{}", uuid::Uuid::new_v4())))
    }

    #[test]
    fn login_and_logout_in_memory() {
        let session = SessionStore::new();
        assert_eq!(session.token(), None);

        session.login("tok123");
        assert_eq!(session.token().as_deref(), Some("tok123"));
        assert!(session.is_authenticated());

        session.logout();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn persisted_token_is_the_fallback() {
        let storage = scratch();
        SessionStore::with_storage(storage.clone()).login("persisted");

        let restored = SessionStore::with_storage(storage.clone());
        assert_eq!(restored.token().as_deref(), Some("persisted"));

        restored.logout();
        assert_eq!(SessionStore::with_storage(storage.clone()).token(), None);
        let _ = std::fs::remove_dir_all(storage.dir());
    }

    #[test]
    fn subscribers_see_changes() {
        let session = SessionStore::new();
        let mut rx = session.subscribe();
        assert!(!rx.has_changed().unwrap());

        session.login("a");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("a"));
        assert!(!rx.has_changed().unwrap());
    }
}
