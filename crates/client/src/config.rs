//! Realtime connection configuration from environment variables.

use std::time::Duration;

use attendly_shared::{DEFAULT_SOCKET_PATH, ENGINE_IO_VERSION};
use url::Url;

use crate::ws::ReconnectConfig;

/// Transport modes a Socket.IO client may use, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

/// Static parameters of every `connect` call.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// HTTP(S) origin of the realtime server, e.g. `https://api.example.com`.
    pub server_url: String,
    /// Socket.IO mount path.
    pub path: String,
    pub transports: Vec<TransportKind>,
    pub reconnection: bool,
    pub reconnect: ReconnectConfig,
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            path: DEFAULT_SOCKET_PATH.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            reconnection: true,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_millis(20_000),
        }
    }
}

impl SocketConfig {
    /// Build the configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ATTENDLY_SOCKET_URL`: server origin (default: "http://localhost:5000")
    /// - `ATTENDLY_SOCKET_PATH`: Socket.IO path (default: "/socket.io/")
    /// - `ATTENDLY_SOCKET_RECONNECT_ATTEMPTS`: max reconnect attempts (default: 5)
    /// - `ATTENDLY_SOCKET_RECONNECT_DELAY_MS`: initial reconnect delay (default: 1000)
    /// - `ATTENDLY_SOCKET_RECONNECT_DELAY_MAX_MS`: reconnect delay cap (default: 5000)
    /// - `ATTENDLY_SOCKET_TIMEOUT_MS`: connect timeout (default: 20000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SocketConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("ATTENDLY_SOCKET_URL").filter(|u| !u.trim().is_empty()) {
            config.server_url = url.trim().to_string();
        }
        if let Some(path) = lookup("ATTENDLY_SOCKET_PATH").filter(|p| !p.trim().is_empty()) {
            config.path = path.trim().to_string();
        }
        if let Some(n) = parse_var(&lookup, "ATTENDLY_SOCKET_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = n;
        }
        if let Some(ms) = parse_var(&lookup, "ATTENDLY_SOCKET_RECONNECT_DELAY_MS") {
            config.reconnect.initial_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "ATTENDLY_SOCKET_RECONNECT_DELAY_MAX_MS") {
            config.reconnect.max_delay_ms = ms;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ATTENDLY_SOCKET_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// WebSocket URL of the Engine.IO endpoint.
    pub fn engine_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.server_url)?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // http <-> ws are both special schemes, so this can't fail.
        let _ = url.set_scheme(scheme);

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", TransportKind::Websocket.as_str());

        Ok(url)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            crate::log_warn!("ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = SocketConfig::from_lookup(lookup(&[]));
        assert_eq!(config.server_url, "http://localhost:5000");
        assert_eq!(
            config.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
        assert!(config.reconnection);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 5000);
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn reads_overrides_and_skips_garbage() {
        let config = SocketConfig::from_lookup(lookup(&[
            ("ATTENDLY_SOCKET_URL", "https://hr.example.com"),
            ("ATTENDLY_SOCKET_RECONNECT_ATTEMPTS", "10"),
            ("ATTENDLY_SOCKET_RECONNECT_DELAY_MS", "soon"),
            ("ATTENDLY_SOCKET_TIMEOUT_MS", "500"),
        ]));
        assert_eq!(config.server_url, "https://hr.example.com");
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.initial_delay_ms, 1000);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn engine_url_maps_scheme_and_query() {
        let config = SocketConfig {
            server_url: "https://hr.example.com:8443".to_string(),
            ..SocketConfig::default()
        };
        assert_eq!(
            config.engine_url().unwrap().as_str(),
            "wss://hr.example.com:8443/socket.io/?EIO=4&transport=websocket"
        );

        let local = SocketConfig {
            server_url: "http://127.0.0.1:5000".to_string(),
            path: "realtime".to_string(),
            ..SocketConfig::default()
        };
        assert_eq!(
            local.engine_url().unwrap().as_str(),
            "ws://127.0.0.1:5000/realtime?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn engine_url_rejects_garbage() {
        let config = SocketConfig {
            server_url: "not a url".to_string(),
            ..SocketConfig::default()
        };
        assert!(config.engine_url().is_err());
    }
}
