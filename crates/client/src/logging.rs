//! Logging macros for the realtime layer.
//!
//! Everything goes through `tracing` under the `attendly::realtime` target so
//! the host application can filter socket chatter independently of its own
//! logs (e.g. `RUST_LOG=attendly::realtime=warn`).

/// Tracing target used by every macro below.
pub const TARGET: &str = "attendly::realtime";

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ::tracing::info!(target: $crate::logging::TARGET, $($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ::tracing::error!(target: $crate::logging::TARGET, $($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::tracing::warn!(target: $crate::logging::TARGET, $($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: $crate::logging::TARGET, $($arg)*)
    };
}
