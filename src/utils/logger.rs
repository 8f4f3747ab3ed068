//! Logging utilities
//!
//! Subscriber setup for binaries and test harnesses embedding the host.
//! The library itself only emits `tracing` events.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("testhost={}", level.to_tracing_level()))
}

/// Initialize the logger with specified level
///
/// Panics if a global subscriber is already installed.
pub fn init_logger(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .compact()
        .init();
}

/// Like [`init_logger`], but leaves an existing subscriber in place.
/// Returns whether this call installed one.
pub fn try_init_logger(level: LogLevel) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("unknown"), None);
    }

    #[test]
    fn test_try_init_twice() {
        try_init_logger(LogLevel::Debug);
        assert!(!try_init_logger(LogLevel::Debug));
    }
}
