//! Execution messages
//!
//! The result stream shared with the host test-runtime.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::scope::ScopeLevel;

/// A message emitted while walking the test hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMessage {
    Diagnostic {
        message: String,
    },
    TestStarting {
        test: String,
    },
    TestPassed {
        test: String,
        time: Duration,
    },
    TestFailed {
        test: String,
        time: Duration,
        message: String,
    },
    TestSkipped {
        test: String,
        reason: String,
    },
    TestFinished {
        test: String,
        time: Duration,
    },
    /// Disposal failed while closing a level's scope.
    CleanupFailure {
        level: ScopeLevel,
        name: String,
        message: String,
    },
}

impl ExecutionMessage {
    pub fn diagnostic(message: impl Into<String>) -> Self {
        ExecutionMessage::Diagnostic {
            message: message.into(),
        }
    }

    /// Display name of the test this message belongs to, if any.
    pub fn test(&self) -> Option<&str> {
        match self {
            ExecutionMessage::TestStarting { test }
            | ExecutionMessage::TestPassed { test, .. }
            | ExecutionMessage::TestFailed { test, .. }
            | ExecutionMessage::TestSkipped { test, .. }
            | ExecutionMessage::TestFinished { test, .. } => Some(test.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMessage::Diagnostic { message } => write!(f, "diagnostic: {message}"),
            ExecutionMessage::TestStarting { test } => write!(f, "▶ {test}"),
            ExecutionMessage::TestPassed { test, time } => {
                write!(f, "✓ {test} [{}ms]", time.as_millis())
            }
            ExecutionMessage::TestFailed {
                test,
                time,
                message,
            } => write!(f, "✗ {test} [{}ms] - {message}", time.as_millis()),
            ExecutionMessage::TestSkipped { test, reason } => write!(f, "○ {test} - {reason}"),
            ExecutionMessage::TestFinished { test, time } => {
                write!(f, "■ {test} [{}ms]", time.as_millis())
            }
            ExecutionMessage::CleanupFailure {
                level,
                name,
                message,
            } => write!(f, "! {level} cleanup failure in {name} - {message}"),
        }
    }
}

/// Sink for execution messages.
pub trait MessageBus: Send + Sync {
    /// Enqueue a message. Returns `false` when the message could not be
    /// accepted, which callers treat as a signal to stop the run.
    fn queue_message(&self, message: ExecutionMessage) -> bool;
}

/// Message bus that writes every message to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMessageBus;

impl MessageBus for TracingMessageBus {
    fn queue_message(&self, message: ExecutionMessage) -> bool {
        match &message {
            ExecutionMessage::Diagnostic { .. } => warn!("{}", message),
            ExecutionMessage::TestStarting { .. } | ExecutionMessage::TestFinished { .. } => {
                debug!("{}", message)
            }
            ExecutionMessage::TestFailed { .. } | ExecutionMessage::CleanupFailure { .. } => {
                error!("{}", message)
            }
            _ => info!("{}", message),
        }
        true
    }
}

/// In-memory message bus, mainly for inspecting a run afterwards.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<ExecutionMessage>>,
    closed: AtomicBool,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every message queued from now on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ExecutionMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn failures(&self) -> Vec<ExecutionMessage> {
        self.filter(|m| matches!(m, ExecutionMessage::TestFailed { .. }))
    }

    pub fn cleanup_failures(&self) -> Vec<ExecutionMessage> {
        self.filter(|m| matches!(m, ExecutionMessage::CleanupFailure { .. }))
    }

    pub fn diagnostics(&self) -> Vec<ExecutionMessage> {
        self.filter(|m| matches!(m, ExecutionMessage::Diagnostic { .. }))
    }

    /// Display names of passed tests, in the order they were reported.
    pub fn passed(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                ExecutionMessage::TestPassed { test, .. } => Some(test.clone()),
                _ => None,
            })
            .collect()
    }

    fn filter(&self, predicate: impl Fn(&ExecutionMessage) -> bool) -> Vec<ExecutionMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }
}

impl MessageBus for MessageLog {
    fn queue_message(&self, message: ExecutionMessage) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.messages.lock().push(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_collects_until_closed() {
        let log = MessageLog::new();
        assert!(log.queue_message(ExecutionMessage::TestStarting {
            test: "a".into()
        }));
        assert!(log.queue_message(ExecutionMessage::TestPassed {
            test: "a".into(),
            time: Duration::from_millis(3),
        }));

        log.close();
        assert!(!log.queue_message(ExecutionMessage::diagnostic("late")));
        assert_eq!(log.len(), 2);
        assert_eq!(log.passed(), vec!["a".to_string()]);
    }

    #[test]
    fn test_message_display() {
        let failed = ExecutionMessage::TestFailed {
            test: "Math.adds".into(),
            time: Duration::from_millis(12),
            message: "expected 4".into(),
        };
        assert_eq!(failed.to_string(), "✗ Math.adds [12ms] - expected 4");
        assert_eq!(failed.test(), Some("Math.adds"));

        let cleanup = ExecutionMessage::CleanupFailure {
            level: ScopeLevel::Class,
            name: "Math".into(),
            message: "db still open".into(),
        };
        assert_eq!(
            cleanup.to_string(),
            "! Class cleanup failure in Math - db still open"
        );
        assert_eq!(cleanup.test(), None);
    }

    #[test]
    fn test_message_serializes_with_tag() {
        let json = serde_json::to_value(ExecutionMessage::diagnostic("hello")).unwrap();
        assert_eq!(json["type"], "diagnostic");
        assert_eq!(json["message"], "hello");
    }
}
