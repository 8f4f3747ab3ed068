//! Utility modules

use std::any::Any;

pub mod logger;
pub mod timer;

pub use logger::{init_logger, try_init_logger, LogLevel};
pub use timer::ExecutionTimer;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
