//! Error taxonomy for the runtime.
//!
//! Four kinds of failure flow through the result channel: timeouts raised by
//! [`wait_for`](crate::time::wait_for), logic errors from misusing task
//! handles, captured panics escaping a task body, and wrapped system errors
//! from the I/O layer. All of them surface at the await site of the task that
//! observes them, never inside the loop itself.

use std::any::Any;
use std::io;

use thiserror::Error;

/// Failure observed when reading a task result or driving a combinator.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The deadline of a [`wait_for`](crate::time::wait_for) elapsed first.
    #[error("operation timed out")]
    Timeout,

    /// The awaited task was cancelled or its handle was already consumed.
    #[error("future is invalid or was cancelled")]
    InvalidFuture,

    /// The result slot was read before the task produced a value.
    #[error("result is unset")]
    NoResult,

    /// A panic escaped the task body; the payload message is preserved.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A system error from the networking layer, keeping the errno value.
    #[error("{message}")]
    Io {
        kind: io::ErrorKind,
        code: Option<i32>,
        message: String,
    },
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io {
            kind: error.kind(),
            code: error.raw_os_error(),
            message: error.to_string(),
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
