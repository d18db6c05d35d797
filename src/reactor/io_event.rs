//! Scoped wait-for-readiness futures.
//!
//! `wait_readable` / `wait_writable` register the running task with the
//! selector on first poll and complete on the wake that follows. The
//! registration is released in `Drop`, so it disappears on every exit path,
//! including cancellation of the owning task. This is what lets the loop's
//! registration count return to zero and the loop terminate.

use std::future::Future;
use std::io;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::reactor::selector::Interest;
use crate::runtime::event_loop::{try_with_loop, with_loop};
use crate::runtime::handle::current_handle;

pub(crate) struct WaitIoEvent {
    fd: RawFd,
    interest: Interest,
    registered: bool,
}

/// Suspends the current task until `fd` is readable.
pub(crate) fn wait_readable(fd: RawFd) -> WaitIoEvent {
    WaitIoEvent {
        fd,
        interest: Interest::Readable,
        registered: false,
    }
}

/// Suspends the current task until `fd` is writable.
pub(crate) fn wait_writable(fd: RawFd) -> WaitIoEvent {
    WaitIoEvent {
        fd,
        interest: Interest::Writable,
        registered: false,
    }
}

impl Future for WaitIoEvent {
    type Output = io::Result<()>;

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            // The selector fired for this fd; readiness is level-triggered,
            // so the caller can issue its syscall now.
            return Poll::Ready(Ok(()));
        }

        let info = current_handle();
        let (fd, interest) = (self.fd, self.interest);
        match with_loop(|event_loop| event_loop.selector.register(fd, interest, info)) {
            Ok(()) => {
                self.registered = true;
                Poll::Pending
            }
            Err(error) => Poll::Ready(Err(error)),
        }
    }
}

impl Drop for WaitIoEvent {
    fn drop(&mut self) {
        if self.registered {
            let (fd, interest) = (self.fd, self.interest);
            try_with_loop(|event_loop| event_loop.selector.remove(fd, interest));
        }
    }
}
