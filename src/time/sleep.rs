//! Sleep futures for asynchronous delays.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::runtime::event_loop::with_loop;
use crate::runtime::handle::current_handle;

/// A future that completes once its delay has elapsed on the loop clock.
///
/// The current task is parked in the timer heap on the first poll. A zero
/// delay does not complete inline: the task still goes through the heap and
/// resumes on a later tick, so even `sleep(Duration::ZERO)` yields to other
/// ready tasks.
pub struct Sleep {
    duration: Duration,
    registered: bool,
}

/// Suspends the current task for `duration`.
///
/// # Panics
/// Panics if polled outside of a running task.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        duration,
        registered: false,
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            // The timer fired and the loop re-ran this task.
            return Poll::Ready(());
        }

        let info = current_handle();
        let duration = self.duration;
        with_loop(|event_loop| event_loop.call_later(duration, info));
        self.registered = true;
        Poll::Pending
    }
}
