//! Deadline race: a future against the timer heap.
//!
//! [`wait_for`] spawns the wrapped future as an internal collector task and
//! arms a standalone timeout handle. Both sides write the same one-shot
//! result slot; because the loop is single-threaded, whichever side runs
//! first wins, cancels the loser, and re-enqueues the awaiting task exactly
//! once. The loser either observes its cancellation and is skipped, or finds
//! the slot already written and backs off.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::Error;
use crate::result::ResultSlot;
use crate::runtime::event_loop::{try_with_loop, with_loop};
use crate::runtime::handle::{
    current_handle, next_handle_id, HandleId, HandleInfo, HandleState, Runnable,
};
use crate::task::{create_scheduled_task, CatchUnwind, ScheduledTask};

/// Races `future` against `timeout`.
///
/// Resolves to the future's output when it completes at or before the
/// deadline measured on the loop clock, and to [`Error::Timeout`] otherwise.
/// A failure captured from the future's body is passed through. On timeout
/// the wrapped future is cancelled and never observed completing.
pub fn wait_for<F>(future: F, timeout: Duration) -> WaitFor<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    WaitFor {
        timeout,
        pending: Some(Box::pin(future)),
        shared: Rc::new(RefCell::new(WaitForShared {
            result: ResultSlot::Empty,
            parent: None,
            child: None,
            timeout: None,
        })),
    }
}

/// Future returned by [`wait_for`].
pub struct WaitFor<R: 'static> {
    timeout: Duration,
    /// The wrapped future, held until the race is started on first poll.
    pending: Option<Pin<Box<dyn Future<Output = R>>>>,
    shared: Rc<RefCell<WaitForShared<R>>>,
}

struct WaitForShared<R: 'static> {
    result: ResultSlot<R>,
    parent: Option<HandleInfo>,
    child: Option<ScheduledTask<()>>,
    timeout: Option<HandleInfo>,
}

impl<R: 'static> WaitFor<R> {
    /// Spawns the collector and arms the timeout. Runs on the first poll, so
    /// the parent back reference is in place before either side can fire.
    fn start(&self, future: Pin<Box<dyn Future<Output = R>>>) {
        self.shared.borrow_mut().parent = Some(current_handle());

        let shared = self.shared.clone();
        let child = create_scheduled_task(async move {
            let outcome = CatchUnwind::new(future).await;
            let mut state = shared.borrow_mut();
            if state.result.has_value() {
                // The timeout fired first; the outcome is dropped.
                return;
            }
            match outcome {
                Ok(value) => state.result.set_value(value),
                Err(error) => state.result.set_failure(error),
            }
            let timeout = state.timeout.take();
            let parent = state.parent.take();
            drop(state);
            if let Some(timeout) = timeout {
                with_loop(|event_loop| event_loop.cancel_handle(&timeout));
            }
            if let Some(parent) = parent {
                with_loop(|event_loop| event_loop.call_soon(parent));
            }
        });

        let timer = Rc::new(TimeoutHandle {
            id: next_handle_id(),
            state: Cell::new(HandleState::Unscheduled),
            shared: self.shared.clone(),
        });
        let timer_info = HandleInfo {
            id: timer.id,
            handle: timer,
        };

        {
            let mut state = self.shared.borrow_mut();
            state.child = Some(child);
            state.timeout = Some(timer_info.clone());
        }
        with_loop(|event_loop| event_loop.call_later(self.timeout, timer_info));
    }
}

impl<R: 'static> Future for WaitFor<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(future) = this.pending.take() {
            this.start(future);
            return Poll::Pending;
        }

        let mut shared = this.shared.borrow_mut();
        if shared.result.has_value() {
            return Poll::Ready(shared.result.take());
        }
        if shared.parent.is_none() {
            shared.parent = Some(current_handle());
        }
        Poll::Pending
    }
}

impl<R: 'static> Drop for WaitFor<R> {
    fn drop(&mut self) {
        // Abandoning the race cancels both sides so neither keeps the loop
        // alive or reaches a dead parent.
        let (child, timeout) = {
            let mut shared = self.shared.borrow_mut();
            shared.parent = None;
            (shared.child.take(), shared.timeout.take())
        };
        drop(child);
        if let Some(timeout) = timeout {
            try_with_loop(|event_loop| event_loop.cancel_handle(&timeout));
        }
    }
}

/// Standalone handle armed through `call_later`. Running it means the
/// deadline elapsed first: cancel the collector, record the timeout, wake
/// the parent.
struct TimeoutHandle<R: 'static> {
    id: HandleId,
    state: Cell<HandleState>,
    shared: Rc<RefCell<WaitForShared<R>>>,
}

impl<R: 'static> Runnable for TimeoutHandle<R> {
    fn handle_id(&self) -> HandleId {
        self.id
    }

    fn state(&self) -> HandleState {
        self.state.get()
    }

    fn set_state(&self, state: HandleState) {
        self.state.set(state);
    }

    fn run(self: Rc<Self>) {
        let mut shared = self.shared.borrow_mut();
        shared.timeout = None;
        let child = shared.child.take();
        let parent = if shared.result.has_value() {
            None
        } else {
            shared.result.set_failure(Error::Timeout);
            shared.parent.take()
        };
        drop(shared);
        drop(child);
        if let Some(parent) = parent {
            with_loop(|event_loop| event_loop.call_soon(parent));
        }
    }
}
