//! Handle identity and scheduling state.
//!
//! Everything the event loop may run or cancel carries a [`HandleId`] and a
//! scheduling state, and exposes itself through the [`Runnable`] trait. The
//! loop stores handles as [`HandleInfo`] pairs: the id is the cancellation
//! key, the `Rc` is the invocation target. Id generation is a plain
//! thread-local counter; the whole runtime is single-threaded so no atomics
//! are involved.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) type HandleId = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum HandleState {
    /// Not referenced by any loop structure.
    Unscheduled,
    /// Sitting in the ready queue or the timer heap.
    Scheduled,
    /// Parked in the selector or waiting on a child completion.
    Suspended,
}

thread_local! {
    static NEXT_HANDLE_ID: Cell<HandleId> = const { Cell::new(0) };

    /// The handle whose frame is currently being polled by the loop.
    static CURRENT_HANDLE: RefCell<Option<HandleInfo>> = const { RefCell::new(None) };
}

pub(crate) fn next_handle_id() -> HandleId {
    NEXT_HANDLE_ID.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        id
    })
}

/// An entity the event loop can invoke: a task cell or a standalone handle
/// such as a timeout callback.
pub(crate) trait Runnable {
    fn handle_id(&self) -> HandleId;

    fn state(&self) -> HandleState;

    fn set_state(&self, state: HandleState);

    fn run(self: Rc<Self>);

    /// Prints one line for this frame and recurses into the awaiting parent.
    fn dump_backtrace(&self, depth: usize) {
        let _ = depth;
    }
}

/// Id plus invocation target, as stored in the ready queue, the timer heap
/// and the selector registry.
#[derive(Clone)]
pub(crate) struct HandleInfo {
    pub(crate) id: HandleId,
    pub(crate) handle: Rc<dyn Runnable>,
}

/// Runs `body` with `info` installed as the current handle, restoring the
/// previous one on exit. Mirrors how the runtime context is entered for the
/// duration of a poll.
pub(crate) fn enter_handle<T>(info: HandleInfo, body: impl FnOnce() -> T) -> T {
    CURRENT_HANDLE.with(|current| {
        let previous = current.borrow_mut().replace(info);
        let output = body();
        *current.borrow_mut() = previous;
        output
    })
}

/// Returns the handle of the task being polled right now.
///
/// # Panics
/// Panics when called outside of a running task, i.e. not within
/// `soloop::run`.
pub(crate) fn current_handle() -> HandleInfo {
    CURRENT_HANDLE.with(|current| current.borrow().clone()).expect(
        "no task is currently running; awaitables must be polled from within soloop::run",
    )
}
