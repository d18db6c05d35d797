//! Tasks: suspendable computations with a one-shot result slot.
//!
//! A [`Task`] owns a boxed future (the frame) together with the bookkeeping
//! the loop needs: handle id, scheduling state, result slot, and a back
//! reference to the task awaiting it. Awaiting a task schedules it through
//! the ready queue and suspends the caller; when the frame runs to
//! completion the loop re-enqueues the parent, which then reads the result.
//! This forms a strict tree of active awaits rooted at the main task.
//!
//! A [`ScheduledTask`] additionally enqueues its task at construction, which
//! is how concurrency is introduced: the task runs interleaved with its
//! creator instead of only when awaited.
//!
//! Panics escaping a frame are captured into the result slot and re-raised
//! as [`Error::TaskFailed`] at the await site, never inside the loop.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::{panic_message, Error};
use crate::result::ResultSlot;
use crate::runtime::event_loop::{run_until_complete, try_with_loop, with_loop};
use crate::runtime::handle::{
    current_handle, enter_handle, next_handle_id, HandleId, HandleInfo, HandleState, Runnable,
};
use crate::runtime::waker::waker_for;

/// The shared cell behind a task: frame, result slot and await wiring.
pub(crate) struct TaskCell<R> {
    id: HandleId,
    state: Cell<HandleState>,
    frame: RefCell<Option<Pin<Box<dyn Future<Output = R>>>>>,
    result: RefCell<ResultSlot<R>>,
    /// Non-owning back reference to the awaiting task. The parent always
    /// outlives the child: awaiting suspends it until the child completes.
    parent: RefCell<Option<HandleInfo>>,
    completed: Cell<bool>,
    cancelled: Cell<bool>,
    location: &'static Location<'static>,
}

impl<R: 'static> TaskCell<R> {
    fn new(
        future: impl Future<Output = R> + 'static,
        location: &'static Location<'static>,
    ) -> Rc<Self> {
        Rc::new(TaskCell {
            id: next_handle_id(),
            state: Cell::new(HandleState::Unscheduled),
            frame: RefCell::new(Some(Box::pin(future))),
            result: RefCell::new(ResultSlot::Empty),
            parent: RefCell::new(None),
            completed: Cell::new(false),
            cancelled: Cell::new(false),
            location,
        })
    }

    fn info(self: &Rc<Self>) -> HandleInfo {
        HandleInfo {
            id: self.id,
            handle: self.clone() as Rc<dyn Runnable>,
        }
    }

    /// Enqueues the cell unless some loop structure already holds it.
    pub(crate) fn schedule(self: &Rc<Self>) {
        if self.state.get() == HandleState::Unscheduled {
            let info = self.info();
            with_loop(|event_loop| event_loop.call_soon(info));
        }
    }

    /// Tears down the frame and lazily cancels the handle. Safe to call on a
    /// completed cell, where only the flags change.
    fn cancel(self: &Rc<Self>) {
        if let Ok(mut frame) = self.frame.try_borrow_mut() {
            *frame = None;
        }
        self.cancelled.set(true);
        if self.state.get() == HandleState::Scheduled {
            let info = self.info();
            try_with_loop(|event_loop| event_loop.cancel_handle(&info));
        } else {
            self.state.set(HandleState::Unscheduled);
        }
    }

    fn done(&self) -> bool {
        self.completed.get()
    }

    fn valid(&self) -> bool {
        !self.cancelled.get()
    }

    fn parent_is_set(&self) -> bool {
        self.parent.borrow().is_some()
    }

    fn set_parent(&self, info: HandleInfo) {
        let mut parent = self.parent.borrow_mut();
        debug_assert!(parent.is_none(), "task is already being awaited");
        *parent = Some(info);
    }

    /// Re-enqueues the awaiting task, if any. Issued once, from the frame's
    /// completion, so the parent observes a fully written result.
    fn wake_parent(&self) {
        if let Some(parent) = self.parent.borrow_mut().take() {
            with_loop(|event_loop| event_loop.call_soon(parent));
        }
    }

    fn take_result(&self) -> Result<R, Error> {
        self.result.borrow_mut().take()
    }

    fn peek_result(&self) -> Result<R, Error>
    where
        R: Clone,
    {
        self.result.borrow().peek()
    }
}

impl<R: 'static> Runnable for TaskCell<R> {
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
        let mut frame = self.frame.borrow_mut();
        let Some(future) = frame.as_mut() else {
            return;
        };

        let info = HandleInfo {
            id: self.id,
            handle: self.clone() as Rc<dyn Runnable>,
        };
        let waker = waker_for(info.handle.clone());
        let mut context = Context::from_waker(&waker);

        let polled = enter_handle(info, || {
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut context)))
        });

        match polled {
            Ok(Poll::Pending) => {
                // Nothing re-scheduled the frame during the poll: it is
                // parked in the selector or waiting on a child.
                if self.state.get() == HandleState::Unscheduled {
                    self.state.set(HandleState::Suspended);
                }
            }
            Ok(Poll::Ready(value)) => {
                *frame = None;
                drop(frame);
                self.result.borrow_mut().set_value(value);
                self.completed.set(true);
                self.wake_parent();
            }
            Err(payload) => {
                *frame = None;
                drop(frame);
                self.result
                    .borrow_mut()
                    .set_failure(Error::TaskFailed(panic_message(payload)));
                self.completed.set(true);
                self.wake_parent();
            }
        }
    }

    fn dump_backtrace(&self, depth: usize) {
        println!(
            "[{}] task defined at {}:{}",
            depth,
            self.location.file(),
            self.location.line()
        );
        match &*self.parent.borrow() {
            Some(parent) => parent.handle.dump_backtrace(depth + 1),
            None => println!(),
        }
    }
}

/// A lazily started task around a future.
///
/// Awaiting a `Task` yields `Result<R, Error>`: the task's value, the
/// failure captured from its body, or [`Error::InvalidFuture`] when the task
/// was cancelled or consumed. The by-value await moves the result out; a
/// `&Task` can be awaited when `R: Clone` and reads the result idempotently.
///
/// Dropping a task that has not completed cancels it.
pub struct Task<R: 'static> {
    cell: Option<Rc<TaskCell<R>>>,
}

impl<R: 'static> Task<R> {
    /// Wraps a future into a task. The frame does not run until the task is
    /// awaited or scheduled.
    #[track_caller]
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = R> + 'static,
    {
        Task {
            cell: Some(TaskCell::new(future, Location::caller())),
        }
    }

    /// True while the task has not been cancelled or consumed.
    pub fn valid(&self) -> bool {
        self.cell.as_ref().is_some_and(|cell| cell.valid())
    }

    /// True once the frame has run to completion.
    pub fn done(&self) -> bool {
        self.cell.as_ref().is_some_and(|cell| cell.done())
    }

    /// Reads the completed result by clone.
    pub fn get_result(&self) -> Result<R, Error>
    where
        R: Clone,
    {
        match &self.cell {
            Some(cell) if cell.valid() => cell.peek_result(),
            _ => Err(Error::InvalidFuture),
        }
    }

    /// Moves the completed result out, cancelling a frame that never ran.
    pub fn take_result(mut self) -> Result<R, Error> {
        let Some(cell) = self.cell.take() else {
            return Err(Error::InvalidFuture);
        };
        if !cell.valid() {
            return Err(Error::InvalidFuture);
        }
        let result = cell.take_result();
        if !cell.done() {
            cell.cancel();
        }
        result
    }

    pub(crate) fn cell(&self) -> Option<&Rc<TaskCell<R>>> {
        self.cell.as_ref()
    }

    pub(crate) fn drop_cell(&mut self) -> Option<Rc<TaskCell<R>>> {
        self.cell.take()
    }
}

impl<R: 'static> Drop for Task<R> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            if !cell.done() {
                cell.cancel();
            }
        }
    }
}

fn poll_task<R: 'static>(task: &Task<R>) -> Option<Poll<()>> {
    let cell = task.cell.as_ref()?;
    if !cell.valid() {
        return None;
    }
    if cell.done() {
        return Some(Poll::Ready(()));
    }
    if !cell.parent_is_set() {
        // First poll of the await: link the child to the running task and
        // schedule it. The completion wake comes from the child's side.
        cell.set_parent(current_handle());
        cell.schedule();
    }
    Some(Poll::Pending)
}

impl<R: 'static> Future for Task<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match poll_task(this) {
            None => Poll::Ready(Err(Error::InvalidFuture)),
            Some(Poll::Ready(())) => {
                let cell = this.cell.as_ref().expect("task cell checked above");
                Poll::Ready(cell.take_result())
            }
            Some(Poll::Pending) => Poll::Pending,
        }
    }
}

impl<'a, R: Clone + 'static> Future for &'a Task<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let this: &Task<R> = *self.get_mut();
        match poll_task(this) {
            None => Poll::Ready(Err(Error::InvalidFuture)),
            Some(Poll::Ready(())) => {
                let cell = this.cell.as_ref().expect("task cell checked above");
                Poll::Ready(cell.peek_result())
            }
            Some(Poll::Pending) => Poll::Pending,
        }
    }
}

/// An owning handle to a task that was enqueued at construction.
///
/// This is the primary way to run work concurrently with the current task.
/// The handle supports awaiting (by value or by reference), `cancel`, and
/// result inspection. Dropping the handle without awaiting cancels a task
/// that has not finished yet; a completed task is unaffected.
pub struct ScheduledTask<R: 'static> {
    task: Task<R>,
}

impl<R: 'static> ScheduledTask<R> {
    pub fn new(task: Task<R>) -> Self {
        if let Some(cell) = task.cell() {
            if cell.valid() && !cell.done() {
                cell.schedule();
            }
        }
        ScheduledTask { task }
    }

    /// Destroys the owned task. A frame that never ran is dropped on the
    /// spot; its handle is lazily removed from the loop. Awaiting the handle
    /// afterwards yields [`Error::InvalidFuture`].
    pub fn cancel(&mut self) {
        if let Some(cell) = self.task.drop_cell() {
            cell.cancel();
        }
    }

    pub fn valid(&self) -> bool {
        self.task.valid()
    }

    pub fn done(&self) -> bool {
        self.task.done()
    }

    pub fn get_result(&self) -> Result<R, Error>
    where
        R: Clone,
    {
        self.task.get_result()
    }

    pub fn take_result(self) -> Result<R, Error> {
        self.task.take_result()
    }
}

impl<R: 'static> Future for ScheduledTask<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().task).poll(context)
    }
}

impl<'a, R: Clone + 'static> Future for &'a ScheduledTask<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let this: &'a ScheduledTask<R> = *self.get_mut();
        Pin::new(&mut &this.task).poll(context)
    }
}

/// Wraps `future` in a task and enqueues it immediately.
///
/// The task runs concurrently with its creator. Keep the returned handle to
/// await or cancel it; dropping the handle cancels a task that has not run
/// to completion.
#[track_caller]
pub fn create_scheduled_task<F>(future: F) -> ScheduledTask<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    ScheduledTask::new(Task::new(future))
}

/// Drives the loop until `main_task` completes and returns its result.
///
/// The loop also finishes every other handle it knows about before
/// returning: it exits only once the ready queue, the timer heap and the
/// selector are all empty.
#[track_caller]
pub fn run<F>(main_task: F) -> Result<F::Output, Error>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let task = create_scheduled_task(main_task);
    run_until_complete();
    task.take_result()
}

/// Polls an inner future, converting an escaping panic into a captured
/// failure. Used by combinator collectors so that bookkeeping after the
/// child completes runs on the failure path too.
pub(crate) struct CatchUnwind<R> {
    inner: Pin<Box<dyn Future<Output = R>>>,
}

impl<R> CatchUnwind<R> {
    pub(crate) fn new(future: impl Future<Output = R> + 'static) -> Self {
        CatchUnwind {
            inner: Box::pin(future),
        }
    }
}

impl<R> Future for CatchUnwind<R> {
    type Output = Result<R, Error>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(context))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(Error::TaskFailed(panic_message(payload)))),
        }
    }
}

/// Prints the chain of awaits leading to the current task, one frame per
/// line, outermost last. Completes without suspending.
pub fn dump_callstack() -> DumpCallstack {
    DumpCallstack
}

pub struct DumpCallstack;

impl Future for DumpCallstack {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        current_handle().handle.dump_backtrace(0);
        Poll::Ready(())
    }
}
