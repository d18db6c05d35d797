//! The event loop: ready queue, timer heap, cancellation set and reactor.
//!
//! One loop exists per thread, behind a lazily-initialized thread-local
//! accessor. All scheduling goes through three entry points:
//!
//! - `call_soon` pushes a handle onto the FIFO ready queue,
//! - `call_later` parks a handle in the timer heap until its deadline,
//! - `cancel_handle` marks an id so the loop drops it on next encounter.
//!
//! Cancellation is lazy on purpose: cancelling never has to locate an entry
//! inside the heap or the queue. The id check when an entry is popped is the
//! single source of truth, and the heap is additionally pruned at its top
//! after every tick so cancelled timers cannot keep the loop alive.
//!
//! Each tick polls the reactor with a timeout derived from the two queues,
//! expires due timers, then drains a snapshot of the ready queue: handles
//! enqueued while the snapshot runs go to the tail and only execute on the
//! next tick. That snapshot rule is the loop's fairness guarantee. The loop
//! stops once the ready queue, the timer heap and the reactor registry are
//! all empty.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::debug;

use crate::reactor::selector::Selector;
use crate::runtime::handle::{HandleId, HandleInfo, HandleState};

thread_local! {
    static EVENT_LOOP: RefCell<EventLoop> = RefCell::new(EventLoop::new());
}

/// Runs `body` against this thread's event loop.
///
/// The borrow is released when `body` returns; nothing that can re-enter the
/// loop (in particular `Runnable::run`) may be called while it is held.
pub(crate) fn with_loop<T>(body: impl FnOnce(&mut EventLoop) -> T) -> T {
    EVENT_LOOP.with(|event_loop| body(&mut event_loop.borrow_mut()))
}

/// Like [`with_loop`] but a no-op when the loop is already torn down.
/// Used from `Drop` implementations that may run during thread exit.
pub(crate) fn try_with_loop<T>(body: impl FnOnce(&mut EventLoop) -> T) -> Option<T> {
    EVENT_LOOP
        .try_with(|event_loop| body(&mut event_loop.borrow_mut()))
        .ok()
}

/// Timer heap entry ordered by deadline, with a sequence number so equal
/// deadlines drain in insertion order.
struct TimerEntry {
    when: u64,
    seq: u64,
    info: HandleInfo,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

pub(crate) struct EventLoop {
    /// Reference point of the loop clock.
    start: Instant,
    ready: VecDeque<HandleInfo>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    cancelled: HashSet<HandleId>,
    timer_seq: u64,
    pub(crate) selector: Selector,
}

impl EventLoop {
    fn new() -> Self {
        EventLoop {
            start: Instant::now(),
            ready: VecDeque::new(),
            timers: BinaryHeap::new(),
            cancelled: HashSet::new(),
            timer_seq: 0,
            selector: Selector::new(),
        }
    }

    /// Whole milliseconds since the loop was constructed.
    pub(crate) fn time(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Enqueues a handle to run on the next drain. A handle already in the
    /// `Scheduled` state is left where it is, so a handle never appears in
    /// the ready queue twice.
    pub(crate) fn call_soon(&mut self, info: HandleInfo) {
        if info.handle.state() == HandleState::Scheduled {
            return;
        }
        info.handle.set_state(HandleState::Scheduled);
        self.ready.push_back(info);
    }

    /// Parks a handle in the timer heap to run once `delay` has elapsed.
    pub(crate) fn call_later(&mut self, delay: Duration, info: HandleInfo) {
        let when = self.time() + delay.as_millis() as u64;
        info.handle.set_state(HandleState::Scheduled);
        let seq = self.timer_seq;
        self.timer_seq += 1;
        self.timers.push(Reverse(TimerEntry { when, seq, info }));
    }

    /// Marks a handle cancelled. The entry itself stays in whatever structure
    /// holds it and is discarded when the loop next encounters the id.
    pub(crate) fn cancel_handle(&mut self, info: &HandleInfo) {
        info.handle.set_state(HandleState::Unscheduled);
        self.cancelled.insert(info.id);
        debug!("handle {} marked cancelled", info.id);
    }

    /// Selector timeout for the next poll: zero when work is ready, the gap
    /// to the nearest deadline when timers are pending, infinite otherwise.
    fn poll_timeout(&self) -> Option<Duration> {
        if !self.ready.is_empty() {
            return Some(Duration::ZERO);
        }
        self.timers
            .peek()
            .map(|entry| Duration::from_millis(entry.0.when.saturating_sub(self.time())))
    }

    /// Moves every timer whose deadline lies strictly in the past onto the
    /// ready queue. An entry due exactly now fires on a later tick, which
    /// keeps zero-delay sleeps from running in their own tick.
    fn expire_timers(&mut self) {
        let now = self.time();
        while self.timers.peek().is_some_and(|entry| entry.0.when < now) {
            if let Some(Reverse(entry)) = self.timers.pop() {
                self.ready.push_back(entry.info);
            }
        }
    }

    /// Pops the next ready handle, consuming a cancellation instead of
    /// returning the handle when its id was marked.
    fn next_ready(&mut self) -> Option<HandleInfo> {
        let info = self.ready.pop_front()?;
        if self.cancelled.remove(&info.id) {
            debug!("handle {} skipped: cancelled", info.id);
            return None;
        }
        info.handle.set_state(HandleState::Unscheduled);
        Some(info)
    }

    /// Discards cancelled entries sitting at the top of the timer heap.
    /// Deeper entries wait until they surface; the amortized cost is what
    /// makes cancellation O(1).
    fn prune_timers(&mut self) {
        while self
            .timers
            .peek()
            .is_some_and(|entry| self.cancelled.contains(&entry.0.info.id))
        {
            if let Some(Reverse(entry)) = self.timers.pop() {
                self.cancelled.remove(&entry.info.id);
            }
        }
    }

    fn is_stop(&self) -> bool {
        self.ready.is_empty() && self.timers.is_empty() && self.selector.is_empty()
    }
}

/// Ticks the loop until every queue is drained and no I/O interest remains.
pub(crate) fn run_until_complete() {
    while !with_loop(|event_loop| event_loop.is_stop()) {
        run_once();
    }
}

/// One tick: poll the selector, expire timers, drain a snapshot of the ready
/// queue, prune cancelled timers.
fn run_once() {
    let scheduled = with_loop(|event_loop| {
        let timeout = event_loop.poll_timeout();
        let fired = event_loop.selector.select(timeout);
        for info in fired {
            event_loop.call_soon(info);
        }
        event_loop.expire_timers();
        event_loop.ready.len()
    });

    // The loop borrow must not be held across `run`: the frame being polled
    // re-enters the loop to schedule timers, I/O interest and children.
    for _ in 0..scheduled {
        let next = with_loop(|event_loop| event_loop.next_ready());
        if let Some(info) = next {
            info.handle.run();
        }
    }

    with_loop(|event_loop| event_loop.prune_timers());
}

/// The loop clock, exposed for elapsed-time measurements against the same
/// reference the timer heap uses.
pub(crate) fn loop_time() -> Duration {
    with_loop(|event_loop| Duration::from_millis(event_loop.time()))
}
