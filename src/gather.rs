//! N-way join with fail-fast semantics.
//!
//! [`gather`] takes a tuple of futures, spawns each one as an internal
//! collector task, and resolves to the tuple of their outputs indexed by
//! position, not by completion order. The first captured failure latches and
//! completes the gather as failed; a sibling that finishes afterwards finds
//! the failure already recorded and its value is dropped silently. Siblings
//! still running are not actively cancelled by the failure, they only die
//! when the gather value itself is dropped.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::error::Error;
use crate::runtime::event_loop::with_loop;
use crate::runtime::handle::{current_handle, HandleInfo};
use crate::task::{create_scheduled_task, CatchUnwind, ScheduledTask};

/// Joins a tuple of futures (arity 1 to 8) into a tuple of outputs.
///
/// ```ignore
/// let (a, b, c) = gather((task_a(), task_b(), task_c())).await?;
/// ```
pub fn gather<L: GatherList>(futures: L) -> Gather<L> {
    Gather {
        shared: Rc::new(RefCell::new(GatherShared::new())),
        pending: Some(futures),
        children: Vec::new(),
    }
}

/// Future returned by [`gather`].
pub struct Gather<L: GatherList> {
    shared: Rc<RefCell<GatherShared<L::Slots>>>,
    /// The futures tuple, held until the children are spawned on first poll.
    pending: Option<L>,
    /// Keeps the collector tasks alive for the lifetime of the gather.
    children: Vec<ScheduledTask<()>>,
}

// The tuple in `pending` is only ever moved out whole, never polled in
// place, so the gather itself has no pinned contents.
impl<L: GatherList> Unpin for Gather<L> {}

/// Shared state between a gather and its collector tasks.
#[doc(hidden)]
pub struct GatherShared<S> {
    slots: S,
    finished: usize,
    total: usize,
    failure: Option<Error>,
    parent: Option<HandleInfo>,
    woken: bool,
}

impl<S: Default> GatherShared<S> {
    fn new() -> Self {
        GatherShared {
            slots: S::default(),
            finished: 0,
            total: 0,
            failure: None,
            parent: None,
            woken: false,
        }
    }
}

/// Tuples of futures that can be gathered. Implemented for arities 1..=8.
pub trait GatherList {
    /// Tuple of `Option<output>` collection slots.
    type Slots: Default + 'static;
    /// Tuple of outputs, by position.
    type Output;

    const LEN: usize;

    #[doc(hidden)]
    fn spawn(self, shared: &Rc<RefCell<GatherShared<Self::Slots>>>) -> Vec<ScheduledTask<()>>;

    #[doc(hidden)]
    fn assemble(slots: Self::Slots) -> Self::Output;
}

impl<L: GatherList> Future for Gather<L> {
    type Output = Result<L::Output, Error>;

    fn poll(self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(list) = this.pending.take() {
            {
                let mut state = this.shared.borrow_mut();
                state.total = L::LEN;
                state.parent = Some(current_handle());
            }
            this.children = list.spawn(&this.shared);
            return Poll::Pending;
        }

        let mut state = this.shared.borrow_mut();
        if let Some(error) = state.failure.take() {
            drop(state);
            // Completing the gather ends the join: collectors that are
            // still running die with their handles.
            this.children.clear();
            return Poll::Ready(Err(error));
        }
        if state.finished == state.total {
            let slots = std::mem::take(&mut state.slots);
            drop(state);
            this.children.clear();
            return Poll::Ready(Ok(L::assemble(slots)));
        }
        if state.parent.is_none() {
            state.parent = Some(current_handle());
        }
        Poll::Pending
    }
}

/// Spawns one collector: await the child, record its outcome, and wake the
/// gather's parent once the join is decided.
fn collect<F, S, W>(
    future: F,
    shared: Rc<RefCell<GatherShared<S>>>,
    write: W,
) -> ScheduledTask<()>
where
    F: Future + 'static,
    F::Output: 'static,
    S: Default + 'static,
    W: FnOnce(&mut S, F::Output) + 'static,
{
    create_scheduled_task(async move {
        let outcome = CatchUnwind::new(future).await;
        let mut state = shared.borrow_mut();
        match outcome {
            Ok(value) => {
                if state.failure.is_none() {
                    write(&mut state.slots, value);
                    state.finished += 1;
                }
            }
            Err(error) => {
                if state.failure.is_none() {
                    state.failure = Some(error);
                }
            }
        }
        let decided = state.failure.is_some() || state.finished == state.total;
        if decided && !state.woken {
            state.woken = true;
            let parent = state.parent.take();
            drop(state);
            if let Some(parent) = parent {
                with_loop(|event_loop| event_loop.call_soon(parent));
            }
        }
    })
}

macro_rules! count_one {
    ($future:ident) => {
        1
    };
}

macro_rules! gather_list {
    ($(($future:ident, $slot:tt)),+) => {
        impl<$($future),+> GatherList for ($($future,)+)
        where
            $($future: Future + 'static, $future::Output: 'static,)+
        {
            type Slots = ($(Option<$future::Output>,)+);
            type Output = ($($future::Output,)+);

            const LEN: usize = 0 $(+ count_one!($future))+;

            fn spawn(
                self,
                shared: &Rc<RefCell<GatherShared<Self::Slots>>>,
            ) -> Vec<ScheduledTask<()>> {
                #[allow(non_snake_case)]
                let ($($future,)+) = self;
                vec![$(collect($future, shared.clone(), |slots, value| {
                    slots.$slot = Some(value);
                })),+]
            }

            fn assemble(slots: Self::Slots) -> Self::Output {
                ($(slots.$slot.expect("gather child finished without a value"),)+)
            }
        }
    };
}

gather_list!((F0, 0));
gather_list!((F0, 0), (F1, 1));
gather_list!((F0, 0), (F1, 1), (F2, 2));
gather_list!((F0, 0), (F1, 1), (F2, 2), (F3, 3));
gather_list!((F0, 0), (F1, 1), (F2, 2), (F3, 3), (F4, 4));
gather_list!((F0, 0), (F1, 1), (F2, 2), (F3, 3), (F4, 4), (F5, 5));
gather_list!((F0, 0), (F1, 1), (F2, 2), (F3, 3), (F4, 4), (F5, 5), (F6, 6));
gather_list!(
    (F0, 0),
    (F1, 1),
    (F2, 2),
    (F3, 3),
    (F4, 4),
    (F5, 5),
    (F6, 6),
    (F7, 7)
);
