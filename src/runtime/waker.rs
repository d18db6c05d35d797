//! Waker implementation for task wake-up notifications.
//!
//! Bridges the standard Rust waking protocol to the event loop: waking a
//! handle re-enqueues it through `call_soon`. Implemented with [`RawWaker`]
//! and [`RawWakerVTable`] over an `Rc`, which is sound here because the
//! runtime is strictly single-threaded and wakers never leave the loop
//! thread.
//!
//! [`RawWaker`]: std::task::RawWaker
//! [`RawWakerVTable`]: std::task::RawWakerVTable

use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

use crate::runtime::event_loop::try_with_loop;
use crate::runtime::handle::{HandleInfo, Runnable};

/// Wrapper that re-enqueues its handle when woken.
struct HandleWaker {
    handle: Rc<dyn Runnable>,
}

impl HandleWaker {
    fn wake(self: &Rc<Self>) {
        let info = HandleInfo {
            id: self.handle.handle_id(),
            handle: self.handle.clone(),
        };
        try_with_loop(|event_loop| event_loop.call_soon(info));
    }

    fn clone_raw(data_ptr: *const ()) -> RawWaker {
        unsafe {
            let rc = Rc::<HandleWaker>::from_raw(data_ptr as *const HandleWaker);
            let cloned = rc.clone();
            std::mem::forget(rc);

            RawWaker::new(Rc::into_raw(cloned) as *const (), &Self::VTABLE)
        }
    }

    fn wake_raw(data_ptr: *const ()) {
        unsafe {
            let rc = Rc::<HandleWaker>::from_raw(data_ptr as *const HandleWaker);
            rc.wake();
        }
    }

    fn wake_by_ref_raw(data_ptr: *const ()) {
        unsafe {
            let rc = Rc::<HandleWaker>::from_raw(data_ptr as *const HandleWaker);
            rc.wake();
            let _ = Rc::into_raw(rc);
        }
    }

    fn drop_raw(data_ptr: *const ()) {
        unsafe {
            drop(Rc::<HandleWaker>::from_raw(data_ptr as *const HandleWaker));
        }
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Creates a [`Waker`] that schedules `handle` back onto the ready queue.
pub(crate) fn waker_for(handle: Rc<dyn Runnable>) -> Waker {
    let handle_waker = Rc::new(HandleWaker { handle });
    let raw_waker = RawWaker::new(
        Rc::into_raw(handle_waker) as *const (),
        &HandleWaker::VTABLE,
    );

    unsafe { Waker::from_raw(raw_waker) }
}
