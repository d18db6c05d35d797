//! Single-threaded cooperative async runtime with an epoll reactor.
//!
//! `soloop` drives user-written futures through one event loop per thread.
//! Tasks yield only at explicit await points; a single call to [`run`]
//! installs the main task and ticks the loop until everything it knows
//! about has drained.
//!
//! # Architecture
//!
//! - **Event loop**: FIFO ready queue, min-heap of timers, lazy cancel set
//!   and the selector, driven one tick at a time
//! - **Selector**: level-triggered epoll reactor, the only place the loop
//!   blocks
//! - **Task / ScheduledTask**: suspendable computation with a one-shot
//!   result slot and parent/child continuation wiring
//! - **Combinators**: [`sleep`], [`wait_for`], [`gather`], [`yield_now`]
//! - **Networking**: nonblocking TCP [`Stream`], [`open_connection`] and
//!   [`start_server`]
//!
//! # Example
//!
//! ```ignore
//! use soloop::{create_scheduled_task, run, sleep, Task};
//! use std::time::Duration;
//!
//! async fn say_after(delay: Duration, what: &str) {
//!     soloop::sleep(delay).await;
//!     println!("{what}");
//! }
//!
//! run(async {
//!     let hello = create_scheduled_task(say_after(Duration::from_millis(100), "hello"));
//!     let world = create_scheduled_task(say_after(Duration::from_millis(200), "world"));
//!     hello.await.unwrap();
//!     world.await.unwrap();
//! })
//! .unwrap();
//! ```

mod error;
mod gather;
mod reactor;
mod result;
mod runtime;
mod task;

pub mod net;
pub mod time;

pub use error::Error;
pub use gather::{gather, Gather, GatherList, GatherShared};
pub use net::{open_connection, start_server, Server, Stream};
pub use runtime::yield_now::yield_now;
pub use task::{
    create_scheduled_task, dump_callstack, run, DumpCallstack, ScheduledTask, Task,
};
pub use time::{loop_time, sleep, wait_for, Timed};
