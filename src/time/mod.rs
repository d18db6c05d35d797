//! Time utilities: async sleep, deadline races, and task timing.
//!
//! - [`sleep`] for non-blocking delays driven by the loop's timer heap
//! - [`wait_for`] for racing a future against a deadline
//! - [`wrapper::Timed`] for measuring the elapsed time of awaited work
//! - [`loop_time`] for reading the loop clock
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use soloop::{run, sleep, wait_for, Error};
//!
//! let result = run(async {
//!     wait_for(sleep(Duration::from_millis(50)), Duration::from_millis(10)).await
//! });
//! assert!(matches!(result, Ok(Err(Error::Timeout))));
//! ```

pub mod sleep;
pub mod wait_for;
pub mod wrapper;

use std::time::Duration;

pub use sleep::sleep;
pub use wait_for::wait_for;
pub use wrapper::Timed;

use crate::runtime::event_loop;

/// Milliseconds elapsed since the loop was constructed, as a [`Duration`].
///
/// This is the clock the timer heap runs on; use it for elapsed-time
/// assertions about sleeps and timeouts.
pub fn loop_time() -> Duration {
    event_loop::loop_time()
}
