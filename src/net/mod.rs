//! Nonblocking TCP networking on top of the reactor.
//!
//! - [`open_connection`] returns a connected [`Stream`]
//! - [`start_server`] binds a [`Server`] that spawns a handler task per
//!   accepted connection
//! - [`Stream`] wraps a nonblocking socket with readiness-driven reads and
//!   writes
//!
//! All failures surface as `io::Result` errors carrying the underlying
//! errno; task code converts them into the runtime error with `?`.

mod connect;
mod server;
mod socket;
mod stream;

pub use connect::open_connection;
pub use server::{start_server, Server};
pub use stream::Stream;
