//! Listening server that spawns a handler task per connection.

use std::future::Future;
use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::RawFd;

use log::warn;

use crate::net::socket;
use crate::net::stream::Stream;
use crate::reactor::wait_readable;
use crate::task::{create_scheduled_task, ScheduledTask};

const LISTEN_BACKLOG: libc::c_int = 16;

/// A bound, listening TCP server. Created by [`start_server`].
pub struct Server<H> {
    handler: H,
    fd: RawFd,
}

impl<H, F> Server<H>
where
    H: Fn(Stream) -> F,
    F: Future<Output = ()> + 'static,
{
    /// Accepts clients forever, spawning `handler(stream)` as a detached
    /// task per connection. Returns only on listener failure; stop it by
    /// cancelling the task that runs it.
    pub async fn serve_forever(&self) -> io::Result<()> {
        let mut connected: Vec<ScheduledTask<()>> = Vec::new();
        loop {
            wait_readable(self.fd).await?;

            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            let client = unsafe {
                libc::accept(
                    self.fd,
                    &mut storage as *mut _ as *mut libc::sockaddr,
                    &mut len,
                )
            };
            if client < 0 {
                let error = io::Error::last_os_error();
                if error.kind() != io::ErrorKind::WouldBlock {
                    warn!("accept failed: {error}");
                }
                continue;
            }
            if let Err(error) = socket::set_nonblocking(client) {
                warn!("could not set accepted socket nonblocking: {error}");
                socket::close_fd(client);
                continue;
            }

            let stream = Stream::with_addr(client, socket::from_storage(&storage));
            connected.push(create_scheduled_task((self.handler)(stream)));
            if connected.len() >= 100 {
                connected.retain(|task| !task.done());
            }
        }
    }

    /// The address the listener is bound to. With port 0 this reports the
    /// port the kernel picked.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        socket::local_addr(self.fd)
    }
}

impl<H> Drop for Server<H> {
    fn drop(&mut self) {
        if self.fd >= 0 {
            socket::close_fd(self.fd);
            self.fd = -1;
        }
    }
}

/// Binds a listening socket on `ip:port` and returns a [`Server`] that will
/// run `handler` for every accepted connection.
///
/// Every resolved address is tried with `SO_REUSEADDR` until one binds.
/// Fails with `AddrNotAvailable` when none does.
pub async fn start_server<H, F>(handler: H, ip: &str, port: u16) -> io::Result<Server<H>>
where
    H: Fn(Stream) -> F,
    F: Future<Output = ()> + 'static,
{
    let addrs: Vec<SocketAddr> = (ip, port).to_socket_addrs()?.collect();

    let mut server_fd = -1;
    for addr in &addrs {
        let fd = match socket::new_stream_socket(addr) {
            Ok(fd) => fd,
            Err(_) => continue,
        };
        let yes: libc::c_int = 1;
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &yes as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
        let (storage, len) = socket::to_storage(addr);
        let rc = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
        if rc == 0 {
            server_fd = fd;
            break;
        }
        socket::close_fd(fd);
    }

    if server_fd < 0 {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no address could be bound",
        ));
    }

    let rc = unsafe { libc::listen(server_fd, LISTEN_BACKLOG) };
    if rc < 0 {
        let error = io::Error::last_os_error();
        socket::close_fd(server_fd);
        return Err(error);
    }

    Ok(Server {
        handler,
        fd: server_fd,
    })
}
