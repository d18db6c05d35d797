//! Client-side connection setup.

use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::RawFd;

use crate::net::socket;
use crate::net::stream::Stream;
use crate::reactor::wait_writable;

/// Nonblocking `connect`: an immediate success returns right away, an
/// `EINPROGRESS` start waits for writability and then reads `SO_ERROR` to
/// learn the outcome. `Ok(false)` means this address refused; try the next.
async fn connect_addr(fd: RawFd, addr: &SocketAddr) -> io::Result<bool> {
    let (storage, len) = socket::to_storage(addr);
    let rc = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if rc == 0 {
        return Ok(true);
    }
    let error = io::Error::last_os_error();
    if error.raw_os_error() != Some(libc::EINPROGRESS) {
        return Err(error);
    }

    wait_writable(fd).await?;

    let mut status: libc::c_int = 0;
    let mut status_len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut status as *mut _ as *mut libc::c_void,
            &mut status_len,
        )
    };
    if rc < 0 {
        return Ok(false);
    }
    Ok(status == 0)
}

/// Opens a TCP connection to `ip:port` and returns the connected [`Stream`].
///
/// The name is resolved synchronously; every resolved address is tried in
/// order with a nonblocking connect, and the first success wins. Fails with
/// `AddrNotAvailable` when no address could be connected.
pub async fn open_connection(ip: &str, port: u16) -> io::Result<Stream> {
    let addrs: Vec<SocketAddr> = (ip, port).to_socket_addrs()?.collect();

    for addr in &addrs {
        let fd = match socket::new_stream_socket(addr) {
            Ok(fd) => fd,
            Err(_) => continue,
        };
        match connect_addr(fd, addr).await {
            Ok(true) => return Ok(Stream::new(fd)),
            Ok(false) => socket::close_fd(fd),
            Err(error) => {
                socket::close_fd(fd);
                return Err(error);
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "no address could be connected",
    ))
}
