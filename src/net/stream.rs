//! Nonblocking TCP stream driven by readiness events.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use crate::net::socket;
use crate::reactor::{wait_readable, wait_writable};

/// A nonblocking socket owned by the runtime.
///
/// Reads and writes first await readiness on the fd, then issue the syscall.
/// The readiness model is level-triggered, so a partial transfer simply
/// waits and fires again. The socket is closed on drop.
pub struct Stream {
    fd: RawFd,
    addr: Option<SocketAddr>,
}

impl Stream {
    /// Wraps a connected fd, remembering its local address.
    pub(crate) fn new(fd: RawFd) -> Self {
        let addr = socket::local_addr(fd).ok();
        Stream { fd, addr }
    }

    /// Wraps an accepted fd together with the peer address.
    pub(crate) fn with_addr(fd: RawFd, addr: Option<SocketAddr>) -> Self {
        Stream { fd, addr }
    }

    /// The address captured at construction: the peer for accepted streams,
    /// the local address for outgoing connections.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Reads up to `size` bytes. Waits for readability, then issues a single
    /// `read`; the result may be shorter than requested and is empty at end
    /// of stream.
    pub async fn read(&self, size: usize) -> io::Result<Vec<u8>> {
        wait_readable(self.fd).await?;
        let mut buffer = vec![0u8; size];
        let count = unsafe { libc::read(self.fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };
        if count < 0 {
            return Err(io::Error::last_os_error());
        }
        buffer.truncate(count as usize);
        Ok(buffer)
    }

    /// Reads until end of stream, concatenating chunks.
    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut result = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            wait_readable(self.fd).await?;
            let count = unsafe { libc::read(self.fd, chunk.as_mut_ptr() as *mut _, chunk.len()) };
            if count < 0 {
                return Err(io::Error::last_os_error());
            }
            if count == 0 {
                return Ok(result);
            }
            result.extend_from_slice(&chunk[..count as usize]);
        }
    }

    /// Writes the whole buffer, awaiting writability before every partial
    /// `write`.
    pub async fn write(&self, buffer: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < buffer.len() {
            wait_writable(self.fd).await?;
            let count = unsafe {
                libc::write(
                    self.fd,
                    buffer[written..].as_ptr() as *const _,
                    buffer.len() - written,
                )
            };
            if count < 0 {
                return Err(io::Error::last_os_error());
            }
            if count == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }
            written += count as usize;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if self.fd >= 0 {
            socket::close_fd(self.fd);
            self.fd = -1;
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}
