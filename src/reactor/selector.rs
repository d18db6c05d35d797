//! Level-triggered epoll selector.
//!
//! Manages kernel readiness notifications for file descriptors. Interests
//! are tracked per fd and per direction: registering a second waiter on an
//! occupied `(fd, direction)` slot is refused with `EEXIST`, and adding the
//! opposite direction upgrades the existing epoll entry with `EPOLL_CTL_MOD`.
//! That keeps the registry count exact, which matters because the loop's
//! termination test relies on it reaching zero.
//!
//! The selector never computes any I/O itself; it only reports which handles
//! to wake. Fired interests stay installed (level-triggered) until the
//! waiting future removes them.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

use log::debug;

use crate::runtime::handle::HandleInfo;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Interest {
    Readable,
    Writable,
}

#[derive(Default)]
struct FdEntry {
    read: Option<HandleInfo>,
    write: Option<HandleInfo>,
}

impl FdEntry {
    fn mask(&self) -> u32 {
        let mut mask = 0u32;
        if self.read.is_some() {
            mask |= libc::EPOLLIN as u32;
        }
        if self.write.is_some() {
            mask |= libc::EPOLLOUT as u32;
        }
        mask
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

pub(crate) struct Selector {
    epoll_fd: RawFd,
    registry: HashMap<RawFd, FdEntry>,
    /// Scratch buffer handed to `epoll_wait`.
    events: Vec<libc::epoll_event>,
}

impl Selector {
    pub(crate) fn new() -> Self {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        assert!(
            epoll_fd >= 0,
            "epoll_create1 failed: {}",
            io::Error::last_os_error()
        );

        Selector {
            epoll_fd,
            registry: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// No interests outstanding; part of the loop termination test.
    pub(crate) fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Registers `info` to be woken when `fd` becomes ready in the given
    /// direction. An already-occupied slot is a duplicate interest and is
    /// refused without touching the registration count.
    pub(crate) fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        info: HandleInfo,
    ) -> io::Result<()> {
        let entry = self.registry.entry(fd).or_default();
        let known = entry.mask();
        let slot = match interest {
            Interest::Readable => &mut entry.read,
            Interest::Writable => &mut entry.write,
        };
        if slot.is_some() {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }
        *slot = Some(info);

        let op = if known == 0 {
            libc::EPOLL_CTL_ADD
        } else {
            libc::EPOLL_CTL_MOD
        };
        let mut event = libc::epoll_event {
            events: entry.mask(),
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if rc < 0 {
            let error = io::Error::last_os_error();
            match interest {
                Interest::Readable => entry.read = None,
                Interest::Writable => entry.write = None,
            }
            if entry.is_empty() {
                self.registry.remove(&fd);
            }
            return Err(error);
        }
        Ok(())
    }

    /// Drops the interest on `(fd, direction)`. The registry entry is
    /// released even when the kernel call fails: the fd may already be
    /// closed, and a stale entry would keep the loop alive forever.
    pub(crate) fn remove(&mut self, fd: RawFd, interest: Interest) {
        let Some(entry) = self.registry.get_mut(&fd) else {
            return;
        };
        match interest {
            Interest::Readable => entry.read = None,
            Interest::Writable => entry.write = None,
        }

        if entry.is_empty() {
            self.registry.remove(&fd);
            let rc = unsafe {
                libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut())
            };
            if rc < 0 {
                debug!(
                    "epoll_ctl del on fd {fd} failed: {}",
                    io::Error::last_os_error()
                );
            }
        } else {
            let mut event = libc::epoll_event {
                events: entry.mask(),
                u64: fd as u64,
            };
            let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_MOD, fd, &mut event) };
            if rc < 0 {
                debug!(
                    "epoll_ctl mod on fd {fd} failed: {}",
                    io::Error::last_os_error()
                );
            }
        }
    }

    /// Blocks for up to `timeout` (`None` = indefinitely) and returns the
    /// handles whose interests fired. Error and hang-up conditions wake both
    /// directions so the I/O code gets to observe the failure.
    pub(crate) fn select(&mut self, timeout: Option<Duration>) -> Vec<HandleInfo> {
        let capacity = self.registry.len().max(1);
        self.events.clear();
        self.events
            .resize(capacity, libc::epoll_event { events: 0, u64: 0 });

        let timeout_ms = match timeout {
            Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let count = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                capacity as i32,
                timeout_ms,
            )
        };
        if count < 0 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                return Vec::new();
            }
            panic!("epoll_wait failed: {error}");
        }

        let mut fired = Vec::new();
        for event in &self.events[..count as usize] {
            let fd = event.u64 as RawFd;
            let Some(entry) = self.registry.get(&fd) else {
                continue;
            };
            let revents = event.events;
            let failed = revents & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0;
            if revents & libc::EPOLLIN as u32 != 0 || failed {
                if let Some(info) = &entry.read {
                    fired.push(info.clone());
                }
            }
            if revents & libc::EPOLLOUT as u32 != 0 || failed {
                if let Some(info) = &entry.write {
                    fired.push(info.clone());
                }
            }
        }
        fired
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}
