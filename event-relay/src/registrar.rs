//! Edge-triggered read-readiness registration on a single epoll instance.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::fd;

/// Interest mask used for every registered descriptor.
const READ_EDGE: EpollFlags = EpollFlags::EPOLLIN.union(EpollFlags::EPOLLET);

/// Accepted connections also report a peer that shut down its write side.
const STREAM_EDGE: EpollFlags = READ_EDGE.union(EpollFlags::EPOLLRDHUP);

/// Events after which a connection has nothing more to deliver.
pub const HANGUP: EpollFlags = EpollFlags::EPOLLRDHUP
    .union(EpollFlags::EPOLLHUP)
    .union(EpollFlags::EPOLLERR);

/// Owns the epoll instance. Each registration carries its descriptor number as
/// the event token, so [`token`] recovers it from a ready event.
#[derive(Debug)]
pub struct Registrar {
    epoll: Epoll,
}

impl Registrar {
    pub fn new() -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(RelayError::EpollCreate)?;
        Ok(Self { epoll })
    }

    /// Make `fd` non-blocking and add it for edge-triggered read readiness.
    ///
    /// On success the descriptor is always non-blocking; callers must not
    /// depend on blocking reads afterwards.
    pub fn register(&self, fd: impl AsFd) -> Result<()> {
        self.add(fd.as_fd(), READ_EDGE)
    }

    /// Like [`register`](Self::register), and also reports peer hangup.
    pub fn register_stream(&self, fd: impl AsFd) -> Result<()> {
        self.add(fd.as_fd(), STREAM_EDGE)
    }

    fn add(&self, fd: BorrowedFd<'_>, interest: EpollFlags) -> Result<()> {
        let raw = fd.as_raw_fd();
        fd::set_nonblocking(fd)?;

        let token = u64::try_from(raw).map_err(|_| RelayError::Register {
            fd: raw,
            source: nix::errno::Errno::EBADF,
        })?;
        self.epoll
            .add(fd, EpollEvent::new(interest, token))
            .map_err(|source| RelayError::Register { fd: raw, source })?;
        debug!(fd = raw, "registered for edge-triggered read readiness");
        Ok(())
    }

    /// Remove `fd` from the registration set.
    pub fn deregister(&self, fd: impl AsFd) -> Result<()> {
        let fd = fd.as_fd();
        let raw = fd.as_raw_fd();
        self.epoll
            .delete(fd)
            .map_err(|source| RelayError::Register { fd: raw, source })
    }

    /// Block until at least one registered descriptor is ready or `timeout`
    /// elapses. `EINTR` is returned to the caller untouched.
    pub fn wait(
        &self,
        events: &mut [EpollEvent],
        timeout: EpollTimeout,
    ) -> std::result::Result<usize, nix::errno::Errno> {
        self.epoll.wait(events, timeout)
    }
}

impl AsFd for Registrar {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.epoll.0.as_fd()
    }
}

/// Descriptor number stored in a ready event.
pub fn token(event: &EpollEvent) -> Option<RawFd> {
    RawFd::try_from(event.data()).ok()
}
