//! Descriptor mode helpers.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::fcntl::{FcntlArg, OFlag, fcntl};

use crate::error::{RelayError, Result};

fn get_flags(fd: BorrowedFd<'_>) -> Result<OFlag> {
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(|source| RelayError::GetFlags {
        fd: fd.as_raw_fd(),
        source,
    })?;
    Ok(OFlag::from_bits_retain(bits))
}

/// Put `fd` into non-blocking mode and return the flags it had before.
///
/// Applying it to a descriptor that is already non-blocking is a no-op that
/// still succeeds. Query and update are separate syscalls, so a failure of
/// either is reported as its own error variant.
pub fn set_nonblocking(fd: impl AsFd) -> Result<OFlag> {
    let fd = fd.as_fd();
    let old = get_flags(fd)?;
    fcntl(fd, FcntlArg::F_SETFL(old | OFlag::O_NONBLOCK)).map_err(|source| {
        RelayError::SetFlags {
            fd: fd.as_raw_fd(),
            source,
        }
    })?;
    Ok(old)
}

/// Whether `fd` currently has `O_NONBLOCK` set.
pub fn is_nonblocking(fd: impl AsFd) -> Result<bool> {
    Ok(get_flags(fd.as_fd())?.contains(OFlag::O_NONBLOCK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn sets_nonblocking_and_returns_previous_flags() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!is_nonblocking(&a).unwrap());

        let old = set_nonblocking(&a).unwrap();
        assert!(!old.contains(OFlag::O_NONBLOCK));
        assert!(is_nonblocking(&a).unwrap());
    }

    #[test]
    fn second_call_is_idempotent() {
        let (a, _b) = UnixStream::pair().unwrap();
        set_nonblocking(&a).unwrap();

        let old = set_nonblocking(&a).unwrap();
        assert!(old.contains(OFlag::O_NONBLOCK));
        assert!(is_nonblocking(&a).unwrap());
    }

    #[test]
    fn closed_descriptor_fails_on_query() {
        // SAFETY: the number is only handed to fcntl, which reports EBADF.
        let bogus = unsafe { BorrowedFd::borrow_raw(1_000_000) };
        let err = set_nonblocking(bogus).unwrap_err();
        assert!(matches!(
            err,
            RelayError::GetFlags {
                fd: 1_000_000,
                source: nix::errno::Errno::EBADF
            }
        ));
    }
}
