//! IPv4 listening socket with an explicit backlog.
//!
//! `std::net::TcpListener::bind` hardcodes its backlog, so the socket is built
//! with raw `socket`/`bind`/`listen` and then handed to std.

use std::io;
use std::net::{SocketAddrV4, TcpListener};
use std::os::fd::{FromRawFd, OwnedFd};

use crate::error::{RelayError, Result};

fn sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(*addr.ip()).to_be(),
        },
        sin_zero: [0; 8],
    }
}

/// Create a TCP socket bound to `addr` and listening with `backlog`.
pub fn bind(addr: SocketAddrV4, backlog: i32) -> Result<TcpListener> {
    // SAFETY: plain socket creation with valid constants, checked below.
    let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if sock < 0 {
        return Err(RelayError::Socket(io::Error::last_os_error()));
    }
    // SAFETY: sock is a freshly created descriptor that nothing else owns.
    // From here on it is closed on every early return.
    let fd = unsafe { OwnedFd::from_raw_fd(sock) };

    let sa = sockaddr_in(addr);
    // SAFETY: sa is fully initialized and the length matches its type.
    let ret = unsafe {
        libc::bind(
            sock,
            (&raw const sa).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(RelayError::Bind {
            addr,
            source: io::Error::last_os_error(),
        });
    }

    // SAFETY: sock is a bound stream socket owned by fd.
    if unsafe { libc::listen(sock, backlog) } < 0 {
        return Err(RelayError::Listen {
            addr,
            source: io::Error::last_os_error(),
        });
    }

    Ok(TcpListener::from(fd))
}
