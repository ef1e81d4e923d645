use std::net::SocketAddrV4;
use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::sys::signal::Signal;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("query flags on fd {fd}: {source}")]
    GetFlags { fd: RawFd, source: Errno },

    #[error("set flags on fd {fd}: {source}")]
    SetFlags { fd: RawFd, source: Errno },

    #[error("epoll create: {0}")]
    EpollCreate(Errno),

    #[error("register fd {fd} with epoll: {source}")]
    Register { fd: RawFd, source: Errno },

    #[error("epoll wait: {0}")]
    Wait(Errno),

    #[error("create socket: {0}")]
    Socket(std::io::Error),

    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        source: std::io::Error,
    },

    #[error("listen on {addr}: {source}")]
    Listen {
        addr: SocketAddrV4,
        source: std::io::Error,
    },

    #[error("signal channel: {0}")]
    Channel(std::io::Error),

    #[error("install handler for {signal}: {source}")]
    InstallHandler { signal: Signal, source: Errno },

    #[error("a signal relay is already installed in this process")]
    RelayActive,
}

pub type Result<T> = std::result::Result<T, RelayError>;
