//! Per-connection hook invoked by the event loop.

use std::net::{SocketAddr, TcpStream};
use std::os::fd::RawFd;

/// What the loop should do with a connection after its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    /// Deregister and close the connection.
    Close,
}

/// Application logic for accepted connections.
///
/// The loop owns every stream and keeps it registered for edge-triggered read
/// readiness; handlers only see borrowed access. Since readiness is
/// edge-triggered, `on_readable` should read until `WouldBlock` or it will not
/// be woken again for data that is already buffered.
pub trait ConnectionHandler {
    /// A connection was accepted and registered.
    fn on_accept(&mut self, _fd: RawFd, _peer: SocketAddr) {}

    /// The connection became readable.
    fn on_readable(&mut self, _fd: RawFd, _stream: &mut TcpStream) -> Disposition {
        Disposition::Keep
    }

    /// The peer shut down its write side, hung up, or the socket errored.
    ///
    /// Runs after `on_readable` for the same event, and only if that returned
    /// `Keep`. The default closes, so a handler that ignores payload does not
    /// hold finished connections until teardown. Return `Keep` to go on
    /// writing to a half-closed peer.
    fn on_hangup(&mut self, _fd: RawFd) -> Disposition {
        Disposition::Close
    }
}

/// Accepts and registers connections but never touches their payload.
/// Connections are closed once the peer goes away, or at teardown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hangup_closes_the_connection() {
        let mut handler = NoopHandler;
        assert_eq!(handler.on_hangup(3), Disposition::Close);
    }
}
