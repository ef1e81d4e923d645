//! The single-threaded dispatcher.
//!
//! One epoll instance watches the listening socket, the read end of the signal
//! channel, and every accepted connection. All three are edge-triggered, so
//! each wake drains its source until `WouldBlock`.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::epoll::{EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::handler::{ConnectionHandler, Disposition};
use crate::lifecycle::{LoopReport, ShutdownFlag, SignalAction, StopReason};
use crate::registrar::{self, Registrar};
use crate::relay::{SignalReceiver, SignalRelay};

/// Ready events collected per wake unless overridden.
pub const DEFAULT_MAX_EVENTS: usize = 1024;

/// How the accept drain treats a failed `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the connection at the head of the queue was lost.
    Connection,
    /// Out of descriptors or memory. Accepting again now fails the same way,
    /// so the rest of the backlog stays queued until the next listener edge.
    Exhausted,
    Other,
}

impl AcceptFailure {
    fn classify(e: &io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => Self::Exhausted,
            // accept(2) passes pending network errors of the new socket up
            // to the caller; the listener itself is fine.
            Some(
                libc::EINTR
                | libc::ECONNABORTED
                | libc::EPROTO
                | libc::ENOPROTOOPT
                | libc::EOPNOTSUPP
                | libc::ENETDOWN
                | libc::ENETUNREACH
                | libc::ENONET
                | libc::EHOSTDOWN
                | libc::EHOSTUNREACH
                | libc::EPERM
                | libc::ETIMEDOUT,
            ) => Self::Connection,
            _ => Self::Other,
        }
    }
}

pub struct EventLoop<H> {
    registrar: Registrar,
    listener: TcpListener,
    receiver: SignalReceiver,
    relay: Option<SignalRelay>,
    connections: HashMap<RawFd, TcpStream>,
    handler: H,
    shutdown: ShutdownFlag,
    max_events: usize,
    accepted: usize,
    signals_seen: usize,
    disconnected: usize,
}

impl<H: ConnectionHandler> EventLoop<H> {
    /// Register the listener and the signal channel's read end.
    ///
    /// Either registration failing is fatal: the loop cannot observe its two
    /// fixed sources without them.
    pub fn new(listener: TcpListener, receiver: SignalReceiver, handler: H) -> Result<Self> {
        let registrar = Registrar::new()?;
        registrar.register(&listener)?;
        registrar.register(&receiver)?;
        Ok(Self {
            registrar,
            listener,
            receiver,
            relay: None,
            connections: HashMap::new(),
            handler,
            shutdown: ShutdownFlag::default(),
            max_events: DEFAULT_MAX_EVENTS,
            accepted: 0,
            signals_seen: 0,
            disconnected: 0,
        })
    }

    /// Hand over the installed relay so teardown uninstalls it and closes the
    /// channel's write end.
    #[must_use]
    pub fn attach_relay(mut self, relay: SignalRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Run until a terminating signal is decoded or `epoll_wait` fails.
    ///
    /// Teardown always runs before this returns. A wait failure is reported
    /// as [`RelayError::Wait`] after the descriptors are closed.
    pub fn run(mut self) -> Result<LoopReport> {
        let mut events = vec![EpollEvent::empty(); self.max_events];
        let listener_fd = self.listener.as_raw_fd();
        let channel_fd = self.receiver.as_fd().as_raw_fd();
        info!(listener_fd, channel_fd, "event loop running");

        let reason = loop {
            if let Some(signal) = self.shutdown.signal() {
                break StopReason::Signal(signal);
            }

            let n = match self.registrar.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    error!("epoll failure: {e}");
                    break StopReason::WaitFailed(e);
                }
            };

            for event in events.iter().take(n) {
                match registrar::token(event) {
                    Some(fd) if fd == listener_fd => self.accept_pending(),
                    Some(fd) if fd == channel_fd => self.drain_signals(),
                    Some(fd) => self.dispatch(fd, event.events()),
                    None => {}
                }
            }
        };

        let report = self.teardown(reason);
        match reason {
            StopReason::Signal(_) => Ok(report),
            StopReason::WaitFailed(e) => Err(RelayError::Wait(e)),
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => match AcceptFailure::classify(&e) {
                    AcceptFailure::Connection => debug!("accept dropped a connection: {e}"),
                    AcceptFailure::Exhausted => {
                        warn!("accept stalled until the next connection: {e}");
                        break;
                    }
                    AcceptFailure::Other => {
                        warn!("accept failed: {e}");
                        break;
                    }
                },
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let fd = stream.as_raw_fd();
        if let Err(e) = self.registrar.register_stream(&stream) {
            warn!(%peer, "dropping connection: {e}");
            return;
        }
        self.accepted += 1;
        debug!(fd, %peer, "connection registered");
        self.connections.insert(fd, stream);
        self.handler.on_accept(fd, peer);
    }

    fn drain_signals(&mut self) {
        let drained = match self.receiver.drain() {
            Ok(drained) => drained,
            Err((partial, e)) => {
                warn!("signal channel read failed: {e}");
                partial
            }
        };
        if drained.closed {
            debug!("signal channel write end closed");
        }

        self.signals_seen += drained.bytes.len();
        for byte in drained.bytes {
            match SignalAction::decode(byte) {
                SignalAction::Ignore(signal) => debug!(%signal, "signal acknowledged"),
                SignalAction::Shutdown(signal) => {
                    info!(%signal, "shutdown requested");
                    self.shutdown.trip(signal);
                }
                SignalAction::Unknown(byte) => debug!(byte, "ignoring unrecognized relay byte"),
            }
        }
    }

    fn dispatch(&mut self, fd: RawFd, flags: EpollFlags) {
        let Some(stream) = self.connections.get_mut(&fd) else {
            debug!(fd, "readiness for unknown descriptor");
            return;
        };
        let mut disposition = Disposition::Keep;
        if flags.contains(EpollFlags::EPOLLIN) {
            disposition = self.handler.on_readable(fd, stream);
        }
        if disposition == Disposition::Keep && flags.intersects(registrar::HANGUP) {
            disposition = self.handler.on_hangup(fd);
        }
        if disposition == Disposition::Close {
            self.close_connection(fd);
        }
    }

    fn close_connection(&mut self, fd: RawFd) {
        if let Some(stream) = self.connections.remove(&fd) {
            if let Err(e) = self.registrar.deregister(&stream) {
                debug!(fd, "deregister failed: {e}");
            }
            self.disconnected += 1;
            debug!(fd, "connection closed");
        }
    }

    /// Close every descriptor the loop owns, each exactly once.
    ///
    /// The relay goes before the read end so signal dispositions are restored
    /// while the channel is still intact.
    fn teardown(self, reason: StopReason) -> LoopReport {
        info!("close fds");
        let Self {
            registrar,
            listener,
            receiver,
            relay,
            connections,
            accepted,
            signals_seen,
            disconnected,
            ..
        } = self;

        let connections_closed = connections.len();
        drop(connections);
        drop(listener);
        drop(relay);
        drop(receiver);
        drop(registrar);

        debug!(connections_closed, "teardown complete");
        LoopReport {
            reason,
            accepted,
            signals_seen,
            disconnected,
            connections_closed,
        }
    }
}
