//! Signal-to-socket relay.
//!
//! A `sigaction` handler turns each delivered signal into a single byte written
//! to one end of a Unix socket pair. The other end is registered with the event
//! loop, so signal arrival shows up as ordinary read readiness.
//!
//! The handler is restricted to what is async-signal-safe: it reads one atomic,
//! issues one non-blocking `send` of one byte, and saves/restores `errno`. It
//! never allocates, locks or logs. If the socket buffer is full the byte is
//! dropped, so rapid repeats of the same signal may arrive as one byte.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::{debug, warn};

use crate::error::{RelayError, Result};
use crate::fd;

/// Signals the server relays into its event loop.
pub const RELAYED_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGCHLD,
    Signal::SIGTERM,
    Signal::SIGINT,
];

/// Size of one drain read from the receiving end.
const DRAIN_CHUNK: usize = 1024;

const NO_FD: RawFd = -1;

/// Write end published to the handler. `NO_FD` while no relay is installed.
static RELAY_FD: AtomicI32 = AtomicI32::new(NO_FD);

extern "C" fn relay_signal(sig: libc::c_int) {
    let saved = Errno::last_raw();
    let fd = RELAY_FD.load(Ordering::Acquire);
    if fd != NO_FD {
        // Truncation is fine: every signal number fits in a byte.
        let byte = sig as u8;
        // SAFETY: send(2) is async-signal-safe. fd stays open for as long as
        // it is published in RELAY_FD, see SignalRelay's Drop.
        unsafe {
            libc::send(
                fd,
                (&raw const byte).cast::<libc::c_void>(),
                1,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
            );
        }
    }
    Errno::set_raw(saved);
}

/// Connected socket pair carrying signal numbers as single bytes.
pub struct SignalChannel;

impl SignalChannel {
    /// Create both ends, each non-blocking and close-on-exec.
    pub fn open() -> Result<(SignalSender, SignalReceiver)> {
        let (tx, rx) = UnixStream::pair().map_err(RelayError::Channel)?;
        fd::set_nonblocking(&tx)?;
        fd::set_nonblocking(&rx)?;
        Ok((SignalSender { stream: tx }, SignalReceiver { stream: rx }))
    }
}

/// Write end of the signal channel.
#[derive(Debug)]
pub struct SignalSender {
    stream: UnixStream,
}

impl SignalSender {
    /// Write one signal byte from ordinary (non-handler) code.
    ///
    /// A full buffer is reported as `WouldBlock`, mirroring the byte the
    /// handler would silently drop.
    pub fn notify(&self, signo: u8) -> io::Result<()> {
        (&self.stream).write_all(&[signo])
    }

    /// Convenience for [`notify`](Self::notify) with a typed signal.
    pub fn notify_signal(&self, signal: Signal) -> io::Result<()> {
        self.notify(signal as u8)
    }

    /// Second handle on the same write end, for in-process shutdown requests
    /// while the original is owned by a [`SignalRelay`].
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
        })
    }
}

impl AsFd for SignalSender {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

/// What one drain of the receiving end produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Signal bytes in arrival order.
    pub bytes: Vec<u8>,
    /// The write end is gone; no more bytes will ever arrive.
    pub closed: bool,
}

/// Read end of the signal channel, owned by the event loop.
#[derive(Debug)]
pub struct SignalReceiver {
    stream: UnixStream,
}

impl SignalReceiver {
    /// Read everything currently buffered.
    ///
    /// Reads repeat until `WouldBlock` or end-of-stream, which is what
    /// edge-triggered readiness requires. `WouldBlock`, `Interrupted` and a
    /// zero-byte read are normal outcomes. Any other error is returned along
    /// with the bytes collected before it.
    pub fn drain(&mut self) -> std::result::Result<Drained, (Drained, io::Error)> {
        let mut drained = Drained::default();
        let mut buf = [0u8; DRAIN_CHUNK];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    drained.closed = true;
                    return Ok(drained);
                }
                Ok(n) => drained.bytes.extend_from_slice(buf.get(..n).unwrap_or_default()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(drained),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err((drained, e)),
            }
        }
    }
}

impl AsFd for SignalReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

/// Installed relay. Owns the write end of the channel.
///
/// Dropping it restores the previous dispositions and unpublishes the write
/// end before closing it.
pub struct SignalRelay {
    sender: SignalSender,
    previous: Vec<(Signal, SigAction)>,
}

impl std::fmt::Debug for SignalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRelay")
            .field("sender", &self.sender)
            .field("signals", &self.signals().collect::<Vec<_>>())
            .finish()
    }
}

impl SignalRelay {
    /// Install the relay handler for every signal in `signals`.
    ///
    /// Each handler runs with `SA_RESTART` and with every signal blocked. Only
    /// one relay may exist per process. Any failure restores whatever was
    /// already installed before returning.
    pub fn install(sender: SignalSender, signals: &[Signal]) -> Result<Self> {
        let raw = sender.as_fd().as_raw_fd();
        RELAY_FD
            .compare_exchange(NO_FD, raw, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RelayError::RelayActive)?;

        let mut relay = Self {
            sender,
            previous: Vec::with_capacity(signals.len()),
        };
        let action = SigAction::new(
            SigHandler::Handler(relay_signal),
            SaFlags::SA_RESTART,
            SigSet::all(),
        );
        for &signal in signals {
            // SAFETY: relay_signal only performs async-signal-safe operations.
            let old = unsafe { sigaction(signal, &action) }
                .map_err(|source| RelayError::InstallHandler { signal, source })?;
            relay.previous.push((signal, old));
            debug!(%signal, "relay handler installed");
        }
        Ok(relay)
    }

    /// Signals currently routed through this relay.
    pub fn signals(&self) -> impl Iterator<Item = Signal> + '_ {
        self.previous.iter().map(|(signal, _)| *signal)
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        for (signal, old) in self.previous.drain(..).rev() {
            // SAFETY: old was returned by sigaction for this same signal.
            if let Err(e) = unsafe { sigaction(signal, &old) } {
                warn!(%signal, "failed to restore signal disposition: {e}");
            }
        }
        RELAY_FD.store(NO_FD, Ordering::Release);
        debug!(fd = self.sender.as_fd().as_raw_fd(), "relay uninstalled");
    }
}
