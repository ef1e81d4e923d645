//! Signal interpretation and shutdown bookkeeping.

use nix::errno::Errno;
use nix::sys::signal::Signal;

/// What the loop does with one relayed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Child exit or terminal hangup: acknowledged, nothing else.
    Ignore(Signal),
    /// Terminate or interrupt: stop the loop.
    Shutdown(Signal),
    /// Not a signal this loop relays.
    Unknown(u8),
}

impl SignalAction {
    pub fn decode(byte: u8) -> Self {
        match Signal::try_from(i32::from(byte)) {
            Ok(sig @ (Signal::SIGCHLD | Signal::SIGHUP)) => Self::Ignore(sig),
            Ok(sig @ (Signal::SIGTERM | Signal::SIGINT)) => Self::Shutdown(sig),
            _ => Self::Unknown(byte),
        }
    }
}

/// Set once by the loop when it decodes a terminating signal.
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    tripped_by: Option<Signal>,
}

impl ShutdownFlag {
    /// Record `signal` as the reason to stop. The first signal wins.
    pub fn trip(&mut self, signal: Signal) {
        if self.tripped_by.is_none() {
            self.tripped_by = Some(signal);
        }
    }

    pub fn is_set(&self) -> bool {
        self.tripped_by.is_some()
    }

    pub fn signal(&self) -> Option<Signal> {
        self.tripped_by
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal(Signal),
    WaitFailed(Errno),
}

/// Summary returned once teardown has closed every descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub reason: StopReason,
    /// Connections accepted over the loop's lifetime.
    pub accepted: usize,
    /// Relay bytes read from the signal channel.
    pub signals_seen: usize,
    /// Connections closed while the loop ran, by the handler or on hangup.
    pub disconnected: usize,
    /// Connections still open at teardown and closed by it.
    pub connections_closed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_relayed_signals() {
        assert_eq!(
            SignalAction::decode(Signal::SIGCHLD as u8),
            SignalAction::Ignore(Signal::SIGCHLD)
        );
        assert_eq!(
            SignalAction::decode(Signal::SIGHUP as u8),
            SignalAction::Ignore(Signal::SIGHUP)
        );
        assert_eq!(
            SignalAction::decode(Signal::SIGTERM as u8),
            SignalAction::Shutdown(Signal::SIGTERM)
        );
        assert_eq!(
            SignalAction::decode(Signal::SIGINT as u8),
            SignalAction::Shutdown(Signal::SIGINT)
        );
    }

    #[test]
    fn other_bytes_are_unknown() {
        assert_eq!(
            SignalAction::decode(Signal::SIGUSR1 as u8),
            SignalAction::Unknown(Signal::SIGUSR1 as u8)
        );
        assert_eq!(SignalAction::decode(0), SignalAction::Unknown(0));
        assert_eq!(SignalAction::decode(200), SignalAction::Unknown(200));
    }

    #[test]
    fn first_terminating_signal_is_kept() {
        let mut flag = ShutdownFlag::default();
        assert!(!flag.is_set());

        flag.trip(Signal::SIGINT);
        flag.trip(Signal::SIGTERM);
        assert!(flag.is_set());
        assert_eq!(flag.signal(), Some(Signal::SIGINT));
    }
}
