//! Unified event source: POSIX signals and socket readiness observed through
//! one edge-triggered epoll loop.
//!
//! Signals are turned into bytes on a Unix socket pair by a minimal
//! `sigaction` handler ([`relay`]). The read end of that pair sits in the same
//! epoll set as the listening socket and accepted connections
//! ([`registrar`]), so the [`EventLoop`] sees a signal as just another
//! readable descriptor and interprets it on its own thread ([`lifecycle`]).
//!
//! Linux only.

pub mod error;
pub mod event_loop;
pub mod fd;
pub mod handler;
pub mod lifecycle;
pub mod listener;
pub mod registrar;
pub mod relay;

pub use error::{RelayError, Result};
pub use event_loop::{DEFAULT_MAX_EVENTS, EventLoop};
pub use handler::{ConnectionHandler, Disposition, NoopHandler};
pub use lifecycle::{LoopReport, SignalAction, StopReason};
pub use relay::{RELAYED_SIGNALS, SignalChannel, SignalReceiver, SignalRelay, SignalSender};
