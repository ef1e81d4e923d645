//! Startup and teardown around the event loop.
//!
//! The relay is installed before the listener is bound, so once the port
//! accepts connections every relayed signal already reaches the loop.

use event_relay::{
    EventLoop, LoopReport, NoopHandler, RELAYED_SIGNALS, SignalChannel, SignalRelay, listener,
};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Bring up the channel, relay and listener, then run until shutdown.
///
/// Any failure before the loop starts is fatal and leaves nothing installed:
/// a relay created here is dropped, restoring the previous dispositions.
pub fn serve(config: &ServerConfig) -> ServerResult<LoopReport> {
    let (sender, receiver) = SignalChannel::open().map_err(ServerError::Init)?;
    let relay = SignalRelay::install(sender, &RELAYED_SIGNALS).map_err(ServerError::Init)?;
    info!(
        signals = ?relay.signals().collect::<Vec<_>>(),
        "signal relay installed"
    );

    let listener = listener::bind(config.addr, config.backlog).map_err(ServerError::Init)?;
    info!(addr = %config.addr, backlog = config.backlog, "listening");

    EventLoop::new(listener, receiver, NoopHandler)
        .map_err(ServerError::Init)?
        .attach_relay(relay)
        .with_max_events(config.max_events)
        .run()
        .map_err(ServerError::Loop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    use event_relay::RelayError;

    #[test]
    fn occupied_port_is_a_startup_error() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = serve(&ServerConfig::new(Ipv4Addr::LOCALHOST, port)).unwrap_err();
        assert!(matches!(err, ServerError::Init(RelayError::Bind { .. })));

        // The relay from the failed attempt is gone.
        let (sender, _receiver) = SignalChannel::open().unwrap();
        SignalRelay::install(sender, &RELAYED_SIGNALS).unwrap();
    }
}
