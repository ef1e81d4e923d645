use std::net::{Ipv4Addr, SocketAddrV4};

/// Pending-connection queue length passed to `listen`.
pub(crate) const DEFAULT_BACKLOG: i32 = 5;
/// Ready events collected per `epoll_wait`.
pub(crate) const DEFAULT_MAX_EVENTS: usize = event_relay::DEFAULT_MAX_EVENTS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddrV4,
    pub backlog: i32,
    pub max_events: usize,
}

impl ServerConfig {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            addr: SocketAddrV4::new(ip, port),
            backlog: DEFAULT_BACKLOG,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_positional_arguments() {
        let config = ServerConfig::new(Ipv4Addr::new(127, 0, 0, 1), 9999);
        assert_eq!(config.addr.to_string(), "127.0.0.1:9999");
        assert_eq!(config.backlog, 5);
        assert_eq!(config.max_events, 1024);
    }
}
