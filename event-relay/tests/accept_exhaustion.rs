#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

//! Accepting while the descriptor table is full. Lowers `RLIMIT_NOFILE` for
//! the whole process, so it lives in its own test binary.

use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::os::fd::RawFd;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use event_relay::{ConnectionHandler, EventLoop, SignalChannel, StopReason, listener};
use nix::sys::resource::{Resource, getrlimit, setrlimit};
use nix::sys::signal::Signal;

const TIMEOUT: Duration = Duration::from_secs(5);
const EARLY: usize = 3;

struct Accepts(Sender<SocketAddr>);

impl ConnectionHandler for Accepts {
    fn on_accept(&mut self, _fd: RawFd, peer: SocketAddr) {
        let _ = self.0.send(peer);
    }
}

#[test]
fn exhausted_descriptors_leave_the_backlog_for_the_next_edge() {
    let listener = listener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), 16).unwrap();
    let addr = listener.local_addr().unwrap();
    let (sender, receiver) = SignalChannel::open().unwrap();
    let (accepted_tx, accepted) = mpsc::channel();
    let event_loop = EventLoop::new(listener, receiver, Accepts(accepted_tx)).unwrap();

    let _early: Vec<TcpStream> = (0..EARLY)
        .map(|_| TcpStream::connect(addr).unwrap())
        .collect();

    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
    setrlimit(Resource::RLIMIT_NOFILE, 256.min(hard), hard).unwrap();
    let mut filler = Vec::new();
    let full = loop {
        match File::open("/dev/null") {
            Ok(file) => filler.push(file),
            Err(e) => break e,
        }
    };
    assert_eq!(full.raw_os_error(), Some(libc::EMFILE));

    let handle = thread::spawn(move || event_loop.run());

    // Every accept fails with EMFILE; the loop gives up on this edge and waits.
    thread::sleep(Duration::from_millis(200));
    assert!(accepted.try_recv().is_err());
    assert!(!handle.is_finished());

    drop(filler);
    setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();

    // A new arrival is a new edge; the loop drains the stranded backlog too.
    let _late = TcpStream::connect(addr).unwrap();
    for _ in 0..=EARLY {
        accepted.recv_timeout(TIMEOUT).unwrap();
    }

    sender.notify_signal(Signal::SIGTERM).unwrap();
    let report = handle.join().expect("loop thread panicked").unwrap();
    assert_eq!(report.reason, StopReason::Signal(Signal::SIGTERM));
    assert_eq!(report.accepted, EARLY + 1);
}
