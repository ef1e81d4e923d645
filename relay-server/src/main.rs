//! TCP listener driven by one epoll loop that also receives its signals.
//!
//! SIGCHLD/SIGHUP are acknowledged and ignored, SIGTERM/SIGINT stop the loop
//! and exit with status 0 once every descriptor is closed. Accepted
//! connections are registered but their payload is never read.

mod config;
mod error;
mod server;

use std::fmt;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::fmt::time::FormatTime;

use crate::config::ServerConfig;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "relay-server", version)]
struct Cli {
    /// IPv4 address to listen on
    ip_address: Ipv4Addr,
    /// TCP port to listen on
    port_number: u16,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .init();

    let config = ServerConfig::new(cli.ip_address, cli.port_number);
    match server::serve(&config) {
        Ok(report) => {
            info!(
                reason = ?report.reason,
                accepted = report.accepted,
                signals_seen = report.signals_seen,
                disconnected = report.disconnected,
                connections_closed = report.connections_closed,
                "stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
