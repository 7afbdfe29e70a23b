//! The external privileged ICMP probe daemon.
//!
//! Started (usually set-uid root or with CAP_NET_RAW) by the client
//! transport; reads request frames from stdin, probes the targets
//! and writes reply frames to stdout. Exits when stdin reaches EOF
//! and every accepted job has been answered.

use clap::Parser;
use netprobe::daemon::ProbeDaemon;
use netprobe::sys;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "icmpd", about = "ICMP echo/mask/timestamp/traceroute probe daemon")]
struct Args {
    /// Emit debug messages.
    #[arg(short = 'D', long)]
    debug: bool,
}

/// CPU seconds the daemon allows itself; guards against an
/// undiagnosed busy loop.
const CPU_LIMIT_SECS: u64 = 10;

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    // descriptors inherited from the forking client are a liability
    sys::close_inherited_fds(3);

    // sockets first, they need the privileges
    let mut daemon = match ProbeDaemon::open() {
        Ok(daemon) => daemon,
        Err(error) => {
            tracing::error!(%error, "cannot open probe sockets");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(error) = sys::drop_privileges() {
        tracing::error!(%error, "cannot drop privileges");
        return std::process::ExitCode::FAILURE;
    }
    if let Err(error) = sys::set_cpu_limit(CPU_LIMIT_SECS) {
        tracing::warn!(%error, "cannot set cpu limit");
    }

    match daemon.run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "probe daemon failed");
            std::process::ExitCode::FAILURE
        }
    }
}
