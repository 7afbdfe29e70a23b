//! The SNMP trap sink daemon.
//!
//! Binds the privileged trap port once per host, daemonizes, and
//! forwards every received datagram to the stream subscribers on
//! the forward port. Exits cleanly when the last subscriber is
//! gone.

use clap::Parser;
use netprobe::sys;
use netprobe::trapd::{TrapDaemon, TRAP_PORT};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "trapd", about = "SNMP trap sink and fan-out daemon")]
struct Args {
    /// UDP port to listen on; ports below 1024 other than the trap
    /// port are rejected.
    #[arg(default_value_t = TRAP_PORT)]
    port: u16,

    /// Stay in the foreground (for debugging).
    #[arg(short = 'f', long)]
    foreground: bool,
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    sys::ignore_sigpipe();

    if !args.foreground {
        if let Err(error) = sys::daemonize() {
            tracing::error!(%error, "cannot daemonize");
            return std::process::ExitCode::FAILURE;
        }
        sys::close_inherited_fds(3);
    }

    // the trap socket needs the privileges, the rest does not
    let mut daemon = match TrapDaemon::open(args.port) {
        Ok(daemon) => daemon,
        Err(error) => {
            tracing::error!(%error, "cannot open trap socket");
            return std::process::ExitCode::FAILURE;
        }
    };
    if let Err(error) = sys::drop_privileges() {
        tracing::error!(%error, "cannot drop privileges");
        return std::process::ExitCode::FAILURE;
    }

    match daemon.run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "trap daemon failed");
            std::process::ExitCode::FAILURE
        }
    }
}
