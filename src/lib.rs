//! Probe core of a TCP/IP network management toolkit.
//!
//! The crate bundles the pieces a management station needs to keep
//! an eye on a network:
//!
//! * A privileged ICMP helper daemon (`icmpd`) that issues echo,
//!   address mask, timestamp and UDP traceroute probes over a raw
//!   socket, with per target retries and a concurrency window. It
//!   talks a fixed length binary frame protocol on stdin/stdout.
//! * The unprivileged [`probe::IcmpTransport`] that forks the
//!   helper, multiplexes batches of probes onto its pipe and maps
//!   the replies back onto caller owned target rows.
//! * A DNS [`resolver::Resolver`] issuing A / PTR / MX / NS / SOA /
//!   HINFO / TXT / CNAME queries directly over UDP port 53, with a
//!   search list walk and process wide name caches.
//! * A cooperative [`sched::Scheduler`] for recurring jobs, driven
//!   by one external timer primitive.
//! * A trap sink daemon (`trapd`) that owns the privileged SNMP
//!   trap port once per host and fans received datagrams out to
//!   local stream subscribers.
//!
//! The [`wire`] module holds the byte level codecs shared by these
//! parts; everything on the wire is big endian.
//!
//! # Example
//!
//! Probing two hosts with an echo batch:
//!
//! ```no_run
//! use netprobe::probe::{IcmpTransport, ProbeOptions, ProbeRequest, Target};
//!
//! let mut transport = IcmpTransport::new();
//! let mut targets = vec![
//!     Target::new([192, 0, 2, 1].into()),
//!     Target::new([192, 0, 2, 2].into()),
//! ];
//! transport
//!     .probe(&ProbeRequest::echo(ProbeOptions::default()), &mut targets)
//!     .unwrap();
//! for target in &targets {
//!     println!("{}: {:?} {:?}", target.dst, target.status, target.value);
//! }
//! ```

pub mod checksum;
pub mod daemon;
pub mod dns;
pub mod err;
pub mod probe;
pub mod resolver;
pub mod sched;
pub mod sys;
pub mod trapd;
pub mod wire;
