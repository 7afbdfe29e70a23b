//! Byte level codecs: ICMP probe messages, the minimal IPv4/UDP
//! headers the raw trace path needs, the probe daemon frames and the
//! trap forwarding envelope.
//!
//! All multi byte fields are big endian on the wire.

pub mod icmp;

mod ipv4;
pub use ipv4::*;

mod udp;
pub use udp::*;

mod frame;
pub use frame::*;

mod trap;
pub use trap::*;
