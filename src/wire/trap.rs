use crate::err::{Layer, LenError};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Version of the trap forwarding protocol.
pub const TRAP_PROTO_VERSION: u8 = 0;

/// Header prepended to every datagram the trap daemon forwards to a
/// subscriber.
///
/// ```text
///  0       1       2       3       4
///  +-------+-------+-------+-------+
///  |version| rsvd  |   source port |
///  +-------+-------+-------+-------+
///  |        source address         |
///  +-------+-------+-------+-------+
///  |            length             |
///  +-------+-------+-------+-------+
/// ```
///
/// `length` bytes of raw datagram follow immediately, with no
/// padding between envelopes. Subscribers must read exactly 12 bytes
/// before reading `length` bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrapEnvelope {
    /// Source UDP port of the received datagram.
    pub source_port: u16,
    /// Source address of the received datagram.
    pub source_addr: Ipv4Addr,
    /// Number of datagram bytes that follow the envelope.
    pub length: u32,
}

impl TrapEnvelope {
    /// Serialized size of the envelope in bytes/octets.
    pub const LEN: usize = 12;

    /// Builds the envelope for a datagram received from `source`.
    pub fn new(source: SocketAddrV4, length: usize) -> TrapEnvelope {
        TrapEnvelope {
            source_port: source.port(),
            source_addr: *source.ip(),
            length: length as u32,
        }
    }

    /// Returns the on the wire bytes (big endian multi byte fields).
    pub fn to_bytes(&self) -> [u8; 12] {
        let port = self.source_port.to_be_bytes();
        let addr = self.source_addr.octets();
        let length = self.length.to_be_bytes();
        [
            TRAP_PROTO_VERSION,
            0,
            port[0],
            port[1],
            addr[0],
            addr[1],
            addr[2],
            addr[3],
            length[0],
            length[1],
            length[2],
            length[3],
        ]
    }

    /// Decodes an envelope from its fixed length representation.
    pub fn from_bytes(bytes: [u8; 12]) -> TrapEnvelope {
        TrapEnvelope {
            source_port: u16::from_be_bytes([bytes[2], bytes[3]]),
            source_addr: Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]),
            length: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// Decodes an envelope from the start of a slice.
    pub fn from_slice(slice: &[u8]) -> Result<TrapEnvelope, LenError> {
        if slice.len() < TrapEnvelope::LEN {
            return Err(LenError {
                required_len: TrapEnvelope::LEN,
                len: slice.len(),
                layer: Layer::TrapEnvelope,
            });
        }
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&slice[..12]);
        Ok(TrapEnvelope::from_bytes(bytes))
    }
}
