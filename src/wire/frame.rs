use crate::err::{Layer, LenError};
use std::net::Ipv4Addr;

/// Version of the probe daemon wire protocol.
pub const PROTO_VERSION: u8 = 0;

/// Flag bit set when a trace probe hit the final hop.
pub const FLAG_LASTHOP: u8 = 0x01;

/// The probe operation requested from the daemon.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProbeKind {
    /// ICMP echo request.
    Echo = 1,
    /// ICMP address mask request.
    Mask = 2,
    /// ICMP timestamp request.
    Timestamp = 3,
    /// UDP datagram with a bounded time to live.
    Trace = 4,
}

impl ProbeKind {
    /// Decodes the wire value, `None` for anything unassigned.
    pub fn from_u8(value: u8) -> Option<ProbeKind> {
        match value {
            1 => Some(ProbeKind::Echo),
            2 => Some(ProbeKind::Mask),
            3 => Some(ProbeKind::Timestamp),
            4 => Some(ProbeKind::Trace),
            _ => None,
        }
    }
}

/// Completion status of a probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ProbeStatus {
    /// A matching reply arrived.
    #[default]
    NoError = 0,
    /// The retry budget elapsed without a matching reply.
    Timeout = 1,
    /// The probe could not be sent or the request was invalid.
    GenError = 2,
}

impl ProbeStatus {
    /// Decodes the wire value, `None` for anything unassigned.
    pub fn from_u8(value: u8) -> Option<ProbeStatus> {
        match value {
            0 => Some(ProbeStatus::NoError),
            1 => Some(ProbeStatus::Timeout),
            2 => Some(ProbeStatus::GenError),
            _ => None,
        }
    }
}

/// Request frame written to the daemon's stdin (one per target).
///
/// ```text
///  0       1       2       3       4
///  +-------+-------+-------+-------+
///  |version| type  |status | flags |
///  +-------+-------+-------+-------+
///  |              tid              |
///  +-------+-------+-------+-------+
///  |          destination          |
///  +-------+-------+-------+-------+
///  |  ttl  |timeout|retries| delay |
///  +-------+-------+-------+-------+
///  |     size      |    window     |
///  +-------+-------+-------+-------+
/// ```
///
/// `version` and `type` are left as raw bytes so that the daemon can
/// answer a `generror` carrying the transaction id even when they do
/// not validate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestFrame {
    /// Protocol version, must be [`PROTO_VERSION`].
    pub version: u8,
    /// Raw probe type byte, see [`ProbeKind`].
    pub kind: u8,
    /// Status, zero in requests.
    pub status: u8,
    /// Request flags ([`FLAG_LASTHOP`] asks for final hop reporting).
    pub flags: u8,
    /// Transaction id used to re-associate the reply.
    pub tid: u32,
    /// Target address.
    pub destination: Ipv4Addr,
    /// Time to live for trace probes, unused otherwise.
    pub ttl: u8,
    /// Total retry budget in whole seconds.
    pub timeout_s: u8,
    /// Number of retries (total attempts = retries + 1).
    pub retries: u8,
    /// Inter packet pacing in milliseconds.
    pub delay_ms: u8,
    /// Probe message size in bytes.
    pub size: u16,
    /// Maximum number of in-flight probes of this batch (0 = no limit).
    pub window: u16,
}

impl RequestFrame {
    /// Serialized size of a request frame in bytes/octets.
    pub const LEN: usize = 20;

    /// Returns a request frame with the version and reply fields
    /// initialized the way the client transport sends them.
    pub fn new(kind: ProbeKind, tid: u32, destination: Ipv4Addr) -> RequestFrame {
        RequestFrame {
            version: PROTO_VERSION,
            kind: kind as u8,
            status: 0,
            flags: 0,
            tid,
            destination,
            ttl: 0,
            timeout_s: 0,
            retries: 0,
            delay_ms: 0,
            size: 0,
            window: 0,
        }
    }

    /// The decoded probe type, `None` if the type byte is unassigned.
    pub fn probe_kind(&self) -> Option<ProbeKind> {
        ProbeKind::from_u8(self.kind)
    }

    /// Returns the on the wire bytes (big endian multi byte fields).
    pub fn to_bytes(&self) -> [u8; 20] {
        let tid = self.tid.to_be_bytes();
        let dst = self.destination.octets();
        let size = self.size.to_be_bytes();
        let window = self.window.to_be_bytes();
        [
            self.version,
            self.kind,
            self.status,
            self.flags,
            tid[0],
            tid[1],
            tid[2],
            tid[3],
            dst[0],
            dst[1],
            dst[2],
            dst[3],
            self.ttl,
            self.timeout_s,
            self.retries,
            self.delay_ms,
            size[0],
            size[1],
            window[0],
            window[1],
        ]
    }

    /// Decodes a frame from its fixed length representation.
    pub fn from_bytes(bytes: [u8; 20]) -> RequestFrame {
        RequestFrame {
            version: bytes[0],
            kind: bytes[1],
            status: bytes[2],
            flags: bytes[3],
            tid: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            destination: Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]),
            ttl: bytes[12],
            timeout_s: bytes[13],
            retries: bytes[14],
            delay_ms: bytes[15],
            size: u16::from_be_bytes([bytes[16], bytes[17]]),
            window: u16::from_be_bytes([bytes[18], bytes[19]]),
        }
    }

    /// Decodes a frame from the start of a slice.
    pub fn from_slice(slice: &[u8]) -> Result<RequestFrame, LenError> {
        if slice.len() < RequestFrame::LEN {
            return Err(LenError {
                required_len: RequestFrame::LEN,
                len: slice.len(),
                layer: Layer::ProbeRequestFrame,
            });
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&slice[..20]);
        Ok(RequestFrame::from_bytes(bytes))
    }
}

/// Reply frame written to the daemon's stdout (one per request).
///
/// ```text
///  0       1       2       3       4
///  +-------+-------+-------+-------+
///  |version| type  |status | flags |
///  +-------+-------+-------+-------+
///  |              tid              |
///  +-------+-------+-------+-------+
///  |             addr              |
///  +-------+-------+-------+-------+
///  |            result             |
///  +-------+-------+-------+-------+
/// ```
///
/// `result` is a microsecond round trip time for echo and trace
/// probes, the address mask for mask probes and a signed millisecond
/// clock offset for timestamp probes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplyFrame {
    /// Protocol version.
    pub version: u8,
    /// Raw probe type byte, see [`ProbeKind`].
    pub kind: u8,
    /// Raw status byte, see [`ProbeStatus`].
    pub status: u8,
    /// Reply flags ([`FLAG_LASTHOP`]).
    pub flags: u8,
    /// Transaction id of the answered request.
    pub tid: u32,
    /// Responding address (may differ from the request destination
    /// on intermediate trace hops).
    pub addr: Ipv4Addr,
    /// Probe result, interpretation depends on the probe type.
    pub result: u32,
}

impl ReplyFrame {
    /// Serialized size of a reply frame in bytes/octets.
    pub const LEN: usize = 16;

    /// The decoded probe type, `None` if the type byte is unassigned.
    pub fn probe_kind(&self) -> Option<ProbeKind> {
        ProbeKind::from_u8(self.kind)
    }

    /// The decoded status, `None` if the status byte is unassigned.
    pub fn probe_status(&self) -> Option<ProbeStatus> {
        ProbeStatus::from_u8(self.status)
    }

    /// Returns the on the wire bytes (big endian multi byte fields).
    pub fn to_bytes(&self) -> [u8; 16] {
        let tid = self.tid.to_be_bytes();
        let addr = self.addr.octets();
        let result = self.result.to_be_bytes();
        [
            self.version,
            self.kind,
            self.status,
            self.flags,
            tid[0],
            tid[1],
            tid[2],
            tid[3],
            addr[0],
            addr[1],
            addr[2],
            addr[3],
            result[0],
            result[1],
            result[2],
            result[3],
        ]
    }

    /// Decodes a frame from its fixed length representation.
    pub fn from_bytes(bytes: [u8; 16]) -> ReplyFrame {
        ReplyFrame {
            version: bytes[0],
            kind: bytes[1],
            status: bytes[2],
            flags: bytes[3],
            tid: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            addr: Ipv4Addr::new(bytes[8], bytes[9], bytes[10], bytes[11]),
            result: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Decodes a frame from the start of a slice.
    pub fn from_slice(slice: &[u8]) -> Result<ReplyFrame, LenError> {
        if slice.len() < ReplyFrame::LEN {
            return Err(LenError {
                required_len: ReplyFrame::LEN,
                len: slice.len(),
                layer: Layer::ProbeReplyFrame,
            });
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&slice[..16]);
        Ok(ReplyFrame::from_bytes(bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_layout() {
        let mut frame = RequestFrame::new(ProbeKind::Echo, 0x01020304, Ipv4Addr::new(127, 0, 0, 1));
        frame.timeout_s = 5;
        frame.retries = 2;
        frame.size = 64;
        frame.window = 10;
        assert_eq!(
            frame.to_bytes(),
            [
                0, 1, 0, 0, // version, type, status, flags
                1, 2, 3, 4, // tid
                127, 0, 0, 1, // destination
                0, 5, 2, 0, // ttl, timeout, retries, delay
                0, 64, 0, 10, // size, window
            ]
        );
    }

    #[test]
    fn reply_layout() {
        let frame = ReplyFrame {
            version: PROTO_VERSION,
            kind: ProbeKind::Trace as u8,
            status: ProbeStatus::NoError as u8,
            flags: FLAG_LASTHOP,
            tid: 7,
            addr: Ipv4Addr::new(10, 0, 0, 5),
            result: 1500,
        };
        assert_eq!(
            frame.to_bytes(),
            [
                0, 4, 0, 1, // version, type, status, flags
                0, 0, 0, 7, // tid
                10, 0, 0, 5, // addr
                0, 0, 5, 220, // result
            ]
        );
    }

    #[test]
    fn kind_and_status_decode() {
        assert_eq!(Some(ProbeKind::Echo), ProbeKind::from_u8(1));
        assert_eq!(Some(ProbeKind::Trace), ProbeKind::from_u8(4));
        assert_eq!(None, ProbeKind::from_u8(0));
        assert_eq!(None, ProbeKind::from_u8(5));
        assert_eq!(Some(ProbeStatus::GenError), ProbeStatus::from_u8(2));
        assert_eq!(None, ProbeStatus::from_u8(3));
    }

    #[test]
    fn from_slice_len_errors() {
        assert!(RequestFrame::from_slice(&[0u8; 19]).is_err());
        assert!(ReplyFrame::from_slice(&[0u8; 15]).is_err());
    }

    proptest! {
        #[test]
        fn request_roundtrip(bytes in any::<[u8; 20]>()) {
            prop_assert_eq!(
                RequestFrame::from_bytes(bytes).to_bytes(),
                bytes
            );
        }

        #[test]
        fn reply_roundtrip(bytes in any::<[u8; 16]>()) {
            prop_assert_eq!(
                ReplyFrame::from_bytes(bytes).to_bytes(),
                bytes
            );
        }
    }
}
