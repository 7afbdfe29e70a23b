use crate::checksum::OnesComplementSum;
use crate::wire::{Ipv4Header, UdpHeader};

/// ICMP type of an echo reply.
pub const TYPE_ECHO_REPLY: u8 = 0;
/// ICMP type of a destination unreachable message.
pub const TYPE_DEST_UNREACH: u8 = 3;
/// ICMP type of an echo request.
pub const TYPE_ECHO_REQUEST: u8 = 8;
/// ICMP type of a time exceeded message.
pub const TYPE_TIME_EXCEEDED: u8 = 11;
/// ICMP type of a timestamp request.
pub const TYPE_TIMESTAMP: u8 = 13;
/// ICMP type of a timestamp reply.
pub const TYPE_TIMESTAMP_REPLY: u8 = 14;
/// ICMP type of an address mask request.
pub const TYPE_MASK_REQUEST: u8 = 17;
/// ICMP type of an address mask reply.
pub const TYPE_MASK_REPLY: u8 = 18;

/// Destination unreachable code "port unreachable".
pub const CODE_DEST_UNREACH_PORT: u8 = 3;
/// Time exceeded code "ttl exceeded in transit".
pub const CODE_TIME_EXCEEDED_TTL: u8 = 0;

/// Minimum length of an ICMP message (type, code, checksum, rest of
/// header).
pub const MIN_LEN: usize = 8;

/// Send timestamp carried at the start of an echo request payload.
///
/// The daemon writes it on send and reads it back from the echoed
/// payload to compute the round trip time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct EchoStamp {
    /// Seconds since the Unix epoch.
    pub secs: u32,
    /// Microsecond part.
    pub micros: u32,
}

impl EchoStamp {
    /// Serialized size of an echo stamp in bytes.
    pub const LEN: usize = 8;

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        let secs = self.secs.to_be_bytes();
        let micros = self.micros.to_be_bytes();
        [
            secs[0], secs[1], secs[2], secs[3], micros[0], micros[1], micros[2], micros[3],
        ]
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> EchoStamp {
        EchoStamp {
            secs: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            micros: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Microseconds elapsed between `self` and `later` (absolute
    /// value, like the daemon's reply handling).
    pub fn elapsed_micros(self, later: EchoStamp) -> u32 {
        let a = i64::from(self.secs) * 1_000_000 + i64::from(self.micros);
        let b = i64::from(later.secs) * 1_000_000 + i64::from(later.micros);
        (b - a).unsigned_abs().min(u64::from(u32::MAX)) as u32
    }
}

/// An outgoing probe message.
///
/// `write` serializes the message padded to the requested total
/// length with the checksum calculated over the whole message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProbeMessage {
    /// Echo request (type 8). The payload starts with the send
    /// timestamp.
    EchoRequest { id: u16, seq: u16, stamp: EchoStamp },
    /// Address mask request (type 17).
    MaskRequest { id: u16, seq: u16 },
    /// Timestamp request (type 13). The originate timestamp is
    /// milliseconds of day.
    TimestampRequest { id: u16, seq: u16, originate: u32 },
}

impl ProbeMessage {
    /// Serializes the message to `message_len` total bytes (header
    /// included). Bytes after the typed payload are filled with a
    /// rolling pad pattern.
    pub fn write(&self, message_len: usize) -> Vec<u8> {
        let message_len = message_len.max(MIN_LEN);
        let mut bytes = vec![0u8; message_len];

        let (icmp_type, id, seq) = match self {
            ProbeMessage::EchoRequest { id, seq, .. } => (TYPE_ECHO_REQUEST, *id, *seq),
            ProbeMessage::MaskRequest { id, seq } => (TYPE_MASK_REQUEST, *id, *seq),
            ProbeMessage::TimestampRequest { id, seq, .. } => (TYPE_TIMESTAMP, *id, *seq),
        };
        bytes[0] = icmp_type;
        // code and checksum stay zero for now
        bytes[4..6].copy_from_slice(&id.to_be_bytes());
        bytes[6..8].copy_from_slice(&seq.to_be_bytes());

        let data_offset = match self {
            ProbeMessage::EchoRequest { stamp, .. } => {
                let end = (MIN_LEN + EchoStamp::LEN).min(message_len);
                bytes[MIN_LEN..end].copy_from_slice(&stamp.to_bytes()[..end - MIN_LEN]);
                MIN_LEN + EchoStamp::LEN
            }
            ProbeMessage::MaskRequest { .. } => MIN_LEN,
            ProbeMessage::TimestampRequest { originate, .. } => {
                let end = (MIN_LEN + 4).min(message_len);
                bytes[MIN_LEN..end].copy_from_slice(&originate.to_be_bytes()[..end - MIN_LEN]);
                MIN_LEN + 4
            }
        };
        for (i, byte) in bytes.iter_mut().enumerate().skip(data_offset) {
            *byte = i as u8;
        }

        let checksum = OnesComplementSum::new()
            .add_slice(&bytes)
            .ones_complement()
            .to_be_bytes();
        bytes[2] = checksum[0];
        bytes[3] = checksum[1];
        bytes
    }
}

/// The original IP + UDP header echoed back inside a time exceeded
/// or destination unreachable message. Only the ports matter for
/// matching a trace probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EmbeddedUdp {
    /// Source port of the offending datagram.
    pub source_port: u16,
    /// Destination port of the offending datagram.
    pub destination_port: u16,
}

/// A received ICMP message, reduced to the cases the probe daemon
/// reacts to. Everything else is dropped by the parser.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReplyMessage {
    /// Echo reply with the echoed send timestamp.
    EchoReply { id: u16, seq: u16, stamp: EchoStamp },
    /// Address mask reply carrying the mask.
    MaskReply { id: u16, mask: u32 },
    /// Timestamp reply carrying the originate and receive stamps.
    TimestampReply { id: u16, originate: u32, receive: u32 },
    /// Time exceeded in transit for an embedded trace datagram.
    TimeExceeded(EmbeddedUdp),
    /// Port unreachable for an embedded trace datagram (final hop).
    DestUnreachable(EmbeddedUdp),
}

impl ReplyMessage {
    /// Parses an ICMP message (header included, IP header already
    /// stripped). Returns `None` for messages the daemon does not
    /// care about: unknown types, unexpected codes, short data.
    pub fn from_slice(icmp: &[u8]) -> Option<ReplyMessage> {
        if icmp.len() < MIN_LEN {
            return None;
        }
        let id = u16::from_be_bytes([icmp[4], icmp[5]]);
        let seq = u16::from_be_bytes([icmp[6], icmp[7]]);
        let data = &icmp[MIN_LEN..];

        match (icmp[0], icmp[1]) {
            (TYPE_ECHO_REPLY, _) => {
                if data.len() < EchoStamp::LEN {
                    return None;
                }
                let mut stamp = [0u8; 8];
                stamp.copy_from_slice(&data[..8]);
                Some(ReplyMessage::EchoReply {
                    id,
                    seq,
                    stamp: EchoStamp::from_bytes(stamp),
                })
            }
            (TYPE_MASK_REPLY, _) => {
                if data.len() < 4 {
                    return None;
                }
                Some(ReplyMessage::MaskReply {
                    id,
                    mask: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                })
            }
            (TYPE_TIMESTAMP_REPLY, _) => {
                if data.len() < 8 {
                    return None;
                }
                Some(ReplyMessage::TimestampReply {
                    id,
                    originate: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                    receive: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                })
            }
            (TYPE_TIME_EXCEEDED, CODE_TIME_EXCEEDED_TTL) => {
                Some(ReplyMessage::TimeExceeded(parse_embedded(data)?))
            }
            (TYPE_DEST_UNREACH, CODE_DEST_UNREACH_PORT) => {
                Some(ReplyMessage::DestUnreachable(parse_embedded(data)?))
            }
            _ => None,
        }
    }
}

/// Extracts the UDP ports from the embedded original datagram of an
/// ICMP error message (4 unused bytes were already consumed by the
/// 8 byte ICMP header).
fn parse_embedded(data: &[u8]) -> Option<EmbeddedUdp> {
    let (_, header_len) = Ipv4Header::from_slice(data).ok()?;
    let udp = UdpHeader::from_slice(&data[header_len..]).ok()?;
    Some(EmbeddedUdp {
        source_port: udp.source_port,
        destination_port: udp.destination_port,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn echo_request_layout() {
        let msg = ProbeMessage::EchoRequest {
            id: 0x1234,
            seq: 2,
            stamp: EchoStamp {
                secs: 100,
                micros: 250_000,
            },
        };
        let bytes = msg.write(64);
        assert_eq!(64, bytes.len());
        assert_eq!(TYPE_ECHO_REQUEST, bytes[0]);
        assert_eq!(0, bytes[1]);
        assert_eq!(&bytes[4..6], &0x1234u16.to_be_bytes());
        assert_eq!(&bytes[6..8], &2u16.to_be_bytes());
        assert_eq!(&bytes[8..12], &100u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &250_000u32.to_be_bytes());
        // pad pattern starts after the stamp
        assert_eq!(16, bytes[16]);
        assert_eq!(17, bytes[17]);
        // checksum over the whole message folds to zero
        assert_eq!(
            0,
            OnesComplementSum::new().add_slice(&bytes).ones_complement()
        );
    }

    #[test]
    fn mask_request_layout() {
        let bytes = ProbeMessage::MaskRequest { id: 7, seq: 0 }.write(44);
        assert_eq!(TYPE_MASK_REQUEST, bytes[0]);
        assert_eq!(8, bytes[8]);
        assert_eq!(
            0,
            OnesComplementSum::new().add_slice(&bytes).ones_complement()
        );
    }

    #[test]
    fn timestamp_request_layout() {
        let bytes = ProbeMessage::TimestampRequest {
            id: 9,
            seq: 1,
            originate: 123_456,
        }
        .write(44);
        assert_eq!(TYPE_TIMESTAMP, bytes[0]);
        assert_eq!(&bytes[8..12], &123_456u32.to_be_bytes());
        assert_eq!(
            0,
            OnesComplementSum::new().add_slice(&bytes).ones_complement()
        );
    }

    #[test]
    fn echo_reply_parse() {
        // turn a request into the matching reply the way a remote
        // host would: type 0, checksum recomputed
        let mut bytes = ProbeMessage::EchoRequest {
            id: 42,
            seq: 1,
            stamp: EchoStamp {
                secs: 10,
                micros: 20,
            },
        }
        .write(64);
        bytes[0] = TYPE_ECHO_REPLY;
        assert_eq!(
            Some(ReplyMessage::EchoReply {
                id: 42,
                seq: 1,
                stamp: EchoStamp {
                    secs: 10,
                    micros: 20
                },
            }),
            ReplyMessage::from_slice(&bytes)
        );
    }

    #[test]
    fn mask_reply_parse() {
        let mut bytes = vec![TYPE_MASK_REPLY, 0, 0, 0, 0, 5, 0, 0];
        bytes.extend_from_slice(&0xffff_ff00u32.to_be_bytes());
        assert_eq!(
            Some(ReplyMessage::MaskReply {
                id: 5,
                mask: 0xffff_ff00,
            }),
            ReplyMessage::from_slice(&bytes)
        );
    }

    #[test]
    fn timestamp_reply_parse() {
        let mut bytes = vec![TYPE_TIMESTAMP_REPLY, 0, 0, 0, 0, 5, 0, 0];
        bytes.extend_from_slice(&1_000u32.to_be_bytes());
        bytes.extend_from_slice(&1_250u32.to_be_bytes());
        bytes.extend_from_slice(&1_300u32.to_be_bytes());
        assert_eq!(
            Some(ReplyMessage::TimestampReply {
                id: 5,
                originate: 1_000,
                receive: 1_250,
            }),
            ReplyMessage::from_slice(&bytes)
        );
    }

    fn icmp_error(icmp_type: u8, code: u8, source_port: u16, destination_port: u16) -> Vec<u8> {
        let mut bytes = vec![icmp_type, code, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(
            &Ipv4Header {
                total_len: 64,
                identification: 1,
                ttl: 1,
                protocol: 17,
                source: [10, 0, 0, 1],
                destination: [198, 51, 100, 1],
            }
            .to_bytes(),
        );
        bytes.extend_from_slice(
            &UdpHeader {
                source_port,
                destination_port,
                length: 44,
            }
            .to_bytes(),
        );
        bytes
    }

    #[test]
    fn time_exceeded_parse() {
        assert_eq!(
            Some(ReplyMessage::TimeExceeded(EmbeddedUdp {
                source_port: 4000,
                destination_port: 50001,
            })),
            ReplyMessage::from_slice(&icmp_error(TYPE_TIME_EXCEEDED, 0, 4000, 50001))
        );
    }

    #[test]
    fn dest_unreachable_parse() {
        assert_eq!(
            Some(ReplyMessage::DestUnreachable(EmbeddedUdp {
                source_port: 4000,
                destination_port: 50001,
            })),
            ReplyMessage::from_slice(&icmp_error(TYPE_DEST_UNREACH, 3, 4000, 50001))
        );
    }

    #[test]
    fn wrong_codes_dropped() {
        // only "ttl exceeded in transit" and "port unreachable"
        // belong to trace probes
        assert_eq!(
            None,
            ReplyMessage::from_slice(&icmp_error(TYPE_TIME_EXCEEDED, 1, 1, 2))
        );
        assert_eq!(
            None,
            ReplyMessage::from_slice(&icmp_error(TYPE_DEST_UNREACH, 1, 1, 2))
        );
    }

    #[test]
    fn short_and_unknown_dropped() {
        assert_eq!(None, ReplyMessage::from_slice(&[0u8; 4]));
        assert_eq!(None, ReplyMessage::from_slice(&[12u8, 0, 0, 0, 0, 0, 0, 0]));
        // echo reply without a full stamp
        assert_eq!(
            None,
            ReplyMessage::from_slice(&[TYPE_ECHO_REPLY, 0, 0, 0, 0, 1, 0, 0, 1, 2])
        );
    }

    #[test]
    fn elapsed_micros() {
        let sent = EchoStamp {
            secs: 100,
            micros: 900_000,
        };
        let received = EchoStamp {
            secs: 101,
            micros: 150_000,
        };
        assert_eq!(250_000, sent.elapsed_micros(received));
        // negative differences are folded to their absolute value
        assert_eq!(250_000, received.elapsed_micros(sent));
    }

    proptest! {
        #[test]
        fn echo_stamp_roundtrip(secs in any::<u32>(), micros in 0u32..1_000_000) {
            let stamp = EchoStamp { secs, micros };
            prop_assert_eq!(EchoStamp::from_bytes(stamp.to_bytes()), stamp);
        }

        #[test]
        fn request_checksums_fold_to_zero(
            id in any::<u16>(),
            seq in any::<u16>(),
            len in 44usize..256
        ) {
            for msg in [
                ProbeMessage::EchoRequest { id, seq, stamp: EchoStamp::default() },
                ProbeMessage::MaskRequest { id, seq },
                ProbeMessage::TimestampRequest { id, seq, originate: 1 },
            ] {
                prop_assert_eq!(
                    0,
                    OnesComplementSum::new()
                        .add_slice(&msg.write(len))
                        .ones_complement()
                );
            }
        }
    }
}
