use crate::err::{Layer, LenError};

/// UDP header according to RFC 768.
///
/// The trace probes leave the checksum at zero (legal for IPv4), so
/// no pseudo header calculation is offered here.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct UdpHeader {
    /// Source port of the packet.
    pub source_port: u16,
    /// Destination port of the packet.
    pub destination_port: u16,
    /// Length of the packet (includes the UDP header length of 8 bytes).
    pub length: u16,
}

impl UdpHeader {
    /// Serialized size of an UDP header in bytes/octets.
    pub const LEN: usize = 8;

    /// Returns the on the wire bytes with a zero checksum.
    #[inline]
    pub fn to_bytes(&self) -> [u8; 8] {
        let source_port = self.source_port.to_be_bytes();
        let destination_port = self.destination_port.to_be_bytes();
        let length = self.length.to_be_bytes();
        [
            source_port[0],
            source_port[1],
            destination_port[0],
            destination_port[1],
            length[0],
            length[1],
            0,
            0,
        ]
    }

    /// Decodes the header from the start of the given slice.
    pub fn from_slice(slice: &[u8]) -> Result<UdpHeader, LenError> {
        if slice.len() < UdpHeader::LEN {
            return Err(LenError {
                required_len: UdpHeader::LEN,
                len: slice.len(),
                layer: Layer::UdpHeader,
            });
        }
        Ok(UdpHeader {
            source_port: u16::from_be_bytes([slice[0], slice[1]]),
            destination_port: u16::from_be_bytes([slice[2], slice[3]]),
            length: u16::from_be_bytes([slice[4], slice[5]]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip(
            source_port in any::<u16>(),
            destination_port in any::<u16>(),
            length in any::<u16>()
        ) {
            let header = UdpHeader { source_port, destination_port, length };
            prop_assert_eq!(
                UdpHeader::from_slice(&header.to_bytes()).unwrap(),
                header
            );
        }
    }

    #[test]
    fn from_slice_len_error() {
        assert_eq!(
            UdpHeader::from_slice(&[0u8; 7]),
            Err(LenError {
                required_len: UdpHeader::LEN,
                len: 7,
                layer: Layer::UdpHeader,
            })
        );
    }
}
