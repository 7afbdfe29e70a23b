use crate::daemon::job::TraceSourcePort;
use crate::daemon::ports::swap16;
use crate::sys;
use crate::wire::{Ipv4Header, UdpHeader};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::AsRawFd;

/// Sender for the UDP probes of trace jobs.
///
/// Where the OS honors `IP_TTL` on a datagram socket the daemon uses
/// that; the job identity then travels in the destination port only
/// because the kernel picks the source port. Otherwise a raw socket
/// with `IP_HDRINCL` is used and the IP and UDP headers are built by
/// hand with the job ident as source port. Both paths put the same
/// IP datagram on the wire.
pub enum TraceSender {
    TtlSocket {
        socket: Socket,
        source_port: u16,
        /// Socket bound to the byte swapped source port, claimed so
        /// no other program receives the answers of confused legacy
        /// responders. Never read from.
        _alias: Option<Socket>,
    },
    RawIp {
        socket: Socket,
    },
}

impl TraceSender {
    /// Capability probe at daemon startup: prefer the TTL socket
    /// path, fall back to raw IP.
    pub fn open() -> io::Result<TraceSender> {
        match TraceSender::open_ttl() {
            Ok(sender) => Ok(sender),
            Err(error) => {
                tracing::debug!(%error, "IP_TTL path unavailable, using raw IP");
                TraceSender::open_raw()
            }
        }
    }

    fn open_ttl() -> io::Result<TraceSender> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
        // probe that the option actually works before committing
        socket.set_ttl(1)?;
        if socket.ttl()? != 1 {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "IP_TTL ignored"));
        }
        let source_port = socket
            .local_addr()?
            .as_socket_ipv4()
            .map(|addr| addr.port())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no local port"))?;

        // best effort: claim the byte swapped twin of our port
        let alias = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .and_then(|socket| {
                socket.bind(
                    &SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, swap16(source_port)).into(),
                )?;
                Ok(socket)
            })
            .ok();

        tracing::debug!(source_port, alias = alias.is_some(), "trace via IP_TTL");
        Ok(TraceSender::TtlSocket {
            socket,
            source_port,
            _alias: alias,
        })
    }

    fn open_raw() -> io::Result<TraceSender> {
        let socket = Socket::new(
            Domain::IPV4,
            Type::RAW,
            Some(Protocol::from(libc::IPPROTO_RAW)),
        )?;
        let on: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &on as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(TraceSender::RawIp { socket })
    }

    /// How receive matching should derive the expected source port.
    pub fn source_port_mode(&self) -> TraceSourcePort {
        match self {
            TraceSender::TtlSocket { source_port, .. } => TraceSourcePort::Shared(*source_port),
            TraceSender::RawIp { .. } => TraceSourcePort::PerJobIdent,
        }
    }

    /// Sends one trace probe: an IP datagram of `size` bytes total
    /// with the requested TTL, addressed to `destination:port`.
    pub fn send(
        &self,
        destination: Ipv4Addr,
        port: u16,
        ident: u16,
        ttl: u8,
        size: u16,
    ) -> io::Result<usize> {
        match self {
            TraceSender::TtlSocket { socket, .. } => {
                socket.set_ttl(u32::from(ttl))?;
                let payload = trace_payload(size);
                socket.send_to(&payload, &SocketAddrV4::new(destination, port).into())
            }
            TraceSender::RawIp { socket } => {
                let packet = trace_datagram(destination, port, ident, ttl, size);
                sys::send_to(
                    socket.as_raw_fd(),
                    &packet,
                    SocketAddrV4::new(destination, 0),
                )
            }
        }
    }
}

/// The UDP payload of a trace probe: pad bytes filling the datagram
/// up to `size` total IP bytes.
fn trace_payload(size: u16) -> Vec<u8> {
    let header_len = Ipv4Header::MIN_LEN + UdpHeader::LEN;
    let payload_len = usize::from(size).saturating_sub(header_len);
    (0..payload_len).map(|i| (b'A' + (i % 26) as u8)).collect()
}

/// The complete IP + UDP datagram the raw path puts on the wire.
pub fn trace_datagram(
    destination: Ipv4Addr,
    port: u16,
    ident: u16,
    ttl: u8,
    size: u16,
) -> Vec<u8> {
    let payload = trace_payload(size);
    let udp_len = (UdpHeader::LEN + payload.len()) as u16;
    let ip = Ipv4Header {
        total_len: (Ipv4Header::MIN_LEN as u16) + udp_len,
        identification: ident,
        ttl,
        protocol: libc::IPPROTO_UDP as u8,
        source: [0, 0, 0, 0], // filled in by the kernel
        destination: destination.octets(),
    };
    let udp = UdpHeader {
        source_port: ident,
        destination_port: port,
        length: udp_len,
    };
    let mut packet = Vec::with_capacity(usize::from(size));
    packet.extend_from_slice(&ip.to_bytes());
    packet.extend_from_slice(&udp.to_bytes());
    packet.extend_from_slice(&payload);
    packet
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn datagram_layout() {
        let packet = trace_datagram(Ipv4Addr::new(198, 51, 100, 1), 50001, 0x4201, 5, 64);
        assert_eq!(64, packet.len());

        let (ip, header_len) = Ipv4Header::from_slice(&packet).unwrap();
        assert_eq!(Ipv4Header::MIN_LEN, header_len);
        assert_eq!(64, ip.total_len);
        assert_eq!(5, ip.ttl);
        assert_eq!(libc::IPPROTO_UDP as u8, ip.protocol);
        assert_eq!([198, 51, 100, 1], ip.destination);

        let udp = UdpHeader::from_slice(&packet[header_len..]).unwrap();
        assert_eq!(0x4201, udp.source_port);
        assert_eq!(50001, udp.destination_port);
        assert_eq!(64 - 20, udp.length);
    }

    #[test]
    fn payload_fills_to_size() {
        assert_eq!(44 - 28, trace_payload(44).len());
        // datagrams smaller than the headers carry no payload
        assert_eq!(0, trace_payload(20).len());
    }

    #[test]
    fn both_paths_agree_on_wire_size() {
        // TTL socket path: kernel adds 28 header bytes on top of the
        // payload; raw path: headers are in the buffer already
        let size = 64u16;
        let payload = trace_payload(size);
        let datagram = trace_datagram(Ipv4Addr::new(10, 0, 0, 1), 50000, 1, 3, size);
        assert_eq!(
            payload.len() + Ipv4Header::MIN_LEN + UdpHeader::LEN,
            datagram.len()
        );
    }
}
