//! The trap sink daemon: owns the privileged SNMP trap UDP port and
//! fans every received datagram out to local stream subscribers,
//! framed with the [`crate::wire::TrapEnvelope`].

use crate::sys;
use crate::wire::TrapEnvelope;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

/// The SNMP trap port.
pub const TRAP_PORT: u16 = 162;

/// TCP port subscribers connect to.
pub const FORWARD_PORT: u16 = 1702;

/// All-hosts multicast group joined as a second trap input.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);

/// Grace period before the first datagram may trigger the
/// empty-subscriber exit, so the first subscriber can attach.
pub const STARTUP_GRACE: Duration = Duration::from_secs(3);

/// Errors of the trap daemon setup.
#[derive(Debug, thiserror::Error)]
pub enum TrapdError {
    #[error("access to port {0} denied")]
    PrivilegedPort(u16),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes one envelope plus body to every subscriber. A subscriber
/// whose write fails is dropped silently; the others still receive
/// the complete envelope. Returns the surviving subscribers' count.
fn forward_all<W: Write>(
    subscribers: &mut Vec<W>,
    source: SocketAddrV4,
    body: &[u8],
) -> usize {
    let mut message = Vec::with_capacity(TrapEnvelope::LEN + body.len());
    message.extend_from_slice(&TrapEnvelope::new(source, body.len()).to_bytes());
    message.extend_from_slice(body);

    subscribers.retain_mut(|subscriber| match subscriber.write_all(&message) {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(%error, "subscriber write failed, dropped");
            false
        }
    });
    subscribers.len()
}

/// The trap daemon state: both trap inputs, the subscriber listener
/// and the connected subscribers.
pub struct TrapDaemon {
    trap: UdpSocket,
    mcast: Option<UdpSocket>,
    listener: TcpListener,
    subscribers: Vec<TcpStream>,
    had_subscriber: bool,
}

impl TrapDaemon {
    /// Binds the trap sockets; must run while still privileged.
    /// Ports below 1024 other than the trap port itself are
    /// rejected.
    pub fn open(port: u16) -> Result<TrapDaemon, TrapdError> {
        if port != TRAP_PORT && port < 1024 {
            return Err(TrapdError::PrivilegedPort(port));
        }

        let trap = bind_udp(port)?;

        // multicast input is best effort
        let mcast = match open_multicast(port) {
            Ok(socket) => Some(socket),
            Err(error) => {
                tracing::warn!(%error, "multicast trap input unavailable");
                None
            }
        };

        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, FORWARD_PORT))
            .map_err(TrapdError::Io)?;

        Ok(TrapDaemon {
            trap,
            mcast,
            listener,
            subscribers: Vec::new(),
            had_subscriber: false,
        })
    }

    /// Serves until every subscriber that ever connected has gone
    /// away again.
    pub fn run(&mut self) -> Result<(), TrapdError> {
        std::thread::sleep(STARTUP_GRACE);
        loop {
            let mut fds = sys::FdSet::new();
            fds.insert(self.trap.as_raw_fd());
            fds.insert(self.listener.as_raw_fd());
            if let Some(mcast) = &self.mcast {
                fds.insert(mcast.as_raw_fd());
            }
            for subscriber in &self.subscribers {
                fds.insert(subscriber.as_raw_fd());
            }

            sys::select(&mut fds, None)?;

            if fds.contains(self.listener.as_raw_fd()) {
                self.accept_subscriber();
            }
            if fds.contains(self.trap.as_raw_fd()) {
                self.forward_from(Input::Trap)?;
            }
            if let Some(fd) = self.mcast.as_ref().map(|m| m.as_raw_fd()) {
                if fds.contains(fd) {
                    self.forward_from(Input::Multicast)?;
                }
            }
            // a readable subscriber means EOF or garbage: drop it
            self.subscribers.retain(|subscriber| {
                if fds.contains(subscriber.as_raw_fd()) {
                    tracing::debug!("subscriber disconnected");
                    false
                } else {
                    true
                }
            });

            if self.had_subscriber && self.subscribers.is_empty() {
                tracing::debug!("last subscriber gone, exiting");
                return Ok(());
            }
        }
    }

    fn accept_subscriber(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if stream.as_raw_fd() >= libc::FD_SETSIZE as RawFd {
                    tracing::error!("too many clients");
                    return;
                }
                tracing::debug!(%peer, "subscriber connected");
                self.subscribers.push(stream);
                self.had_subscriber = true;
            }
            Err(error) => tracing::warn!(%error, "accept failed"),
        }
    }

    fn forward_from(&mut self, input: Input) -> Result<(), TrapdError> {
        let socket = match input {
            Input::Trap => &self.trap,
            Input::Multicast => match &self.mcast {
                Some(socket) => socket,
                None => return Ok(()),
            },
        };
        let mut buf = [0u8; 8192];
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(%error, "unable to receive trap");
                return Ok(());
            }
        };
        let source = match from {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => return Ok(()),
        };
        tracing::debug!(%source, len, "trap received");
        forward_all(&mut self.subscribers, source, &buf[..len]);
        Ok(())
    }
}

enum Input {
    Trap,
    Multicast,
}

fn bind_udp(port: u16) -> Result<UdpSocket, TrapdError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    Ok(socket.into())
}

fn open_multicast(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    Ok(socket.into())
}
