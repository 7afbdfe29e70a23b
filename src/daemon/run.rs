use crate::daemon::job::JobTable;
use crate::daemon::trace::TraceSender;
use crate::sys;
use crate::wire::icmp::{EchoStamp, ProbeMessage, ReplyMessage};
use crate::wire::{Ipv4Header, ProbeKind, RequestFrame};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddrV4;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant, SystemTime};

/// Largest ICMP message the daemon reads from its raw socket.
const RECV_BUF_LEN: usize = 65536 + 128;

/// The wall clock as an [`EchoStamp`].
pub fn wall_stamp() -> EchoStamp {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    EchoStamp {
        secs: now.as_secs() as u32,
        micros: now.subsec_micros(),
    }
}

/// Milliseconds since midnight UTC, the originate value of ICMP
/// timestamp requests.
pub fn millis_of_day(stamp: EchoStamp) -> u32 {
    (stamp.secs % 86_400) * 1_000 + stamp.micros / 1_000
}

/// Buffered non blocking writes to the reply channel. A slow client
/// keeps its bytes queued here instead of stalling the daemon.
struct ReplyWriter {
    fd: RawFd,
    pending: Vec<u8>,
}

impl ReplyWriter {
    fn new(fd: RawFd) -> ReplyWriter {
        ReplyWriter {
            fd,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes as much as the pipe accepts right now.
    fn flush(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            let rc = unsafe {
                libc::write(
                    self.fd,
                    self.pending.as_ptr() as *const libc::c_void,
                    self.pending.len(),
                )
            };
            if rc < 0 {
                let error = io::Error::last_os_error();
                match error.raw_os_error() {
                    Some(libc::EAGAIN) | Some(libc::EINTR) => return Ok(()),
                    _ => return Err(error),
                }
            }
            self.pending.drain(..rc as usize);
        }
        Ok(())
    }
}

/// The privileged probe daemon: a raw ICMP socket, the trace
/// sender, the job table and a select loop over stdin and the raw
/// socket.
pub struct ProbeDaemon {
    icmp: Socket,
    trace: TraceSender,
    jobs: JobTable,
    writer: ReplyWriter,
    eof: bool,
}

impl ProbeDaemon {
    /// Opens the sockets. Must run before privileges are dropped;
    /// failure here is fatal for the process.
    pub fn open() -> io::Result<ProbeDaemon> {
        let icmp = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        let trace = TraceSender::open()?;
        let ident_seed = ((std::process::id() & 0xff) << 8) as u16;
        let jobs = JobTable::new(ident_seed, trace.source_port_mode());
        Ok(ProbeDaemon {
            icmp,
            trace,
            jobs,
            writer: ReplyWriter::new(libc::STDOUT_FILENO),
            eof: false,
        })
    }

    /// The main loop: wakes on stdin, the raw socket or the next
    /// retry deadline; exits once stdin hit EOF and every job has
    /// been answered.
    pub fn run(&mut self) -> io::Result<()> {
        sys::set_nonblocking(libc::STDOUT_FILENO)?;
        loop {
            if self.eof && self.jobs.is_empty() && self.writer.is_empty() {
                tracing::debug!("exiting on EOF");
                return Ok(());
            }

            let mut fds = sys::FdSet::new();
            if !self.eof {
                fds.insert(libc::STDIN_FILENO);
            }
            fds.insert(self.icmp.as_raw_fd());

            let timeout = if self.jobs.is_empty() && self.writer.is_empty() {
                None // block until a new job arrives
            } else if self.writer.is_empty() {
                self.jobs.next_deadline(Instant::now())
            } else {
                // unwritten replies: poll again soon
                Some(Duration::from_millis(100))
            };

            sys::select(&mut fds, timeout)?;

            if fds.contains(self.icmp.as_raw_fd()) {
                self.receive_pending(Duration::ZERO)?;
            }
            if !self.eof && fds.contains(libc::STDIN_FILENO) {
                self.read_job()?;
            }

            self.send_pending()?;
            self.writer.flush()?;
        }
    }

    /// Reads one request frame from stdin; EOF arms the drain and
    /// exit path.
    ///
    /// The descriptor is read directly (no buffering): a buffered
    /// reader would swallow queued frames the select loop can no
    /// longer see.
    fn read_job(&mut self) -> io::Result<()> {
        let mut bytes = [0u8; RequestFrame::LEN];
        let mut filled = 0;
        while filled < bytes.len() {
            let rc = unsafe {
                libc::read(
                    libc::STDIN_FILENO,
                    bytes[filled..].as_mut_ptr() as *mut libc::c_void,
                    bytes.len() - filled,
                )
            };
            if rc < 0 {
                let error = io::Error::last_os_error();
                match error.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    _ => return Err(error),
                }
            }
            if rc == 0 {
                if filled != 0 {
                    tracing::warn!(filled, "request channel closed inside a frame");
                }
                tracing::debug!("EOF on request channel");
                self.eof = true;
                return Ok(());
            }
            filled += rc as usize;
        }
        self.jobs.accept(RequestFrame::from_bytes(bytes));
        Ok(())
    }

    /// Receives and matches ICMP messages. With a non zero budget
    /// the call keeps servicing the socket until the budget is
    /// spent, which implements the inter packet delay without going
    /// deaf.
    fn receive_pending(&mut self, budget: Duration) -> io::Result<()> {
        let started = Instant::now();
        loop {
            let mut fds = sys::FdSet::new();
            fds.insert(self.icmp.as_raw_fd());
            let remaining = budget.saturating_sub(started.elapsed());
            let ready = sys::select(&mut fds, Some(remaining))?;
            if ready == 0 && remaining.is_zero() {
                return Ok(());
            }
            if ready > 0 {
                self.receive_one()?;
            } else if started.elapsed() >= budget {
                return Ok(());
            }
        }
    }

    /// One `recvfrom` on the raw socket; malformed or unmatched
    /// packets are dropped silently.
    fn receive_one(&mut self) -> io::Result<()> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        let (len, from) = match sys::recv_from(self.icmp.as_raw_fd(), &mut buf) {
            Ok(result) => result,
            Err(error) => {
                return match error.raw_os_error() {
                    Some(libc::EINTR) | Some(libc::EAGAIN) => Ok(()),
                    _ => Err(error),
                };
            }
        };
        let received = wall_stamp();

        // the raw socket hands over the complete IP packet
        let Ok((_, header_len)) = Ipv4Header::from_slice(&buf[..len]) else {
            tracing::debug!(len, "short packet, ignored");
            return Ok(());
        };
        let Some(message) = ReplyMessage::from_slice(&buf[header_len..len]) else {
            tracing::debug!(len, "unknown or malformed ICMP message, ignored");
            return Ok(());
        };
        if self.jobs.match_reply(&message, from, received) {
            for frame in self.jobs.drain_done() {
                self.writer.push(&frame.to_bytes());
            }
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Admits jobs to the window and sends every probe that is due,
    /// pacing by the per job delay while still servicing replies.
    fn send_pending(&mut self) -> io::Result<()> {
        loop {
            self.jobs.admit();
            let now = Instant::now();
            self.jobs.expire(now);

            let Some(index) = self.jobs.pick_due(now) else {
                break;
            };
            let stamp = wall_stamp();
            let (result, delay_ms) = {
                let job = &self.jobs.jobs()[index];
                let destination = job.request.destination;
                let size = job.request.size;
                let seq = job.probe_cnt as u16;
                let send_result = match job.kind() {
                    Some(ProbeKind::Trace) => self.trace.send(
                        destination,
                        job.trace_port,
                        job.id,
                        job.request.ttl,
                        size,
                    ),
                    Some(ProbeKind::Echo) => self.send_icmp(
                        ProbeMessage::EchoRequest {
                            id: job.id,
                            seq,
                            stamp,
                        },
                        destination,
                        size,
                    ),
                    Some(ProbeKind::Mask) => self.send_icmp(
                        ProbeMessage::MaskRequest { id: job.id, seq },
                        destination,
                        size,
                    ),
                    Some(ProbeKind::Timestamp) => self.send_icmp(
                        ProbeMessage::TimestampRequest {
                            id: job.id,
                            seq,
                            originate: millis_of_day(stamp),
                        },
                        destination,
                        size,
                    ),
                    // invalid types never leave the accept path
                    None => Ok(0),
                };
                (send_result, job.request.delay_ms)
            };

            match result {
                Ok(_) => self.jobs.mark_sent(index, now, stamp),
                Err(error) => match error.raw_os_error() {
                    // transient conditions, try the same probe again
                    Some(libc::EINTR) | Some(libc::EAGAIN) | Some(libc::ECONNREFUSED) => continue,
                    // stale ARP entry, count the attempt and retry later
                    Some(libc::EHOSTDOWN) => self.jobs.mark_sent(index, now, stamp),
                    _ => {
                        tracing::warn!(%error, "send failed");
                        self.jobs.mark_send_error(index);
                    }
                },
            }

            if delay_ms > 0 {
                self.receive_pending(Duration::from_millis(u64::from(delay_ms)))?;
            }
        }

        for frame in self.jobs.drain_done() {
            self.writer.push(&frame.to_bytes());
        }
        self.writer.flush()
    }

    fn send_icmp(
        &self,
        message: ProbeMessage,
        destination: std::net::Ipv4Addr,
        size: u16,
    ) -> io::Result<usize> {
        sys::send_to(
            self.icmp.as_raw_fd(),
            &message.write(usize::from(size)),
            SocketAddrV4::new(destination, 0),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn millis_of_day_wraps_at_midnight() {
        assert_eq!(
            0,
            millis_of_day(EchoStamp {
                secs: 86_400,
                micros: 0
            })
        );
        assert_eq!(
            1_500,
            millis_of_day(EchoStamp {
                secs: 86_401,
                micros: 500_000
            })
        );
        // 12:00:00.250 UTC
        assert_eq!(
            43_200_250,
            millis_of_day(EchoStamp {
                secs: 43_200,
                micros: 250_999
            })
        );
    }

    #[test]
    fn wall_stamp_is_monotonic_enough() {
        let a = wall_stamp();
        let b = wall_stamp();
        assert!(
            b.secs > a.secs || (b.secs == a.secs && b.micros >= a.micros),
            "wall stamps went backwards within one test"
        );
    }

    #[test]
    fn reply_writer_buffers_until_flushed() {
        // writing into a full non blocking pipe keeps bytes pending
        let mut fds = [0 as RawFd; 2];
        assert_eq!(0, unsafe { libc::pipe(fds.as_mut_ptr()) });
        sys::set_nonblocking(fds[1]).unwrap();

        let mut writer = ReplyWriter::new(fds[1]);
        writer.push(&[1, 2, 3, 4]);
        assert!(!writer.is_empty());
        writer.flush().unwrap();
        assert!(writer.is_empty());

        let mut read_back = [0u8; 4];
        assert_eq!(4, unsafe {
            libc::read(fds[0], read_back.as_mut_ptr() as *mut libc::c_void, 4)
        });
        assert_eq!([1, 2, 3, 4], read_back);

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
