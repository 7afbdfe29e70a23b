use crate::probe::{ProbeRequest, Target, MAX_PROBE_SIZE, MIN_PROBE_SIZE};
use crate::wire::{ProbeKind, ProbeStatus, ReplyFrame, RequestFrame};
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Environment variable overriding the helper daemon path.
pub const HELPER_PATH_ENV: &str = "NETPROBE_ICMPD";

/// Compiled default path of the helper daemon.
pub const DEFAULT_HELPER_PATH: &str = "/usr/local/bin/icmpd";

/// Errors surfaced by the client transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot spawn probe helper \"{path}\": {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("probe helper: {0}")]
    Io(#[from] io::Error),
    #[error("probe helper failed to send ICMP message")]
    ProbeFailed,
    #[error("invalid probe size {0}")]
    InvalidSize(u16),
    #[error("probe helper protocol error: {0}")]
    Protocol(&'static str),
}

/// The spawned helper process with its frame pipes.
struct Helper {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl Helper {
    fn spawn() -> Result<Helper, TransportError> {
        let path =
            std::env::var(HELPER_PATH_ENV).unwrap_or_else(|_| DEFAULT_HELPER_PATH.to_string());
        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                path: path.clone(),
                source,
            })?;
        // the pipes exist right after a successful piped spawn
        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::Protocol("helper stdin missing"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::Protocol("helper stdout missing"))?;
        tracing::debug!(path, pid = child.id(), "probe helper spawned");
        Ok(Helper {
            child,
            stdin,
            stdout,
        })
    }
}

impl Drop for Helper {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Client transport to the probe helper daemon.
///
/// The helper is spawned on first use and terminated when the
/// transport is dropped. A framing failure tears the helper down;
/// the next call spawns a fresh one.
pub struct IcmpTransport {
    helper: Option<Helper>,
    next_tid: u32,
}

impl IcmpTransport {
    pub fn new() -> IcmpTransport {
        IcmpTransport {
            helper: None,
            next_tid: 1,
        }
    }

    /// Probes every target of the batch under the request's policy.
    ///
    /// Requests are submitted in target order; replies are matched
    /// back by transaction id. The call blocks until every target
    /// has its reply.
    pub fn probe(
        &mut self,
        request: &ProbeRequest,
        targets: &mut [Target],
    ) -> Result<(), TransportError> {
        if request.options.size < MIN_PROBE_SIZE || request.options.size > MAX_PROBE_SIZE {
            return Err(TransportError::InvalidSize(request.options.size));
        }
        if targets.is_empty() {
            return Ok(());
        }
        for target in targets.iter_mut() {
            target.tid = self.next_tid;
            self.next_tid = self.next_tid.wrapping_add(1);
        }

        if self.helper.is_none() {
            self.helper = Some(Helper::spawn()?);
        }
        let helper = match self.helper.as_mut() {
            Some(helper) => helper,
            None => return Err(TransportError::Protocol("helper unavailable")),
        };

        let result = exchange_frames(&mut helper.stdin, &mut helper.stdout, request, targets);
        if result.is_err() {
            // a broken frame stream is unrecoverable, restart next call
            self.helper = None;
        }
        result
    }
}

impl Default for IcmpTransport {
    fn default() -> IcmpTransport {
        IcmpTransport::new()
    }
}

/// Writes one request frame per target, then reads exactly one reply
/// frame per target and copies each into its row.
///
/// A `generror` reply fails the whole call, but only after the
/// remaining replies have been drained so the stream stays framed.
fn exchange_frames<W: Write, R: Read>(
    writer: &mut W,
    reader: &mut R,
    request: &ProbeRequest,
    targets: &mut [Target],
) -> Result<(), TransportError> {
    for target in targets.iter() {
        let mut frame = RequestFrame::new(request.kind, target.tid, target.dst);
        if request.kind == ProbeKind::Trace {
            frame.ttl = request.ttl;
        }
        frame.timeout_s = request.options.timeout_s;
        frame.retries = request.options.retries;
        frame.delay_ms = request.options.delay_ms;
        frame.size = request.options.size;
        frame.window = request.options.window;
        writer.write_all(&frame.to_bytes())?;
    }
    writer.flush()?;

    let mut failed = false;
    for _ in 0..targets.len() {
        let mut bytes = [0u8; ReplyFrame::LEN];
        reader.read_exact(&mut bytes)?;
        let frame = ReplyFrame::from_bytes(bytes);

        if frame.probe_status() == Some(ProbeStatus::GenError) {
            tracing::warn!(tid = frame.tid, "probe helper reported an error");
            failed = true;
            continue;
        }
        if frame.probe_kind() != Some(request.kind) {
            return Err(TransportError::Protocol("reply type mismatch"));
        }
        if let Some(target) = targets.iter_mut().find(|t| t.tid == frame.tid) {
            target.absorb(&frame, request.kind, request.report_lasthop);
        }
    }
    if failed {
        return Err(TransportError::ProbeFailed);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::probe::{ProbeOptions, ProbeValue};
    use crate::wire::{FLAG_LASTHOP, PROTO_VERSION};
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn reply_bytes(kind: ProbeKind, status: ProbeStatus, flags: u8, tid: u32, result: u32) -> [u8; 16] {
        ReplyFrame {
            version: PROTO_VERSION,
            kind: kind as u8,
            status: status as u8,
            flags,
            tid,
            addr: Ipv4Addr::new(10, 0, 0, 9),
            result,
        }
        .to_bytes()
    }

    fn targets(tids: &[u32]) -> Vec<Target> {
        tids.iter()
            .map(|tid| {
                let mut t = Target::new(Ipv4Addr::new(192, 0, 2, 7));
                t.tid = *tid;
                t
            })
            .collect()
    }

    #[test]
    fn requests_are_framed_in_target_order() {
        let request = ProbeRequest::echo(ProbeOptions::default());
        let mut rows = targets(&[5, 6]);
        let mut written = Vec::new();
        let mut replies = Vec::new();
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::NoError, 0, 5, 1));
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::NoError, 0, 6, 2));

        exchange_frames(&mut written, &mut Cursor::new(replies), &request, &mut rows).unwrap();

        assert_eq!(2 * RequestFrame::LEN, written.len());
        let first = RequestFrame::from_slice(&written[..20]).unwrap();
        let second = RequestFrame::from_slice(&written[20..]).unwrap();
        assert_eq!(5, first.tid);
        assert_eq!(6, second.tid);
        assert_eq!(PROTO_VERSION, first.version);
        assert_eq!(ProbeKind::Echo as u8, first.kind);
    }

    #[test]
    fn replies_rematch_by_tid_out_of_order() {
        let request = ProbeRequest::echo(ProbeOptions::default());
        let mut rows = targets(&[1, 2]);
        let mut replies = Vec::new();
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::NoError, 0, 2, 222));
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::Timeout, 0, 1, 0));

        let mut written = Vec::new();
        exchange_frames(&mut written, &mut Cursor::new(replies), &request, &mut rows).unwrap();

        assert_eq!(ProbeValue::None, rows[0].value);
        assert_eq!(ProbeStatus::Timeout, rows[0].status);
        assert_eq!(ProbeValue::Rtt(222), rows[1].value);
        assert_eq!(ProbeStatus::NoError, rows[1].status);
    }

    #[test]
    fn generror_fails_after_draining() {
        let request = ProbeRequest::echo(ProbeOptions::default());
        let mut rows = targets(&[1, 2]);
        let mut replies = Vec::new();
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::GenError, 0, 1, 0));
        replies.extend_from_slice(&reply_bytes(ProbeKind::Echo, ProbeStatus::NoError, 0, 2, 70));

        let mut written = Vec::new();
        let result = exchange_frames(&mut written, &mut Cursor::new(replies), &request, &mut rows);

        assert!(matches!(result, Err(TransportError::ProbeFailed)));
        // the second reply was still consumed and applied
        assert_eq!(ProbeValue::Rtt(70), rows[1].value);
    }

    #[test]
    fn short_reply_stream_is_fatal() {
        let request = ProbeRequest::echo(ProbeOptions::default());
        let mut rows = targets(&[1]);
        let mut written = Vec::new();
        let result = exchange_frames(
            &mut written,
            &mut Cursor::new(vec![0u8; 7]),
            &request,
            &mut rows,
        );
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[test]
    fn trace_carries_ttl_and_lasthop() {
        let request = ProbeRequest::trace(5, ProbeOptions::default());
        let mut rows = targets(&[9]);
        let replies =
            reply_bytes(ProbeKind::Trace, ProbeStatus::NoError, FLAG_LASTHOP, 9, 1234).to_vec();

        let mut written = Vec::new();
        exchange_frames(&mut written, &mut Cursor::new(replies), &request, &mut rows).unwrap();

        let frame = RequestFrame::from_slice(&written).unwrap();
        assert_eq!(5, frame.ttl);
        assert!(rows[0].lasthop);
        assert_eq!(ProbeValue::Rtt(1234), rows[0].value);

        // the plain ttl flavour suppresses the indication
        let request = ProbeRequest::ttl(5, ProbeOptions::default());
        let mut rows = targets(&[9]);
        let replies =
            reply_bytes(ProbeKind::Trace, ProbeStatus::NoError, FLAG_LASTHOP, 9, 1234).to_vec();
        exchange_frames(&mut Vec::new(), &mut Cursor::new(replies), &request, &mut rows).unwrap();
        assert!(!rows[0].lasthop);
    }

    #[test]
    fn size_is_validated_before_any_io() {
        let mut transport = IcmpTransport::new();
        let mut request = ProbeRequest::echo(ProbeOptions::default());
        request.options.size = 10;
        let mut rows = targets(&[0]);
        assert!(matches!(
            transport.probe(&request, &mut rows),
            Err(TransportError::InvalidSize(10))
        ));
    }
}
