use crate::daemon::ports::{swap16, TracePortPool};
use crate::probe::{MAX_PROBE_SIZE, MIN_PROBE_SIZE};
use crate::wire::icmp::{EchoStamp, ReplyMessage};
use crate::wire::{ProbeKind, ProbeStatus, ReplyFrame, RequestFrame, FLAG_LASTHOP, PROTO_VERSION};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Upper bound on concurrently serviced jobs, regardless of the
/// window the client asked for.
pub const MAX_INFLIGHT: usize = 200;

/// How the source port of trace probes is chosen: the raw IP path
/// stamps each job's ident into the header, the TTL socket path
/// shares the bound port of the daemon's UDP socket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceSourcePort {
    PerJobIdent,
    Shared(u16),
}

/// One accepted probe job and its retry state.
#[derive(Debug)]
pub struct Job {
    /// The request as it came in (raw type byte preserved so error
    /// replies echo it back).
    pub request: RequestFrame,
    /// 16 bit ident stamped into probes (ICMP id / UDP source port).
    pub id: u16,
    /// UDP destination port of trace probes.
    pub trace_port: u16,
    /// Responding address, destination until a reply arrives.
    pub addr: Ipv4Addr,
    /// Completion status.
    pub status: ProbeStatus,
    /// Reply flags accumulated so far.
    pub flags: u8,
    /// Typed result in wire representation.
    pub result: u32,
    /// Probes sent so far.
    pub probe_cnt: u32,
    /// When the last probe was sent.
    sent_at: Option<Instant>,
    /// Wall clock stamp of the last probe (for trace round trips).
    pub sent_stamp: EchoStamp,
    /// Fixed interval between attempts.
    retry_ival: Duration,
    /// Inside the concurrency window.
    in_serve: bool,
    /// Finished, waiting to be written out.
    done: bool,
}

impl Job {
    fn attempts(&self) -> u32 {
        u32::from(self.request.retries) + 1
    }

    fn finish(&mut self, status: ProbeStatus, result: u32) {
        self.status = status;
        self.result = result;
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn kind(&self) -> Option<ProbeKind> {
        self.request.probe_kind()
    }

    fn reply_frame(&self) -> ReplyFrame {
        ReplyFrame {
            version: PROTO_VERSION,
            kind: self.request.kind,
            status: self.status as u8,
            flags: self.flags,
            tid: self.request.tid,
            addr: self.addr,
            result: self.result,
        }
    }
}

/// The job list of the probe daemon: admission control, the per job
/// retry state machine and reply matching.
pub struct JobTable {
    jobs: Vec<Job>,
    window_counter: usize,
    next_ident: u16,
    ports: TracePortPool,
    trace_source: TraceSourcePort,
}

impl JobTable {
    /// `ident_seed` spreads the 16 bit probe idents across daemon
    /// instances (the daemon seeds it from its pid).
    pub fn new(ident_seed: u16, trace_source: TraceSourcePort) -> JobTable {
        JobTable {
            jobs: Vec::new(),
            window_counter: 0,
            next_ident: if ident_seed == 0 { 1 } else { ident_seed },
            ports: TracePortPool::new(),
            trace_source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job_mut(&mut self, index: usize) -> &mut Job {
        &mut self.jobs[index]
    }

    /// Accepts a request frame. Sanity failures (version, type,
    /// size) finish the job immediately with `generror`; it still
    /// occupies a slot until the reply is drained.
    pub fn accept(&mut self, frame: RequestFrame) {
        let id = self.next_ident;
        self.next_ident = self.next_ident.wrapping_add(1);
        let retry_ival = Duration::from_millis(
            1000 * u64::from(frame.timeout_s) / (u64::from(frame.retries) + 1),
        );

        let mut job = Job {
            id,
            trace_port: 0,
            addr: frame.destination,
            status: ProbeStatus::NoError,
            flags: 0,
            result: 0,
            probe_cnt: 0,
            sent_at: None,
            sent_stamp: EchoStamp::default(),
            retry_ival,
            in_serve: frame.window == 0,
            done: false,
            request: frame,
        };
        if job.in_serve {
            self.window_counter += 1;
        }

        if job.request.version != PROTO_VERSION || job.request.probe_kind().is_none() {
            tracing::warn!(
                tid = job.request.tid,
                version = job.request.version,
                kind = job.request.kind,
                "bad version or type"
            );
            job.finish(ProbeStatus::GenError, 0);
        } else if job.request.size < MIN_PROBE_SIZE || job.request.size > MAX_PROBE_SIZE {
            tracing::warn!(tid = job.request.tid, size = job.request.size, "bad size");
            job.finish(ProbeStatus::GenError, 0);
        } else if job.request.probe_kind() == Some(ProbeKind::Trace) {
            let jobs = &self.jobs;
            match self.ports.allocate(|port| {
                jobs.iter().any(|j| {
                    !j.done && j.request.probe_kind() == Some(ProbeKind::Trace) && j.trace_port == port
                })
            }) {
                Some(port) => job.trace_port = port,
                None => {
                    tracing::warn!(tid = job.request.tid, "trace port range exhausted");
                    job.finish(ProbeStatus::GenError, 0);
                }
            }
        }

        tracing::debug!(
            tid = job.request.tid,
            id = job.id,
            kind = job.request.kind,
            dst = %job.request.destination,
            "job accepted"
        );
        self.jobs.push(job);
    }

    /// Lets waiting jobs into the concurrency window as long as both
    /// their own window and the daemon cap admit them.
    pub fn admit(&mut self) {
        for job in &mut self.jobs {
            if !job.in_serve
                && !job.done
                && usize::from(job.request.window) > self.window_counter
                && self.window_counter < MAX_INFLIGHT
            {
                job.in_serve = true;
                self.window_counter += 1;
            }
        }
    }

    /// Finishes every in-service job whose retry budget ran out.
    pub fn expire(&mut self, now: Instant) {
        for job in &mut self.jobs {
            if job.in_serve
                && !job.done
                && job.probe_cnt >= job.attempts()
                && job
                    .sent_at
                    .map_or(true, |sent| now.duration_since(sent) >= job.retry_ival)
            {
                tracing::debug!(tid = job.request.tid, tries = job.probe_cnt, "timed out");
                job.finish(ProbeStatus::Timeout, 0);
            }
        }
    }

    /// Picks the next job that needs a probe on the wire: in
    /// service, attempts left, and its per attempt interval expired
    /// (or never sent).
    pub fn pick_due(&self, now: Instant) -> Option<usize> {
        self.jobs.iter().position(|job| {
            job.in_serve
                && !job.done
                && job.probe_cnt < job.attempts()
                && job
                    .sent_at
                    .map_or(true, |sent| now.duration_since(sent) >= job.retry_ival)
        })
    }

    /// Records a sent probe.
    pub fn mark_sent(&mut self, index: usize, now: Instant, stamp: EchoStamp) {
        let job = &mut self.jobs[index];
        job.probe_cnt += 1;
        job.sent_at = Some(now);
        job.sent_stamp = stamp;
    }

    /// Records a failed send.
    pub fn mark_send_error(&mut self, index: usize) {
        self.jobs[index].finish(ProbeStatus::GenError, 0);
    }

    /// Time until the earliest retry deadline of an in-service job,
    /// zero if one is already due, `None` when nothing is in
    /// service (the select loop may then block on its inputs alone).
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.jobs
            .iter()
            .filter(|job| job.in_serve && !job.done)
            .map(|job| match job.sent_at {
                None => Duration::ZERO,
                Some(sent) => job
                    .retry_ival
                    .saturating_sub(now.duration_since(sent)),
            })
            .min()
    }

    /// Matches a received ICMP message against the job list.
    /// `received` is the wall clock stamp taken right after the
    /// `recvfrom`. Returns true when a job was completed.
    pub fn match_reply(&mut self, msg: &ReplyMessage, from: Ipv4Addr, received: EchoStamp) -> bool {
        match msg {
            ReplyMessage::EchoReply { id, stamp, .. } => {
                self.match_icmp(ProbeKind::Echo, *id, from, |_| stamp.elapsed_micros(received))
            }
            ReplyMessage::MaskReply { id, mask } => {
                self.match_icmp(ProbeKind::Mask, *id, from, |_| *mask)
            }
            ReplyMessage::TimestampReply {
                id,
                originate,
                receive,
            } => self.match_icmp(ProbeKind::Timestamp, *id, from, |_| {
                receive.wrapping_sub(*originate)
            }),
            ReplyMessage::TimeExceeded(embedded) => self.match_trace(
                embedded.source_port,
                embedded.destination_port,
                from,
                received,
                false,
            ),
            ReplyMessage::DestUnreachable(embedded) => self.match_trace(
                embedded.source_port,
                embedded.destination_port,
                from,
                received,
                true,
            ),
        }
    }

    fn match_icmp<F: Fn(&Job) -> u32>(
        &mut self,
        kind: ProbeKind,
        id: u16,
        from: Ipv4Addr,
        result: F,
    ) -> bool {
        let Some(job) = self
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.request.probe_kind() == Some(kind))
        else {
            tracing::debug!(id, "no job for reply id, discarded");
            return false;
        };
        if job.done {
            tracing::debug!(tid = job.request.tid, "already done, discarded");
            return false;
        }
        if from != job.request.destination {
            tracing::debug!(tid = job.request.tid, %from, "unexpected responder, discarded");
            return false;
        }
        let value = result(job);
        job.addr = from;
        job.finish(ProbeStatus::NoError, value);
        true
    }

    /// Trace replies are matched on the embedded `(sport, dport)`
    /// pair. Some legacy responders echo the embedded header with
    /// host instead of network byte order, so the byte swapped
    /// sport, the byte swapped dport and the fully swapped pair are
    /// accepted as the same identity.
    fn match_trace(
        &mut self,
        sport: u16,
        dport: u16,
        from: Ipv4Addr,
        received: EchoStamp,
        final_hop: bool,
    ) -> bool {
        let shared = match self.trace_source {
            TraceSourcePort::PerJobIdent => None,
            TraceSourcePort::Shared(port) => Some(port),
        };
        let Some(job) = self.jobs.iter_mut().find(|job| {
            if job.done || job.request.probe_kind() != Some(ProbeKind::Trace) {
                return false;
            }
            let src = shared.unwrap_or(job.id);
            let port = job.trace_port;
            (port == dport && src == sport)
                || (port == swap16(dport) && src == swap16(sport))
                || (port == dport && src == swap16(sport))
                || (port == swap16(dport) && src == sport)
        }) else {
            tracing::debug!(sport, dport, "no trace job for ports, discarded");
            return false;
        };
        let rtt = job.sent_stamp.elapsed_micros(received);
        job.addr = from;
        if final_hop {
            job.flags |= FLAG_LASTHOP;
        }
        job.finish(ProbeStatus::NoError, rtt);
        true
    }

    /// Removes every finished job and returns its reply frame,
    /// releasing the window slots.
    pub fn drain_done(&mut self) -> Vec<ReplyFrame> {
        let mut frames = Vec::new();
        self.jobs.retain(|job| {
            if job.done {
                frames.push(job.reply_frame());
                false
            } else {
                true
            }
        });
        // release the window slots of the drained jobs
        let in_serve = self.jobs.iter().filter(|job| job.in_serve).count();
        self.window_counter = in_serve;
        frames
    }
}
