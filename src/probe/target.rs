use crate::wire::{ProbeKind, ProbeStatus, ReplyFrame, FLAG_LASTHOP};
use std::net::Ipv4Addr;

/// The typed result of a probe, discriminated by the request type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ProbeValue {
    /// No reply (timeout or error).
    #[default]
    None,
    /// Round trip time in microseconds (echo and trace probes).
    Rtt(u32),
    /// Address mask (mask probes).
    Mask(u32),
    /// Clock offset in milliseconds, may be negative (timestamp
    /// probes).
    ClockDiff(i32),
}

/// One row of a probe batch: the destination under test and the
/// reply data filled in by the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    /// Transaction id, unique within the transport instance.
    pub tid: u32,
    /// The address probed.
    pub dst: Ipv4Addr,
    /// The address that answered. Differs from `dst` on intermediate
    /// trace hops; unspecified until a reply arrived.
    pub res: Ipv4Addr,
    /// Typed probe result.
    pub value: ProbeValue,
    /// Completion status.
    pub status: ProbeStatus,
    /// Final hop indication of a trace probe.
    pub lasthop: bool,
}

impl Target {
    pub fn new(dst: Ipv4Addr) -> Target {
        Target {
            tid: 0,
            dst,
            res: Ipv4Addr::UNSPECIFIED,
            value: ProbeValue::None,
            status: ProbeStatus::NoError,
            lasthop: false,
        }
    }

    /// Copies a reply into this row. `report_lasthop` is the request
    /// level flag; the stored indication is the AND of request and
    /// reply flags.
    pub fn absorb(&mut self, frame: &ReplyFrame, kind: ProbeKind, report_lasthop: bool) {
        self.res = frame.addr;
        self.status = frame.probe_status().unwrap_or(ProbeStatus::GenError);
        self.lasthop = report_lasthop && (frame.flags & FLAG_LASTHOP) != 0;
        self.value = if self.status == ProbeStatus::NoError {
            match kind {
                ProbeKind::Echo | ProbeKind::Trace => ProbeValue::Rtt(frame.result),
                ProbeKind::Mask => ProbeValue::Mask(frame.result),
                ProbeKind::Timestamp => ProbeValue::ClockDiff(frame.result as i32),
            }
        } else {
            ProbeValue::None
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::PROTO_VERSION;

    fn reply(kind: ProbeKind, status: ProbeStatus, flags: u8, result: u32) -> ReplyFrame {
        ReplyFrame {
            version: PROTO_VERSION,
            kind: kind as u8,
            status: status as u8,
            flags,
            tid: 1,
            addr: Ipv4Addr::new(10, 0, 0, 5),
            result,
        }
    }

    #[test]
    fn echo_reply_is_rtt() {
        let mut target = Target::new(Ipv4Addr::new(127, 0, 0, 1));
        target.absorb(
            &reply(ProbeKind::Echo, ProbeStatus::NoError, 0, 1500),
            ProbeKind::Echo,
            false,
        );
        assert_eq!(ProbeValue::Rtt(1500), target.value);
        assert_eq!(Ipv4Addr::new(10, 0, 0, 5), target.res);
    }

    #[test]
    fn timestamp_reply_is_signed() {
        let mut target = Target::new(Ipv4Addr::new(127, 0, 0, 1));
        target.absorb(
            &reply(
                ProbeKind::Timestamp,
                ProbeStatus::NoError,
                0,
                (-250i32) as u32,
            ),
            ProbeKind::Timestamp,
            false,
        );
        assert_eq!(ProbeValue::ClockDiff(-250), target.value);
    }

    #[test]
    fn lasthop_is_and_of_request_and_reply() {
        let mut target = Target::new(Ipv4Addr::new(198, 51, 100, 1));
        target.absorb(
            &reply(ProbeKind::Trace, ProbeStatus::NoError, FLAG_LASTHOP, 900),
            ProbeKind::Trace,
            false,
        );
        assert!(!target.lasthop);
        target.absorb(
            &reply(ProbeKind::Trace, ProbeStatus::NoError, FLAG_LASTHOP, 900),
            ProbeKind::Trace,
            true,
        );
        assert!(target.lasthop);
    }

    #[test]
    fn timeout_reply_has_no_value() {
        let mut target = Target::new(Ipv4Addr::new(192, 0, 2, 1));
        target.absorb(
            &reply(ProbeKind::Echo, ProbeStatus::Timeout, 0, 0),
            ProbeKind::Echo,
            false,
        );
        assert_eq!(ProbeValue::None, target.value);
        assert_eq!(ProbeStatus::Timeout, target.status);
    }
}
