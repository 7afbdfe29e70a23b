use arrayvec::ArrayVec;
use std::net::Ipv4Addr;

/// Maximum number of records collected from one response.
pub const MAX_ANSWERS: usize = 30;

/// Maximum length of an answer string in bytes; longer strings are
/// silently truncated.
pub const MAX_STRING_LEN: usize = 255;

/// The resource record types the resolver understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordType {
    A = 1,
    Ns = 2,
    Cname = 5,
    Soa = 6,
    Ptr = 12,
    Hinfo = 13,
    Mx = 15,
    Txt = 16,
}

impl RecordType {
    /// Decodes the wire value, `None` for types the resolver skips.
    pub fn from_u16(value: u16) -> Option<RecordType> {
        use RecordType::*;
        match value {
            1 => Some(A),
            2 => Some(Ns),
            5 => Some(Cname),
            6 => Some(Soa),
            12 => Some(Ptr),
            13 => Some(Hinfo),
            15 => Some(Mx),
            16 => Some(Txt),
            _ => None,
        }
    }

    /// The record name as it appears in error messages ("no CNAME
    /// record").
    pub fn label(&self) -> &'static str {
        use RecordType::*;
        match self {
            A => "A",
            Ns => "NS",
            Cname => "CNAME",
            Soa => "SOA",
            Ptr => "PTR",
            Hinfo => "HINFO",
            Mx => "MX",
            Txt => "TXT",
        }
    }

    /// True for the query types the search list walk applies to.
    /// Reverse and single shot lookups are queried once as entered.
    pub fn searches_domains(&self) -> bool {
        use RecordType::*;
        matches!(self, A | Ns | Mx)
    }
}

impl core::fmt::Display for RecordType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Typed record data collected while walking a response.
///
/// Address records collect into `addrs`, everything else into
/// `strings` (MX as "exchange preference", SOA as the primary server
/// name, HINFO as two consecutive strings). The first accepted type
/// wins; records of other types are skipped, with the exception of
/// the owner name match for A records (see `push_addr`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnswerSet {
    record_type: Option<RecordType>,
    addrs: ArrayVec<Ipv4Addr, MAX_ANSWERS>,
    strings: ArrayVec<String, MAX_ANSWERS>,
}

impl AnswerSet {
    pub fn new() -> AnswerSet {
        AnswerSet::default()
    }

    /// The type of the collected records, `None` while empty.
    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty() && self.strings.is_empty()
    }

    pub fn addrs(&self) -> &[Ipv4Addr] {
        &self.addrs
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Accepts an address record. `owner_matches` forces acceptance
    /// when the record's owner name equals the queried name even if
    /// records of another type were seen first.
    pub fn push_addr(&mut self, addr: Ipv4Addr, owner_matches: bool) {
        if owner_matches || self.accept(RecordType::A) {
            self.record_type = Some(RecordType::A);
            let _ = self.addrs.try_push(addr);
        }
    }

    /// Accepts a string valued record of the given type, truncating
    /// to [`MAX_STRING_LEN`] bytes.
    pub fn push_string(&mut self, record_type: RecordType, value: &str) {
        if self.accept(record_type) {
            self.record_type = Some(record_type);
            let mut value = value.to_string();
            if value.len() > MAX_STRING_LEN {
                let mut cut = MAX_STRING_LEN;
                while !value.is_char_boundary(cut) {
                    cut -= 1;
                }
                value.truncate(cut);
            }
            let _ = self.strings.try_push(value);
        }
    }

    fn accept(&self, record_type: RecordType) -> bool {
        self.record_type.is_none() || self.record_type == Some(record_type)
    }
}

/// Error produced while interpreting a DNS response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResponseError {
    /// The response carried a non zero RCODE.
    Rcode(u8),
    /// The answer section was empty for a type that does not fall
    /// through to the authority records.
    NoRecord(RecordType),
    /// Expansion of a compressed name failed.
    NameExpansion(RecordType),
    /// The response was shorter than its own counts promise.
    Truncated,
    /// No usable records were found.
    NoAnswer,
}

impl core::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use ResponseError::*;
        match self {
            Rcode(1) => write!(f, "format error"),
            Rcode(2) => write!(f, "server failure"),
            Rcode(3) => write!(f, "non existent domain"),
            Rcode(4) => write!(f, "not implemented"),
            Rcode(5) => write!(f, "query refused"),
            Rcode(code) => write!(f, "unknown error {}", code),
            NoRecord(record_type) => write!(f, "no {} record", record_type.label()),
            NameExpansion(record_type) => {
                write!(f, "name expansion of {} record failed", record_type.label())
            }
            Truncated => write!(f, "truncated DNS response"),
            NoAnswer => write!(f, "no answer"),
        }
    }
}

impl std::error::Error for ResponseError {}
