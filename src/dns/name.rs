/// Maximum length of an encoded DNS name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a single DNS label in bytes.
pub const MAX_LABEL_LEN: usize = 63;

/// Error while encoding a DNS name into its wire representation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NameError {
    /// The name is empty or consists only of dots.
    Empty,
    /// A label exceeds 63 bytes.
    LabelTooLong,
    /// The encoded name exceeds 255 bytes.
    NameTooLong,
}

impl core::fmt::Display for NameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use NameError::*;
        match self {
            Empty => write!(f, "empty DNS name"),
            LabelTooLong => write!(f, "DNS label longer than {} bytes", MAX_LABEL_LEN),
            NameTooLong => write!(f, "DNS name longer than {} bytes", MAX_NAME_LEN),
        }
    }
}

impl std::error::Error for NameError {}

/// Appends the wire encoding of `name` (length prefixed labels,
/// terminated by a zero byte) to `out`.
pub fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), NameError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    let start = out.len();
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(NameError::Empty);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(NameError::LabelTooLong);
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    if out.len() - start > MAX_NAME_LEN {
        out.truncate(start);
        return Err(NameError::NameTooLong);
    }
    Ok(())
}

/// Expands a possibly compressed name starting at `offset` inside
/// `message`. Returns the dotted name and the number of bytes the
/// name occupies at `offset` (a compression pointer counts as two).
///
/// Returns `None` when the name runs past the end of the message or
/// compression pointers loop.
pub fn expand_name(message: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut pos = offset;
    let mut consumed = None;
    let mut jumps = 0;

    loop {
        let len = *message.get(pos)?;
        match len {
            0 => {
                let used = consumed.unwrap_or(pos + 1 - offset);
                return Some((name, used));
            }
            l if l & 0xc0 == 0xc0 => {
                let low = *message.get(pos + 1)?;
                if consumed.is_none() {
                    consumed = Some(pos + 2 - offset);
                }
                // a pointer chain longer than the message is a loop
                jumps += 1;
                if jumps > message.len() {
                    return None;
                }
                pos = (usize::from(l & 0x3f) << 8) | usize::from(low);
            }
            l if l & 0xc0 != 0 => return None,
            l => {
                let label = message.get(pos + 1..pos + 1 + usize::from(l))?;
                if !name.is_empty() {
                    name.push('.');
                }
                name.push_str(&String::from_utf8_lossy(label));
                pos += 1 + usize::from(l);
            }
        }
    }
}

/// Validates a DNS host name along the RFC 952/1123 rules the
/// toolkit applies: first character alphanumeric, remaining
/// characters in `[-.A-Za-z0-9]`, no trailing dash, and not a
/// dotted quad in disguise (all numeric with three dots).
pub fn is_valid_host_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => (),
        _ => return false,
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return false;
    }
    if name.ends_with('-') {
        return false;
    }
    let all_numeric = name.chars().all(|c| c.is_ascii_digit() || c == '.');
    let dots = name.chars().filter(|c| *c == '.').count();
    !(all_numeric && dots == 3)
}

/// Parses a dotted quad: exactly three dots, every octet in 0..=255.
pub fn parse_quad(text: &str) -> Option<std::net::Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in text.split('.') {
        if count == 4 || part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u32 = part.parse().ok()?;
        if value > 255 {
            return None;
        }
        octets[count] = value as u8;
        count += 1;
    }
    if count != 4 {
        return None;
    }
    Some(std::net::Ipv4Addr::from(octets))
}

/// Builds the `d.c.b.a.in-addr.arpa` reverse lookup name.
pub fn reverse_name(addr: std::net::Ipv4Addr) -> String {
    let o = addr.octets();
    format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
}
