use crate::dns::name::{encode_name, expand_name, NameError};
use crate::dns::record::{AnswerSet, RecordType, ResponseError};

/// The Internet class.
pub const CLASS_IN: u16 = 1;

/// Length of the fixed DNS message header.
pub const HEADER_LEN: usize = 12;

/// Builds a standard recursive query for `name` with the given type.
pub fn build_query(id: u16, name: &str, query_type: RecordType) -> Result<Vec<u8>, NameError> {
    let mut out = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&0x0100u16.to_be_bytes()); // recursion desired
    out.extend_from_slice(&1u16.to_be_bytes()); // one question
    out.extend_from_slice(&[0u8; 6]); // no other sections
    encode_name(name, &mut out)?;
    out.extend_from_slice(&(query_type as u16).to_be_bytes());
    out.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(out)
}

/// The message id of a response, if long enough to carry one.
pub fn response_id(message: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([
        *message.first()?,
        *message.get(1)?,
    ]))
}

/// Walks a response and collects records relevant to the query.
///
/// The walk visits as many records as the answer count promises; a
/// zero answer count falls back to the authority count and then to
/// the additional count, so authoritative data is still picked up
/// when no direct answer exists. Record selection is first type
/// seen wins, except that an A record whose owner name equals the
/// queried name always wins.
pub fn parse_response(
    message: &[u8],
    query_name: &str,
    query_type: RecordType,
) -> Result<AnswerSet, ResponseError> {
    if message.len() < HEADER_LEN {
        return Err(ResponseError::Truncated);
    }
    let rcode = message[3] & 0x0f;
    if rcode != 0 {
        return Err(ResponseError::Rcode(rcode));
    }

    let qdcount = u16::from_be_bytes([message[4], message[5]]);
    let ancount = u16::from_be_bytes([message[6], message[7]]);
    let nscount = u16::from_be_bytes([message[8], message[9]]);
    let arcount = u16::from_be_bytes([message[10], message[11]]);

    if ancount == 0 {
        // these types never fall through to the authority section
        if matches!(
            query_type,
            RecordType::Cname | RecordType::Hinfo | RecordType::Txt
        ) {
            return Err(ResponseError::NoRecord(query_type));
        }
    }
    let mut count = ancount;
    if count == 0 {
        count = nscount;
    }
    if count == 0 {
        count = arcount;
    }

    let query_name = query_name.strip_suffix('.').unwrap_or(query_name);
    let mut set = AnswerSet::new();
    let mut pos = HEADER_LEN;

    for _ in 0..qdcount {
        let (_, used) = expand_name(message, pos).ok_or(ResponseError::Truncated)?;
        pos += used + 4; // qtype + qclass
    }

    for _ in 0..count {
        let (owner, used) =
            expand_name(message, pos).ok_or(ResponseError::NameExpansion(query_type))?;
        pos += used;
        if message.len() < pos + 10 {
            return Err(ResponseError::Truncated);
        }
        let rtype = u16::from_be_bytes([message[pos], message[pos + 1]]);
        // class and ttl are skipped
        let rdlen = usize::from(u16::from_be_bytes([message[pos + 8], message[pos + 9]]));
        pos += 10;
        if message.len() < pos + rdlen {
            return Err(ResponseError::Truncated);
        }
        let rdata_start = pos;
        let rdata = &message[pos..pos + rdlen];
        pos += rdlen;

        match RecordType::from_u16(rtype) {
            Some(RecordType::A) => {
                if rdlen < 4 {
                    return Err(ResponseError::Truncated);
                }
                set.push_addr(
                    std::net::Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]),
                    owner == query_name,
                );
            }
            Some(RecordType::Ns) => {
                let (name, _) = expand_name(message, rdata_start)
                    .ok_or(ResponseError::NameExpansion(RecordType::Ns))?;
                set.push_string(RecordType::Ns, &name);
            }
            Some(RecordType::Cname) if query_type == RecordType::Cname => {
                let (name, _) = expand_name(message, rdata_start)
                    .ok_or(ResponseError::NameExpansion(RecordType::Cname))?;
                set.push_string(RecordType::Cname, &name);
            }
            Some(RecordType::Ptr) => {
                let (name, _) = expand_name(message, rdata_start)
                    .ok_or(ResponseError::NameExpansion(RecordType::Ptr))?;
                set.push_string(RecordType::Ptr, &name);
            }
            Some(RecordType::Soa) => {
                // only the primary server name is reported
                let (mname, _) = expand_name(message, rdata_start)
                    .ok_or(ResponseError::NameExpansion(RecordType::Soa))?;
                set.push_string(RecordType::Soa, &mname);
            }
            Some(RecordType::Mx) => {
                if rdlen < 3 {
                    return Err(ResponseError::Truncated);
                }
                let preference = u16::from_be_bytes([rdata[0], rdata[1]]);
                let (exchange, _) = expand_name(message, rdata_start + 2)
                    .ok_or(ResponseError::NameExpansion(RecordType::Mx))?;
                set.push_string(RecordType::Mx, &format!("{} {}", exchange, preference));
            }
            Some(RecordType::Txt) => {
                let text = char_string(rdata, 0).ok_or(ResponseError::Truncated)?;
                set.push_string(RecordType::Txt, &text);
            }
            Some(RecordType::Hinfo) => {
                // two consecutive character strings (cpu, os); the
                // second offset comes from the wire length byte
                let cpu_len = usize::from(*rdata.first().ok_or(ResponseError::Truncated)?);
                let cpu = char_string(rdata, 0).ok_or(ResponseError::Truncated)?;
                let os = char_string(rdata, 1 + cpu_len).ok_or(ResponseError::Truncated)?;
                set.push_string(RecordType::Hinfo, &cpu);
                set.push_string(RecordType::Hinfo, &os);
            }
            Some(RecordType::Cname) | None => {
                // record of no interest for this query
            }
        }
    }

    Ok(set)
}

/// Reads a length prefixed character string from `data` at `offset`.
fn char_string(data: &[u8], offset: usize) -> Option<String> {
    let len = usize::from(*data.get(offset)?);
    let bytes = data.get(offset + 1..offset + 1 + len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    /// Builds a response with uncompressed names: header, the echoed
    /// question, then the given records into the chosen sections.
    fn response(
        query_name: &str,
        query_type: RecordType,
        rcode: u8,
        answers: &[Vec<u8>],
        authority: &[Vec<u8>],
    ) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(&0x1234u16.to_be_bytes());
        message.extend_from_slice(&[0x81, 0x80 | rcode]); // response, RA
        message.extend_from_slice(&1u16.to_be_bytes());
        message.extend_from_slice(&(answers.len() as u16).to_be_bytes());
        message.extend_from_slice(&(authority.len() as u16).to_be_bytes());
        message.extend_from_slice(&0u16.to_be_bytes());
        encode_name(query_name, &mut message).unwrap();
        message.extend_from_slice(&(query_type as u16).to_be_bytes());
        message.extend_from_slice(&CLASS_IN.to_be_bytes());
        for record in answers.iter().chain(authority) {
            message.extend_from_slice(record);
        }
        message
    }

    fn record(owner: &str, rtype: u16, rdata: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        encode_name(owner, &mut bytes).unwrap();
        bytes.extend_from_slice(&rtype.to_be_bytes());
        bytes.extend_from_slice(&CLASS_IN.to_be_bytes());
        bytes.extend_from_slice(&300u32.to_be_bytes());
        bytes.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        bytes.extend_from_slice(rdata);
        bytes
    }

    fn name_rdata(name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        encode_name(name, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn query_layout() {
        let query = build_query(0x0102, "www.example.org", RecordType::A).unwrap();
        assert_eq!(&query[..2], &[1, 2]);
        assert_eq!(&query[2..4], &[1, 0]); // recursion desired
        assert_eq!(&query[4..6], &[0, 1]); // one question
        assert_eq!(&query[query.len() - 4..], &[0, 1, 0, 1]); // A, IN
    }

    #[test]
    fn parse_a_records() {
        let message = response(
            "www.example.net",
            RecordType::A,
            0,
            &[
                record("www.example.net", 1, &[203, 0, 113, 7]),
                record("www.example.net", 1, &[203, 0, 113, 8]),
            ],
            &[],
        );
        let set = parse_response(&message, "www.example.net", RecordType::A).unwrap();
        assert_eq!(Some(RecordType::A), set.record_type());
        assert_eq!(
            &[Ipv4Addr::new(203, 0, 113, 7), Ipv4Addr::new(203, 0, 113, 8)],
            set.addrs()
        );
    }

    #[test]
    fn authority_fallback_when_no_answer() {
        // zero answers for an A query: the walk visits the authority
        // section instead and collects the NS records found there
        let message = response(
            "example.org",
            RecordType::A,
            0,
            &[],
            &[record("example.org", 2, &name_rdata("ns1.example.org"))],
        );
        let set = parse_response(&message, "example.org", RecordType::A).unwrap();
        assert_eq!(Some(RecordType::Ns), set.record_type());
        assert_eq!(&["ns1.example.org".to_string()], set.strings());
    }

    #[test]
    fn empty_answer_is_final_for_cname_hinfo_txt() {
        for query_type in [RecordType::Cname, RecordType::Hinfo, RecordType::Txt] {
            let message = response("example.org", query_type, 0, &[], &[]);
            assert_eq!(
                Err(ResponseError::NoRecord(query_type)),
                parse_response(&message, "example.org", query_type)
            );
        }
    }

    #[test]
    fn rcode_maps_to_error() {
        let message = response("nope.example.org", RecordType::A, 3, &[], &[]);
        assert_eq!(
            Err(ResponseError::Rcode(3)),
            parse_response(&message, "nope.example.org", RecordType::A)
        );
    }

    #[test]
    fn mx_preference_format() {
        let mut rdata = 10u16.to_be_bytes().to_vec();
        rdata.extend_from_slice(&name_rdata("mail.example.org"));
        let message = response(
            "example.org",
            RecordType::Mx,
            0,
            &[record("example.org", 15, &rdata)],
            &[],
        );
        let set = parse_response(&message, "example.org", RecordType::Mx).unwrap();
        assert_eq!(&["mail.example.org 10".to_string()], set.strings());
    }

    #[test]
    fn hinfo_two_strings() {
        let rdata = [&[3u8][..], &b"vax"[..], &[4u8][..], &b"unix"[..]].concat();
        let message = response(
            "host.example.org",
            RecordType::Hinfo,
            0,
            &[record("host.example.org", 13, &rdata)],
            &[],
        );
        let set = parse_response(&message, "host.example.org", RecordType::Hinfo).unwrap();
        assert_eq!(&["vax".to_string(), "unix".to_string()], set.strings());
    }

    #[test]
    fn txt_character_string() {
        let rdata = [&[11u8][..], &b"hello world"[..]].concat();
        let message = response(
            "example.org",
            RecordType::Txt,
            0,
            &[record("example.org", 16, &rdata)],
            &[],
        );
        let set = parse_response(&message, "example.org", RecordType::Txt).unwrap();
        assert_eq!(&["hello world".to_string()], set.strings());
    }

    #[test]
    fn ptr_record() {
        let message = response(
            "1.2.0.192.in-addr.arpa",
            RecordType::Ptr,
            0,
            &[record(
                "1.2.0.192.in-addr.arpa",
                12,
                &name_rdata("www.example.org"),
            )],
            &[],
        );
        let set = parse_response(&message, "1.2.0.192.in-addr.arpa", RecordType::Ptr).unwrap();
        assert_eq!(&["www.example.org".to_string()], set.strings());
    }

    #[test]
    fn soa_reports_primary() {
        let mut rdata = name_rdata("ns1.example.org");
        rdata.extend_from_slice(&name_rdata("hostmaster.example.org"));
        rdata.extend_from_slice(&[0u8; 20]); // serial..minimum
        let message = response(
            "example.org",
            RecordType::Soa,
            0,
            &[record("example.org", 6, &rdata)],
            &[],
        );
        let set = parse_response(&message, "example.org", RecordType::Soa).unwrap();
        assert_eq!(&["ns1.example.org".to_string()], set.strings());
    }

    #[test]
    fn cname_records_need_cname_query() {
        let message = response(
            "alias.example.org",
            RecordType::A,
            0,
            &[record(
                "alias.example.org",
                5,
                &name_rdata("real.example.org"),
            )],
            &[],
        );
        // a CNAME in an A answer is skipped, leaving an empty set
        let set = parse_response(&message, "alias.example.org", RecordType::A).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn truncated_response() {
        let message = response(
            "example.org",
            RecordType::A,
            0,
            &[record("example.org", 1, &[203, 0, 113, 7])],
            &[],
        );
        assert_eq!(
            Err(ResponseError::Truncated),
            parse_response(&message[..message.len() - 2], "example.org", RecordType::A)
        );
        assert_eq!(
            Err(ResponseError::Truncated),
            parse_response(&[0u8; 4], "example.org", RecordType::A)
        );
    }

    #[test]
    fn response_id_reads_header() {
        assert_eq!(Some(0x1234), response_id(&[0x12, 0x34, 0, 0]));
        assert_eq!(None, response_id(&[0x12]));
    }
}
