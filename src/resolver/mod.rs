//! DNS resolver facade: queries over UDP port 53 with retries and a
//! domain search list, typed lookups per record type and process
//! wide name caches.

use crate::dns::name::{is_valid_host_name, parse_quad, reverse_name};
use crate::dns::{build_query, parse_response, response_id, AnswerSet, RecordType, ResponseError};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Maximum number of configured name servers.
pub const MAX_NAME_SERVERS: usize = 3;

/// The DNS port.
pub const NAMESERVER_PORT: u16 = 53;

/// Per resolver defaults: query timeout, retry count, name servers
/// and the domain search list.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Time to wait for one response before moving on.
    pub timeout: Duration,
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Name servers, at most [`MAX_NAME_SERVERS`].
    pub servers: Vec<SocketAddrV4>,
    /// Domain suffixes appended to relative names.
    pub search: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> ResolverConfig {
        ResolverConfig {
            timeout: Duration::from_secs(2),
            retries: 2,
            servers: vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, NAMESERVER_PORT)],
            search: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Reads servers and search list from the system resolver
    /// configuration. A missing or empty file leaves the loopback
    /// fallback in place.
    pub fn from_system() -> ResolverConfig {
        let mut config = ResolverConfig::default();
        if let Ok(text) = std::fs::read_to_string("/etc/resolv.conf") {
            let (servers, search) = parse_resolv_conf(&text);
            if !servers.is_empty() {
                config.servers = servers;
            }
            config.search = search;
        }
        config
    }
}

/// Parses `nameserver`, `search` and `domain` lines. Unknown lines
/// and parse failures are skipped.
fn parse_resolv_conf(text: &str) -> (Vec<SocketAddrV4>, Vec<String>) {
    let mut servers = Vec::new();
    let mut search = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let mut words = line.split_whitespace();
        match words.next() {
            Some("nameserver") => {
                if let Some(addr) = words.next().and_then(parse_quad) {
                    if servers.len() < MAX_NAME_SERVERS {
                        servers.push(SocketAddrV4::new(addr, NAMESERVER_PORT));
                    }
                }
            }
            Some("search") => {
                search = words.map(str::to_string).collect();
            }
            Some("domain") => {
                search = words.next().map(str::to_string).into_iter().collect();
            }
            _ => {}
        }
    }
    (servers, search)
}

/// Call scoped overrides of the resolver defaults. Fields left at
/// `None` fall back to the stored configuration.
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub servers: Option<Vec<SocketAddrV4>>,
}

/// One query/response exchange with a name server. The resolver owns
/// exactly one transport; tests substitute a scripted one.
pub trait QueryTransport {
    fn exchange(
        &mut self,
        query: &[u8],
        server: SocketAddrV4,
        timeout: Duration,
    ) -> io::Result<Vec<u8>>;
}

/// The production transport: one unconnected UDP socket for the
/// lifetime of the resolver.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn new() -> io::Result<UdpTransport> {
        Ok(UdpTransport {
            socket: UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
        })
    }
}

impl QueryTransport for UdpTransport {
    fn exchange(
        &mut self,
        query: &[u8],
        server: SocketAddrV4,
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.send_to(query, server)?;
        let mut buf = [0u8; 4096];
        let (len, _) = self.socket.recv_from(&mut buf)?;
        Ok(buf[..len].to_vec())
    }
}

/// Process wide memoization of successful lookups. Appended only,
/// no expiry; guarded for multi threaded hosts.
#[derive(Debug, Default)]
pub struct NameCache {
    forward: Mutex<HashMap<String, Ipv4Addr>>,
    reverse: Mutex<HashMap<Ipv4Addr, String>>,
}

impl NameCache {
    pub fn new() -> NameCache {
        NameCache::default()
    }

    /// The cache shared by every resolver in this process.
    pub fn process() -> Arc<NameCache> {
        static CACHE: OnceLock<Arc<NameCache>> = OnceLock::new();
        CACHE.get_or_init(|| Arc::new(NameCache::new())).clone()
    }

    pub fn lookup_forward(&self, name: &str) -> Option<Ipv4Addr> {
        self.forward.lock().ok()?.get(name).copied()
    }

    pub fn lookup_reverse(&self, addr: Ipv4Addr) -> Option<String> {
        self.reverse.lock().ok()?.get(&addr).cloned()
    }

    pub fn store_forward(&self, name: &str, addr: Ipv4Addr) {
        if let Ok(mut map) = self.forward.lock() {
            map.entry(name.to_string()).or_insert(addr);
        }
    }

    pub fn store_reverse(&self, addr: Ipv4Addr, name: &str) {
        if let Ok(mut map) = self.reverse.lock() {
            map.entry(addr).or_insert_with(|| name.to_string());
        }
    }
}

/// CPU and operating system from a HINFO record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostInfo {
    pub cpu: String,
    pub os: String,
}

/// Errors surfaced by the resolver facade.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid IP address \"{0}\"")]
    InvalidAddress(String),
    #[error("invalid host name \"{0}\"")]
    InvalidHostName(String),
    #[error("cannot reverse lookup \"{0}\"")]
    ReverseLookup(String),
    #[error("number of DNS server addresses exceeds resolver limit")]
    TooManyServers,
    #[error("at least one DNS server address required")]
    NoServers,
    #[error("not enough strings in HINFO record")]
    HinfoTooShort,
    #[error("{0}")]
    Response(#[from] ResponseError),
    #[error("cannot send query \"{name}\": {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// The resolver facade. One instance per interpreter/collaborator,
/// holding its defaults, one transport and the shared name cache.
pub struct Resolver<T: QueryTransport = UdpTransport> {
    config: ResolverConfig,
    transport: T,
    cache: Arc<NameCache>,
}

impl Resolver<UdpTransport> {
    /// Resolver over a fresh UDP socket with the given defaults and
    /// the process wide cache.
    pub fn new(config: ResolverConfig) -> io::Result<Resolver<UdpTransport>> {
        Ok(Resolver {
            config,
            transport: UdpTransport::new()?,
            cache: NameCache::process(),
        })
    }
}

impl<T: QueryTransport> Resolver<T> {
    /// Resolver over a caller supplied transport and cache.
    pub fn with_transport(
        config: ResolverConfig,
        transport: T,
        cache: Arc<NameCache>,
    ) -> Resolver<T> {
        Resolver {
            config,
            transport,
            cache,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ResolverConfig {
        &mut self.config
    }

    /// Looks up the A records of `name`. A dotted quad input is
    /// confirmed by a reverse lookup and echoed back.
    pub fn address(
        &mut self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<Ipv4Addr>, ResolveError> {
        if let Some(addr) = parse_quad(name) {
            self.ptr_lookup(addr, opts)?;
            return Ok(vec![addr]);
        }
        if !is_valid_host_name(name) {
            return Err(ResolveError::InvalidHostName(name.to_string()));
        }
        if let Some(addr) = self.cache.lookup_forward(name) {
            return Ok(vec![addr]);
        }

        let set = self.have_query(name, RecordType::A, opts)?;
        if set.record_type() != Some(RecordType::A) || set.is_empty() {
            return Err(ResponseError::NoAnswer.into());
        }
        self.cache.store_forward(name, set.addrs()[0]);
        Ok(set.addrs().to_vec())
    }

    /// Reverse lookup: returns the PTR names of a dotted quad.
    pub fn name(&mut self, ip: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        let addr = parse_quad(ip).ok_or_else(|| ResolveError::InvalidAddress(ip.to_string()))?;
        if let Some(name) = self.cache.lookup_reverse(addr) {
            return Ok(vec![name]);
        }
        let names = self.ptr_lookup(addr, opts)?;
        self.cache.store_reverse(addr, &names[0]);
        Ok(names)
    }

    /// Looks up the name server records of a domain.
    pub fn ns(&mut self, name: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        self.string_lookup(name, RecordType::Ns, opts)
    }

    /// Looks up the canonical name records of a name.
    pub fn cname(&mut self, name: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        self.string_lookup(name, RecordType::Cname, opts)
    }

    /// Looks up the TXT records of a name.
    pub fn txt(&mut self, name: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        self.string_lookup(name, RecordType::Txt, opts)
    }

    /// Looks up the primary server names from the SOA records of a
    /// domain.
    pub fn soa(&mut self, name: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        self.string_lookup(name, RecordType::Soa, opts)
    }

    /// Looks up the mail exchanger records of a domain; each entry
    /// is "exchange preference".
    pub fn mx(&mut self, name: &str, opts: &QueryOptions) -> Result<Vec<String>, ResolveError> {
        self.string_lookup(name, RecordType::Mx, opts)
    }

    /// Looks up the host information record of a name.
    pub fn hinfo(&mut self, name: &str, opts: &QueryOptions) -> Result<HostInfo, ResolveError> {
        let strings = self.string_lookup(name, RecordType::Hinfo, opts)?;
        if strings.len() < 2 {
            return Err(ResolveError::HinfoTooShort);
        }
        Ok(HostInfo {
            cpu: strings[0].clone(),
            os: strings[1].clone(),
        })
    }

    /// Common path of the string valued lookups: a dotted quad input
    /// is first replaced by its canonical name, then the record type
    /// is queried.
    fn string_lookup(
        &mut self,
        name: &str,
        query_type: RecordType,
        opts: &QueryOptions,
    ) -> Result<Vec<String>, ResolveError> {
        let owned;
        let name = if let Some(addr) = parse_quad(name) {
            let mut names = self
                .ptr_lookup(addr, opts)
                .map_err(|_| ResolveError::ReverseLookup(name.to_string()))?;
            owned = names.remove(0);
            owned.as_str()
        } else {
            name
        };
        if !is_valid_host_name(name) {
            return Err(ResolveError::InvalidHostName(name.to_string()));
        }
        let set = self.have_query(name, query_type, opts)?;
        if set.record_type() != Some(query_type) || set.is_empty() {
            return Err(ResponseError::NoAnswer.into());
        }
        Ok(set.strings().to_vec())
    }

    fn ptr_lookup(
        &mut self,
        addr: Ipv4Addr,
        opts: &QueryOptions,
    ) -> Result<Vec<String>, ResolveError> {
        let set = self.have_query(&reverse_name(addr), RecordType::Ptr, opts)?;
        if set.record_type() != Some(RecordType::Ptr) || set.is_empty() {
            return Err(ResponseError::NoAnswer.into());
        }
        Ok(set.strings().to_vec())
    }

    /// The search list walk. Names of single shot types and names
    /// with a trailing dot are queried exactly once as entered.
    /// Relative names without a dot go through the search list
    /// before the bare name is tried; names containing dots are
    /// tried bare first. The first pass requires records of the
    /// queried type, the second accepts any answer.
    fn have_query(
        &mut self,
        name: &str,
        query_type: RecordType,
        opts: &QueryOptions,
    ) -> Result<AnswerSet, ResolveError> {
        let candidates = self.candidates(name, query_type);

        let mut last: Option<ResolveError> = None;
        for candidate in &candidates {
            match self.do_query(candidate, query_type, opts) {
                Ok(set) if set.record_type() == Some(query_type) && !set.is_empty() => {
                    return Ok(set);
                }
                Ok(set) => {
                    if !query_type.searches_domains() {
                        return Ok(set);
                    }
                    last = Some(ResponseError::NoAnswer.into());
                }
                Err(error) => {
                    if !query_type.searches_domains() {
                        return Err(error);
                    }
                    last = Some(error);
                }
            }
        }

        // second chance: any answered type counts
        for candidate in &candidates {
            if let Ok(set) = self.do_query(candidate, query_type, opts) {
                if !set.is_empty() {
                    return Ok(set);
                }
            }
        }

        Err(last.unwrap_or_else(|| ResponseError::NoAnswer.into()))
    }

    fn candidates(&self, name: &str, query_type: RecordType) -> Vec<String> {
        if !query_type.searches_domains() || name.ends_with('.') {
            return vec![name.to_string()];
        }
        let suffixed = self
            .config
            .search
            .iter()
            .map(|suffix| format!("{}.{}", name, suffix));
        if name.contains('.') {
            std::iter::once(name.to_string()).chain(suffixed).collect()
        } else {
            suffixed.chain(std::iter::once(name.to_string())).collect()
        }
    }

    /// One query against the configured servers with the retry and
    /// timeout budget.
    fn do_query(
        &mut self,
        name: &str,
        query_type: RecordType,
        opts: &QueryOptions,
    ) -> Result<AnswerSet, ResolveError> {
        let timeout = opts.timeout.unwrap_or(self.config.timeout);
        let retries = opts.retries.unwrap_or(self.config.retries);
        let servers = match &opts.servers {
            Some(servers) => {
                if servers.len() > MAX_NAME_SERVERS {
                    return Err(ResolveError::TooManyServers);
                }
                if servers.is_empty() {
                    return Err(ResolveError::NoServers);
                }
                servers.clone()
            }
            None => self.config.servers.clone(),
        };

        let id = rand::random::<u16>();
        let query = build_query(id, name, query_type)
            .map_err(|_| ResolveError::InvalidHostName(name.to_string()))?;

        let mut last_error: Option<io::Error> = None;
        for attempt in 0..=retries {
            for server in &servers {
                tracing::debug!(name, ?query_type, %server, attempt, "dns query");
                match self.transport.exchange(&query, *server, timeout) {
                    Ok(response) => {
                        if response_id(&response) != Some(id) {
                            tracing::debug!(name, "response id mismatch, dropped");
                            continue;
                        }
                        return parse_response(&response, name, query_type)
                            .map_err(ResolveError::from);
                    }
                    Err(error) => last_error = Some(error),
                }
            }
        }
        Err(ResolveError::Io {
            name: name.to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "query timed out")),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dns::name::encode_name;
    use crate::dns::CLASS_IN;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A scripted name server: maps query names to canned record
    /// sets and logs every received query name in order.
    #[derive(Default)]
    struct MockServer {
        log: Vec<String>,
        a_records: HashMap<String, Vec<Ipv4Addr>>,
        ptr_records: HashMap<String, Vec<String>>,
        rcode: Option<u8>,
    }

    #[derive(Clone, Default)]
    struct MockTransport(Rc<RefCell<MockServer>>);

    fn decode_query(query: &[u8]) -> (u16, String, u16) {
        let id = u16::from_be_bytes([query[0], query[1]]);
        let (name, used) = crate::dns::name::expand_name(query, 12).unwrap();
        let qtype = u16::from_be_bytes([query[12 + used], query[13 + used]]);
        (id, name, qtype)
    }

    impl QueryTransport for MockTransport {
        fn exchange(
            &mut self,
            query: &[u8],
            _server: SocketAddrV4,
            _timeout: Duration,
        ) -> io::Result<Vec<u8>> {
            let (id, name, qtype) = decode_query(query);
            let mut server = self.0.borrow_mut();
            server.log.push(name.clone());

            let mut records: Vec<Vec<u8>> = Vec::new();
            if qtype == RecordType::A as u16 {
                for addr in server.a_records.get(&name).into_iter().flatten() {
                    records.push(record(&name, 1, &addr.octets()));
                }
            }
            if qtype == RecordType::Ptr as u16 {
                for target in server.ptr_records.get(&name).into_iter().flatten() {
                    let mut rdata = Vec::new();
                    encode_name(target, &mut rdata).unwrap();
                    records.push(record(&name, 12, &rdata));
                }
            }

            let mut response = Vec::new();
            response.extend_from_slice(&id.to_be_bytes());
            response.extend_from_slice(&[0x81, 0x80 | server.rcode.unwrap_or(0)]);
            response.extend_from_slice(&1u16.to_be_bytes());
            response.extend_from_slice(&(records.len() as u16).to_be_bytes());
            response.extend_from_slice(&[0u8; 4]);
            encode_name(&name, &mut response).unwrap();
            response.extend_from_slice(&qtype.to_be_bytes());
            response.extend_from_slice(&CLASS_IN.to_be_bytes());
            for r in records {
                response.extend_from_slice(&r);
            }
            Ok(response)
        }
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

    fn resolver_with(
        server: MockServer,
        search: Vec<String>,
    ) -> (Resolver<MockTransport>, Rc<RefCell<MockServer>>) {
        let shared = Rc::new(RefCell::new(server));
        let config = ResolverConfig {
            search,
            ..ResolverConfig::default()
        };
        (
            Resolver::with_transport(
                config,
                MockTransport(shared.clone()),
                Arc::new(NameCache::new()),
            ),
            shared,
        )
    }

    #[test]
    fn search_list_order_and_result() {
        let mut server = MockServer::default();
        server.a_records.insert(
            "www.example.net".to_string(),
            vec![Ipv4Addr::new(203, 0, 113, 7)],
        );
        let (mut resolver, shared) = resolver_with(
            server,
            vec!["example.org".to_string(), "example.net".to_string()],
        );

        let addrs = resolver
            .address("www", &QueryOptions::default())
            .unwrap();
        assert_eq!(vec![Ipv4Addr::new(203, 0, 113, 7)], addrs);
        assert_eq!(
            vec!["www.example.org".to_string(), "www.example.net".to_string()],
            shared.borrow().log
        );
    }

    #[test]
    fn dotted_name_tried_bare_first() {
        let mut server = MockServer::default();
        server.a_records.insert(
            "www.example.org".to_string(),
            vec![Ipv4Addr::new(203, 0, 113, 9)],
        );
        let (mut resolver, shared) =
            resolver_with(server, vec!["example.net".to_string()]);

        resolver
            .address("www.example.org", &QueryOptions::default())
            .unwrap();
        assert_eq!(vec!["www.example.org".to_string()], shared.borrow().log);
    }

    #[test]
    fn invalid_name_issues_no_traffic() {
        let (mut resolver, shared) = resolver_with(MockServer::default(), vec![]);
        let result = resolver.address("-bad-name", &QueryOptions::default());
        assert!(matches!(result, Err(ResolveError::InvalidHostName(_))));
        assert!(shared.borrow().log.is_empty());

        let result = resolver.name("not.a.quad", &QueryOptions::default());
        assert!(matches!(result, Err(ResolveError::InvalidAddress(_))));
        assert!(shared.borrow().log.is_empty());
    }

    #[test]
    fn quad_is_confirmed_by_reverse_lookup() {
        let mut server = MockServer::default();
        server.ptr_records.insert(
            "1.2.0.192.in-addr.arpa".to_string(),
            vec!["www.example.org".to_string()],
        );
        let (mut resolver, shared) = resolver_with(server, vec![]);

        let addrs = resolver
            .address("192.0.2.1", &QueryOptions::default())
            .unwrap();
        assert_eq!(vec![Ipv4Addr::new(192, 0, 2, 1)], addrs);
        assert_eq!(
            vec!["1.2.0.192.in-addr.arpa".to_string()],
            shared.borrow().log
        );
    }

    #[test]
    fn reverse_lookup_no_search_recursion() {
        let mut server = MockServer::default();
        server.ptr_records.insert(
            "5.0.0.10.in-addr.arpa".to_string(),
            vec!["probe.example.org".to_string()],
        );
        let (mut resolver, shared) =
            resolver_with(server, vec!["example.org".to_string()]);

        let names = resolver.name("10.0.0.5", &QueryOptions::default()).unwrap();
        assert_eq!(vec!["probe.example.org".to_string()], names);
        // exactly one query, no suffixed variants
        assert_eq!(1, shared.borrow().log.len());
    }

    #[test]
    fn rcode_is_surfaced() {
        let server = MockServer {
            rcode: Some(3),
            ..MockServer::default()
        };
        let (mut resolver, _) = resolver_with(server, vec![]);
        let result = resolver.address("gone.example.org", &QueryOptions::default());
        match result {
            Err(ResolveError::Response(ResponseError::Rcode(3))) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn exhausted_search_yields_no_answer() {
        let (mut resolver, shared) =
            resolver_with(MockServer::default(), vec!["example.org".to_string()]);
        let result = resolver.address("missing", &QueryOptions::default());
        assert!(matches!(
            result,
            Err(ResolveError::Response(ResponseError::NoAnswer))
        ));
        // both passes walked the candidates
        assert!(shared.borrow().log.len() >= 2);
    }

    #[test]
    fn forward_cache_suppresses_second_query(){
        let mut server = MockServer::default();
        server.a_records.insert(
            "host.example.org".to_string(),
            vec![Ipv4Addr::new(10, 1, 2, 3)],
        );
        let (mut resolver, shared) = resolver_with(server, vec![]);

        resolver
            .address("host.example.org", &QueryOptions::default())
            .unwrap();
        let queries_after_first = shared.borrow().log.len();
        let addrs = resolver
            .address("host.example.org", &QueryOptions::default())
            .unwrap();
        assert_eq!(vec![Ipv4Addr::new(10, 1, 2, 3)], addrs);
        assert_eq!(queries_after_first, shared.borrow().log.len());
    }

    #[test]
    fn server_list_limits() {
        let (mut resolver, _) = resolver_with(MockServer::default(), vec![]);
        let opts = QueryOptions {
            servers: Some(vec![]),
            ..QueryOptions::default()
        };
        assert!(matches!(
            resolver.address("host.example.org", &opts),
            Err(ResolveError::NoServers)
        ));

        let server = SocketAddrV4::new(Ipv4Addr::LOCALHOST, NAMESERVER_PORT);
        let opts = QueryOptions {
            servers: Some(vec![server; MAX_NAME_SERVERS + 1]),
            ..QueryOptions::default()
        };
        assert!(matches!(
            resolver.address("host.example.org", &opts),
            Err(ResolveError::TooManyServers)
        ));
    }

    #[test]
    fn resolv_conf_parsing() {
        let (servers, search) = parse_resolv_conf(
            "# comment\n\
             nameserver 192.0.2.53\n\
             nameserver 198.51.100.53\n\
             nameserver 203.0.113.53\n\
             nameserver 192.0.2.99\n\
             search example.org example.net\n\
             bogus line\n",
        );
        assert_eq!(MAX_NAME_SERVERS, servers.len());
        assert_eq!(
            SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 53), 53),
            servers[0]
        );
        assert_eq!(
            vec!["example.org".to_string(), "example.net".to_string()],
            search
        );

        let (_, search) = parse_resolv_conf("domain example.com\n");
        assert_eq!(vec!["example.com".to_string()], search);
    }
}
