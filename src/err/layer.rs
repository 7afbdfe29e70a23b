/// Layers on which an error can occur while decoding wire data.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Layer {
    /// Error occurred in the IPv4 header.
    Ipv4Header,
    /// Error occurred in the UDP header.
    UdpHeader,
    /// Error occurred in the ICMP message.
    IcmpMessage,
    /// Error occurred in a probe request frame.
    ProbeRequestFrame,
    /// Error occurred in a probe reply frame.
    ProbeReplyFrame,
    /// Error occurred in a trap envelope.
    TrapEnvelope,
    /// Error occurred in a DNS message.
    DnsMessage,
}

impl Layer {
    /// String describing the layer in an error message.
    pub fn error_title(&self) -> &'static str {
        use Layer::*;
        match self {
            Ipv4Header => "IPv4 header",
            UdpHeader => "UDP header",
            IcmpMessage => "ICMP message",
            ProbeRequestFrame => "probe request frame",
            ProbeReplyFrame => "probe reply frame",
            TrapEnvelope => "trap envelope",
            DnsMessage => "DNS message",
        }
    }
}

impl core::fmt::Display for Layer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.error_title())
    }
}
