use super::{
    frame::{self, EthernetHeader, Ipv4Header, MacAddress, DEFAULT_TTL, ETHERTYPE_IPV4},
    options::{self, DhcpOption, MessageType},
};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_SERVER_PORT: u16 = 67;
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;
pub const BROADCAST_FLAG: u16 = 0x8000;

/// op through file: everything before the magic cookie.
pub const BOOTP_FIXED_LEN: usize = 236;
/// Smallest BOOTP message relays and servers are required to accept.
pub const BOOTP_MIN_LEN: usize = 300;

/// Ethernet source used when none is configured.
pub const DEFAULT_SOURCE_MAC: MacAddress = MacAddress::new([0xaa; 6]);

/// Subnet mask, broadcast address, router, domain name, DNS servers.
pub const DEFAULT_PARAMETER_REQUEST_LIST: [u8; 5] = [
    options::SUBNET_MASK,
    options::BROADCAST_ADDRESS,
    options::ROUTER,
    options::DOMAIN_NAME,
    options::DOMAIN_NAME_SERVER,
];

/// Assembles broadcast DHCP client frames.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    source_mac: MacAddress,
    hostname: Option<String>,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self {
            source_mac: DEFAULT_SOURCE_MAC,
            hostname: None,
        }
    }
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_mac(mut self, source_mac: MacAddress) -> Self {
        self.source_mac = source_mac;
        self
    }

    /// Adds option 12 to every message.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Constructs a DHCP Discover frame.
    pub fn discover(&self, xid: u32, client_mac: MacAddress) -> Bytes {
        let mut opts = vec![
            DhcpOption::MessageType(MessageType::Discover),
            DhcpOption::ParameterRequestList(DEFAULT_PARAMETER_REQUEST_LIST.to_vec()),
        ];
        self.push_hostname(&mut opts);
        self.frame(xid, client_mac, &opts)
    }

    /// Constructs a DHCP Request frame selecting `offered` from `server`.
    ///
    /// ciaddr stays zero; the address is requested through option 50.
    pub fn request(
        &self,
        xid: u32,
        client_mac: MacAddress,
        offered: Ipv4Addr,
        server: Ipv4Addr,
    ) -> Bytes {
        let mut opts = vec![
            DhcpOption::MessageType(MessageType::Request),
            DhcpOption::RequestedIpAddress(offered),
            DhcpOption::ServerIdentifier(server),
        ];
        self.push_hostname(&mut opts);
        self.frame(xid, client_mac, &opts)
    }

    fn push_hostname(&self, opts: &mut Vec<DhcpOption>) {
        if let Some(name) = &self.hostname {
            opts.push(DhcpOption::Hostname(name.clone()));
        }
    }

    fn frame(&self, xid: u32, client_mac: MacAddress, opts: &[DhcpOption]) -> Bytes {
        let payload = encode_bootrequest(xid, client_mac, opts);
        let ethernet = EthernetHeader {
            destination: MacAddress::BROADCAST,
            source: self.source_mac,
            ethertype: ETHERTYPE_IPV4,
        };
        let ip = Ipv4Header {
            identification: xid as u16,
            ttl: DEFAULT_TTL,
            source: Ipv4Addr::UNSPECIFIED,
            destination: Ipv4Addr::BROADCAST,
        };
        frame::encapsulate(&ethernet, &ip, DHCP_CLIENT_PORT, DHCP_SERVER_PORT, &payload)
    }
}

/// Writes a BOOTREQUEST with all four address fields zero, followed by the
/// options, End, and zero padding up to [`BOOTP_MIN_LEN`].
fn encode_bootrequest(xid: u32, client_mac: MacAddress, opts: &[DhcpOption]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(BOOTP_MIN_LEN);
    buf.put_u8(BOOTREQUEST);
    buf.put_u8(HTYPE_ETHERNET);
    buf.put_u8(HLEN_ETHERNET);
    buf.put_u8(0); // hops
    buf.put_u32(xid);
    buf.put_u16(0); // secs
    buf.put_u16(BROADCAST_FLAG);
    buf.put_bytes(0, 16); // ciaddr, yiaddr, siaddr, giaddr
    buf.put_slice(&client_mac.octets());
    buf.put_bytes(0, 10);
    buf.put_bytes(0, 64); // sname
    buf.put_bytes(0, 128); // file
    debug_assert_eq!(buf.len(), BOOTP_FIXED_LEN);

    buf.put_slice(&MAGIC_COOKIE);
    for opt in opts {
        opt.encode(&mut buf);
    }
    buf.put_u8(options::END);

    if buf.len() < BOOTP_MIN_LEN {
        let pad = BOOTP_MIN_LEN - buf.len();
        buf.put_bytes(0, pad);
    }
    buf
}

/// Builds a Discover frame with the default [`FrameBuilder`].
pub fn build_discover(xid: u32, client_mac: MacAddress) -> Bytes {
    FrameBuilder::default().discover(xid, client_mac)
}

/// Builds a Request frame with the default [`FrameBuilder`].
pub fn build_request(
    xid: u32,
    client_mac: MacAddress,
    offered: Ipv4Addr,
    server: Ipv4Addr,
) -> Bytes {
    FrameBuilder::default().request(xid, client_mac, offered, server)
}
