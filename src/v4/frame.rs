//! Ethernet, IPv4 and UDP framing.
//!
//! Outbound frames are assembled in two passes: every header is written with
//! its checksum field zeroed, then the IPv4 and UDP checksums are computed
//! over the finished bytes and patched in place. Nothing but the two checksum
//! fields changes between the passes.

use super::checksum::internet_checksum;
use crate::error::{HarbingerError, ParseError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use std::{fmt, net::Ipv4Addr, str::FromStr};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const IPPROTO_UDP: u8 = 17;
pub const DEFAULT_TTL: u8 = 255;

const IPV4_VERSION_IHL: u8 = 0x45;
const IPV4_CHECKSUM_OFFSET: usize = ETHERNET_HEADER_LEN + 10;
const UDP_OFFSET: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;
const UDP_CHECKSUM_OFFSET: usize = UDP_OFFSET + 6;
// More-fragments flag plus the 13-bit fragment offset.
const IPV4_FRAGMENT_MASK: u16 = 0x3fff;

/// A 48-bit Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Draws a random unicast, locally administered address.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut octets = [0u8; 6];
        rng.fill(&mut octets[..]);
        octets[0] = (octets[0] | 0x02) & 0xfe;
        Self(octets)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

/// Parses a MAC address string (e.g., "0a:1b:2c:3d:4e:5f").
impl FromStr for MacAddress {
    type Err = HarbingerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| HarbingerError::MacParse(s.to_string()))?;
            if part.len() != 2 {
                return Err(HarbingerError::MacParse(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| HarbingerError::MacParse(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(HarbingerError::MacParse(s.to_string()));
        }
        Ok(Self(octets))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.destination.octets());
        buf.put_slice(&self.source.octets());
        buf.put_u16(self.ethertype);
    }

    fn decode(frame: &[u8]) -> Result<(Self, &[u8]), ParseError> {
        ensure_len("Ethernet header", frame, ETHERNET_HEADER_LEN)?;
        let (mut header, rest) = frame.split_at(ETHERNET_HEADER_LEN);
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        header.copy_to_slice(&mut destination);
        header.copy_to_slice(&mut source);
        let header = Self {
            destination: destination.into(),
            source: source.into(),
            ethertype: header.get_u16(),
        };
        Ok((header, rest))
    }
}

/// The IPv4 fields this crate varies. Version/IHL, flags and protocol are
/// fixed on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub identification: u16,
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// A UDP datagram borrowed out of a received frame.
#[derive(Debug, Clone, Copy)]
pub struct UdpDatagram<'a> {
    pub ip: Ipv4Header,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
}

/// Wraps `payload` in UDP, IPv4 and Ethernet headers with valid checksums.
pub fn encapsulate(
    ethernet: &EthernetHeader,
    ip: &Ipv4Header,
    source_port: u16,
    destination_port: u16,
    payload: &[u8],
) -> Bytes {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let ip_len = IPV4_HEADER_LEN + udp_len;
    let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + ip_len);

    ethernet.encode(&mut buf);

    buf.put_u8(IPV4_VERSION_IHL);
    buf.put_u8(0); // ToS
    buf.put_u16(ip_len as u16);
    buf.put_u16(ip.identification);
    buf.put_u16(0); // flags / fragment offset
    buf.put_u8(ip.ttl);
    buf.put_u8(IPPROTO_UDP);
    buf.put_u16(0); // checksum, pass 1
    buf.put_slice(&ip.source.octets());
    buf.put_slice(&ip.destination.octets());

    buf.put_u16(source_port);
    buf.put_u16(destination_port);
    buf.put_u16(udp_len as u16);
    buf.put_u16(0); // checksum, pass 1
    buf.put_slice(payload);

    let ip_checksum = internet_checksum(&buf[ETHERNET_HEADER_LEN..UDP_OFFSET]);
    let udp_checksum = udp_checksum(ip.source, ip.destination, &buf[UDP_OFFSET..]);

    buf[IPV4_CHECKSUM_OFFSET..IPV4_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&ip_checksum.to_be_bytes());
    buf[UDP_CHECKSUM_OFFSET..UDP_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&udp_checksum.to_be_bytes());

    buf.freeze()
}

/// Builds the pseudo-header used by the UDP checksum. It is never transmitted.
pub fn pseudo_header(source: Ipv4Addr, destination: Ipv4Addr, udp_len: u16) -> [u8; 12] {
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&source.octets());
    header[4..8].copy_from_slice(&destination.octets());
    header[9] = IPPROTO_UDP;
    header[10..12].copy_from_slice(&udp_len.to_be_bytes());
    header
}

/// Computes the UDP checksum over pseudo-header ‖ `segment`, where `segment`
/// is the UDP header (checksum zeroed) followed by the payload.
///
/// A computed value of zero is sent as `0xFFFF`; zero on the wire means
/// "no checksum".
pub fn udp_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut data = Vec::with_capacity(12 + segment.len());
    data.extend_from_slice(&pseudo_header(source, destination, segment.len() as u16));
    data.extend_from_slice(segment);
    match internet_checksum(&data) {
        0 => 0xFFFF,
        sum => sum,
    }
}

/// Strips the Ethernet, IPv4 and UDP headers from a raw frame.
///
/// Both checksums are verified; a UDP checksum of zero is accepted as absent.
pub fn decapsulate(frame: &[u8]) -> Result<UdpDatagram<'_>, ParseError> {
    let (ethernet, packet) = EthernetHeader::decode(frame)?;
    if ethernet.ethertype != ETHERTYPE_IPV4 {
        return Err(ParseError::NotIpv4(ethernet.ethertype));
    }

    ensure_len("IPv4 header", packet, IPV4_HEADER_LEN)?;
    let version_ihl = packet[0];
    let header_len = usize::from(version_ihl & 0x0f) * 4;
    if version_ihl >> 4 != 4 || header_len < IPV4_HEADER_LEN {
        return Err(ParseError::BadIpHeader(version_ihl));
    }
    ensure_len("IPv4 header", packet, header_len)?;

    let mut fields = &packet[2..IPV4_HEADER_LEN];
    let total_len = usize::from(fields.get_u16());
    let identification = fields.get_u16();
    let flags_fragment = fields.get_u16();
    let ttl = fields.get_u8();
    let protocol = fields.get_u8();
    let _checksum = fields.get_u16();
    let source = Ipv4Addr::from(fields.get_u32());
    let destination = Ipv4Addr::from(fields.get_u32());

    if total_len < header_len {
        return Err(ParseError::BadIpHeader(version_ihl));
    }
    ensure_len("IPv4 datagram", packet, total_len)?;
    if flags_fragment & IPV4_FRAGMENT_MASK != 0 {
        return Err(ParseError::Fragmented);
    }
    if protocol != IPPROTO_UDP {
        return Err(ParseError::NotUdp(protocol));
    }
    if internet_checksum(&packet[..header_len]) != 0 {
        return Err(ParseError::BadChecksum("IPv4"));
    }

    // Ethernet padding past the IPv4 total length is not part of the datagram.
    let segment = &packet[header_len..total_len];
    ensure_len("UDP header", segment, UDP_HEADER_LEN)?;
    let mut udp = segment;
    let source_port = udp.get_u16();
    let destination_port = udp.get_u16();
    let udp_len = usize::from(udp.get_u16());
    let checksum = udp.get_u16();

    if udp_len < UDP_HEADER_LEN {
        return Err(ParseError::Truncated {
            layer: "UDP header",
            needed: UDP_HEADER_LEN,
            available: udp_len,
        });
    }
    ensure_len("UDP datagram", segment, udp_len)?;
    let segment = &segment[..udp_len];

    if checksum != 0 {
        let mut data = Vec::with_capacity(12 + udp_len);
        data.extend_from_slice(&pseudo_header(source, destination, udp_len as u16));
        data.extend_from_slice(segment);
        if internet_checksum(&data) != 0 {
            return Err(ParseError::BadChecksum("UDP"));
        }
    }

    Ok(UdpDatagram {
        ip: Ipv4Header {
            identification,
            ttl,
            source,
            destination,
        },
        source_port,
        destination_port,
        payload: &segment[UDP_HEADER_LEN..],
    })
}

pub(crate) fn ensure_len(layer: &'static str, data: &[u8], needed: usize) -> Result<(), ParseError> {
    if data.len() < needed {
        return Err(ParseError::Truncated {
            layer,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(payload: &[u8]) -> Bytes {
        let ethernet = EthernetHeader {
            destination: MacAddress::BROADCAST,
            source: MacAddress::new([0xaa; 6]),
            ethertype: ETHERTYPE_IPV4,
        };
        let ip = Ipv4Header {
            identification: 0x1844,
            ttl: DEFAULT_TTL,
            source: Ipv4Addr::UNSPECIFIED,
            destination: Ipv4Addr::BROADCAST,
        };
        encapsulate(&ethernet, &ip, 68, 67, payload)
    }

    #[test]
    fn encapsulated_headers_are_byte_exact() {
        let frame = sample_frame(&[1, 2, 3]);
        assert_eq!(frame.len(), 14 + 20 + 8 + 3);
        assert_eq!(&frame[0..6], &[0xff; 6]);
        assert_eq!(&frame[6..12], &[0xaa; 6]);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        assert_eq!(frame[14], 0x45);
        assert_eq!(&frame[16..18], &31u16.to_be_bytes());
        assert_eq!(&frame[18..20], &[0x18, 0x44]);
        assert_eq!(&frame[20..22], &[0x00, 0x00]);
        assert_eq!(frame[22], 255);
        assert_eq!(frame[23], 17);
        assert_eq!(&frame[26..30], &[0, 0, 0, 0]);
        assert_eq!(&frame[30..34], &[0xff; 4]);
        assert_eq!(&frame[34..36], &68u16.to_be_bytes());
        assert_eq!(&frame[36..38], &67u16.to_be_bytes());
        assert_eq!(&frame[38..40], &11u16.to_be_bytes());
        assert_eq!(&frame[42..], &[1, 2, 3]);
    }

    #[test]
    fn checksums_self_validate() {
        let frame = sample_frame(b"odd-length payload");
        assert_eq!(internet_checksum(&frame[14..34]), 0);

        let udp_len = (frame.len() - 34) as u16;
        let mut data = pseudo_header(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST, udp_len).to_vec();
        data.extend_from_slice(&frame[34..]);
        assert_eq!(internet_checksum(&data), 0);
    }

    #[test]
    fn decapsulate_round_trip() {
        let frame = sample_frame(&[7; 12]);
        let datagram = decapsulate(&frame).unwrap();
        assert_eq!(datagram.source_port, 68);
        assert_eq!(datagram.destination_port, 67);
        assert_eq!(datagram.ip.identification, 0x1844);
        assert_eq!(datagram.ip.destination, Ipv4Addr::BROADCAST);
        assert_eq!(datagram.payload, &[7; 12]);
    }

    #[test]
    fn decapsulate_ignores_ethernet_trailer() {
        let mut frame = sample_frame(&[7; 4]).to_vec();
        frame.extend_from_slice(&[0; 16]);
        assert_eq!(decapsulate(&frame).unwrap().payload, &[7; 4]);
    }

    #[test]
    fn decapsulate_rejects_corruption() {
        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[45] ^= 0x01;
        assert_eq!(decapsulate(&frame).unwrap_err(), ParseError::BadChecksum("UDP"));

        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[22] = 64;
        assert_eq!(decapsulate(&frame).unwrap_err(), ParseError::BadChecksum("IPv4"));

        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[12] = 0x86;
        frame[13] = 0xdd;
        assert_eq!(decapsulate(&frame).unwrap_err(), ParseError::NotIpv4(0x86dd));
    }

    #[test]
    fn decapsulate_accepts_missing_udp_checksum() {
        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[40..42].copy_from_slice(&[0, 0]);
        assert!(decapsulate(&frame).is_ok());
    }

    #[test]
    fn decapsulate_rejects_truncation() {
        let frame = sample_frame(&[7; 12]);
        for len in [0, 13, 20, 33, 40, frame.len() - 1] {
            assert!(decapsulate(&frame[..len]).is_err(), "length {len}");
        }
    }

    /// Recomputes the IPv4 header checksum after a test edits the header.
    fn reseal_ip_header(frame: &mut [u8]) {
        let header_len = usize::from(frame[14] & 0x0f) * 4;
        frame[24..26].copy_from_slice(&[0, 0]);
        let checksum = internet_checksum(&frame[14..14 + header_len]);
        frame[24..26].copy_from_slice(&checksum.to_be_bytes());
    }

    #[test]
    fn decapsulate_honours_ip_options() {
        let plain = sample_frame(&[7; 12]);
        let ip_options = [0x01, 0x01, 0x01, 0x00]; // NOP, NOP, NOP, EOL

        let mut frame = plain[..34].to_vec();
        frame.extend_from_slice(&ip_options);
        frame.extend_from_slice(&plain[34..]);
        frame[14] = 0x46;
        let total_len = u16::from_be_bytes([frame[16], frame[17]]) + 4;
        frame[16..18].copy_from_slice(&total_len.to_be_bytes());
        reseal_ip_header(&mut frame);

        let datagram = decapsulate(&frame).unwrap();
        assert_eq!(datagram.source_port, 68);
        assert_eq!(datagram.destination_port, 67);
        assert_eq!(datagram.payload, &[7; 12]);
    }

    #[test]
    fn decapsulate_rejects_fragments() {
        // More-fragments flag, then a non-zero offset on the last fragment.
        for flags_fragment in [0x2000u16, 0x0010] {
            let mut frame = sample_frame(&[7; 12]).to_vec();
            frame[20..22].copy_from_slice(&flags_fragment.to_be_bytes());
            reseal_ip_header(&mut frame);
            assert_eq!(decapsulate(&frame).unwrap_err(), ParseError::Fragmented);
        }

        // Don't-fragment alone is an ordinary datagram.
        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[20] = 0x40;
        reseal_ip_header(&mut frame);
        assert!(decapsulate(&frame).is_ok());
    }

    #[test]
    fn decapsulate_rejects_other_protocols() {
        let mut frame = sample_frame(&[7; 12]).to_vec();
        frame[23] = 6;
        reseal_ip_header(&mut frame);
        assert_eq!(decapsulate(&frame).unwrap_err(), ParseError::NotUdp(6));
    }

    #[test]
    fn mac_address_parsing() {
        let mac: MacAddress = "0a:1b:2c:3d:4e:5f".parse().unwrap();
        assert_eq!(mac.octets(), [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
        assert_eq!(mac.to_string(), "0a:1b:2c:3d:4e:5f");

        for bad in [
            "",
            "0a:1b:2c:3d:4e",
            "0a:1b:2c:3d:4e:5f:60",
            "zz:1b:2c:3d:4e:5f",
            "a:1b:2c:3d:4e:5f",
        ] {
            assert!(bad.parse::<MacAddress>().is_err(), "{bad}");
        }
    }

    #[test]
    fn random_mac_is_local_unicast() {
        let mut rng = rand::rng();
        for _ in 0..32 {
            let first = MacAddress::random(&mut rng).octets()[0];
            assert_eq!(first & 0x01, 0);
            assert_eq!(first & 0x02, 0x02);
        }
    }
}
