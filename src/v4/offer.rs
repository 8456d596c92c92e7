//! Offer decoding.
//!
//! `parse_offer` takes a complete Ethernet frame, as delivered by a raw
//! packet socket. `parse_offer_payload` takes the bare BOOTP message.

use super::{
    frame::{self, ensure_len, MacAddress},
    message::{BOOTP_FIXED_LEN, BOOTREPLY, DHCP_CLIENT_PORT, MAGIC_COOKIE},
    options::{parse_options, DhcpOption, MessageType},
};
use crate::error::ParseError;
use bytes::Buf;
use std::{net::Ipv4Addr, time::Duration};

/// What the negotiation needs from an Offer, plus the lease parameters the
/// server volunteered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferFields {
    pub xid: u32,
    pub offered_address: Ipv4Addr,
    pub client_mac: MacAddress,
    pub server_identifier: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_duration: Option<Duration>,
}

/// Decodes a raw frame carrying a DHCP Offer to the client port.
///
/// Anything else, including truncated or corrupt frames, yields `None`.
pub fn parse_offer(frame: &[u8]) -> Option<OfferFields> {
    decode_offer_frame(frame)
        .map_err(|e| tracing::trace!("Discarding frame: {}", e))
        .ok()
}

/// Decodes a bare BOOTP message.
///
/// Without option 54 the server identifier is `fallback_server` (normally the
/// IPv4 source of the Offer), or siaddr when that is unspecified.
pub fn parse_offer_payload(payload: &[u8], fallback_server: Ipv4Addr) -> Option<OfferFields> {
    decode_offer(payload, fallback_server)
        .map_err(|e| tracing::trace!("Discarding DHCP payload: {}", e))
        .ok()
}

fn decode_offer_frame(bytes: &[u8]) -> Result<OfferFields, ParseError> {
    let datagram = frame::decapsulate(bytes)?;
    if datagram.destination_port != DHCP_CLIENT_PORT {
        return Err(ParseError::WrongPort(datagram.destination_port));
    }
    decode_offer(datagram.payload, datagram.ip.source)
}

fn decode_offer(payload: &[u8], fallback_server: Ipv4Addr) -> Result<OfferFields, ParseError> {
    ensure_len("BOOTP message", payload, BOOTP_FIXED_LEN + MAGIC_COOKIE.len())?;

    let mut fixed = &payload[..BOOTP_FIXED_LEN];
    let op = fixed.get_u8();
    if op != BOOTREPLY {
        return Err(ParseError::NotReply(op));
    }
    let _htype = fixed.get_u8();
    let _hlen = fixed.get_u8();
    let _hops = fixed.get_u8();
    let xid = fixed.get_u32();
    let _secs = fixed.get_u16();
    let _flags = fixed.get_u16();
    let _ciaddr = fixed.get_u32();
    let yiaddr = Ipv4Addr::from(fixed.get_u32());
    let siaddr = Ipv4Addr::from(fixed.get_u32());
    let _giaddr = fixed.get_u32();
    let mut chaddr = [0u8; 6];
    fixed.copy_to_slice(&mut chaddr);

    let (cookie, option_area) = payload[BOOTP_FIXED_LEN..].split_at(MAGIC_COOKIE.len());
    if cookie != MAGIC_COOKIE {
        return Err(ParseError::BadMagicCookie);
    }

    let opts = parse_options(option_area)?;
    let message_type = opts
        .iter()
        .find_map(|opt| match opt {
            DhcpOption::MessageType(kind) => Some(*kind),
            _ => None,
        })
        .ok_or(ParseError::MissingMessageType)?;
    if message_type != MessageType::Offer {
        return Err(ParseError::NotOffer(u8::from(message_type)));
    }

    let mut offer = OfferFields {
        xid,
        offered_address: yiaddr,
        client_mac: MacAddress::new(chaddr),
        server_identifier: Ipv4Addr::UNSPECIFIED,
        subnet_mask: None,
        routers: Vec::new(),
        dns_servers: Vec::new(),
        lease_duration: None,
    };
    let mut server_identifier = None;
    for opt in opts {
        match opt {
            DhcpOption::ServerIdentifier(addr) => server_identifier = Some(addr),
            DhcpOption::SubnetMask(mask) => offer.subnet_mask = Some(mask),
            DhcpOption::Router(routers) => offer.routers = routers,
            DhcpOption::DomainNameServer(dns) => offer.dns_servers = dns,
            DhcpOption::AddressLeaseTime(secs) => {
                offer.lease_duration = Some(Duration::from_secs(u64::from(secs)))
            }
            _ => {}
        }
    }

    offer.server_identifier = server_identifier
        .or_else(|| (!fallback_server.is_unspecified()).then_some(fallback_server))
        .unwrap_or(siaddr);
    Ok(offer)
}
