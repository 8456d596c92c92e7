//! DHCP option TLVs.
//!
//! Options are walked one record at a time, so a message type or server
//! identifier is found wherever it sits in the list.

use crate::error::ParseError;
use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;

pub const PAD: u8 = 0;
pub const SUBNET_MASK: u8 = 1;
pub const ROUTER: u8 = 3;
pub const DOMAIN_NAME_SERVER: u8 = 6;
pub const HOSTNAME: u8 = 12;
pub const DOMAIN_NAME: u8 = 15;
pub const BROADCAST_ADDRESS: u8 = 28;
pub const REQUESTED_IP_ADDRESS: u8 = 50;
pub const ADDRESS_LEASE_TIME: u8 = 51;
pub const MESSAGE_TYPE: u8 = 53;
pub const SERVER_IDENTIFIER: u8 = 54;
pub const PARAMETER_REQUEST_LIST: u8 = 55;
pub const END: u8 = 255;

/// Addresses that fit in one option's 255-byte value.
pub const MAX_ADDRESSES_PER_OPTION: usize = u8::MAX as usize / 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Discover => 1,
            MessageType::Offer => 2,
            MessageType::Request => 3,
            MessageType::Decline => 4,
            MessageType::Ack => 5,
            MessageType::Nak => 6,
            MessageType::Release => 7,
            MessageType::Inform => 8,
            MessageType::Unknown(other) => other,
        }
    }
}

/// A single decoded option. Tags this crate does not interpret are kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DomainNameServer(Vec<Ipv4Addr>),
    Hostname(String),
    RequestedIpAddress(Ipv4Addr),
    AddressLeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<u8>),
    Unknown { tag: u8, data: Vec<u8> },
}

impl DhcpOption {
    pub fn tag(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => SUBNET_MASK,
            Self::Router(_) => ROUTER,
            Self::DomainNameServer(_) => DOMAIN_NAME_SERVER,
            Self::Hostname(_) => HOSTNAME,
            Self::RequestedIpAddress(_) => REQUESTED_IP_ADDRESS,
            Self::AddressLeaseTime(_) => ADDRESS_LEASE_TIME,
            Self::MessageType(_) => MESSAGE_TYPE,
            Self::ServerIdentifier(_) => SERVER_IDENTIFIER,
            Self::ParameterRequestList(_) => PARAMETER_REQUEST_LIST,
            Self::Unknown { tag, .. } => *tag,
        }
    }

    /// Writes tag, length and value. Address lists keep their first
    /// [`MAX_ADDRESSES_PER_OPTION`] entries; other values longer than 255
    /// bytes are truncated to fit the length octet.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut value = Vec::new();
        match self {
            Self::SubnetMask(addr)
            | Self::RequestedIpAddress(addr)
            | Self::ServerIdentifier(addr) => value.extend_from_slice(&addr.octets()),
            Self::Router(addrs) | Self::DomainNameServer(addrs) => {
                for addr in addrs.iter().take(MAX_ADDRESSES_PER_OPTION) {
                    value.extend_from_slice(&addr.octets());
                }
            }
            Self::Hostname(name) => value.extend_from_slice(name.as_bytes()),
            Self::AddressLeaseTime(secs) => value.extend_from_slice(&secs.to_be_bytes()),
            Self::MessageType(kind) => value.push(u8::from(*kind)),
            Self::ParameterRequestList(codes) => value.extend_from_slice(codes),
            Self::Unknown { data, .. } => value.extend_from_slice(data),
        }
        value.truncate(usize::from(u8::MAX));

        buf.put_u8(self.tag());
        buf.put_u8(value.len() as u8);
        buf.put_slice(&value);
    }

    fn decode(tag: u8, value: &[u8]) -> Result<Self, ParseError> {
        let bad_len = || ParseError::BadOptionLength {
            tag,
            len: value.len(),
        };
        let option = match tag {
            SUBNET_MASK => Self::SubnetMask(single_addr(value).ok_or_else(bad_len)?),
            ROUTER => Self::Router(addr_list(value).ok_or_else(bad_len)?),
            DOMAIN_NAME_SERVER => Self::DomainNameServer(addr_list(value).ok_or_else(bad_len)?),
            HOSTNAME => Self::Hostname(String::from_utf8_lossy(value).into_owned()),
            REQUESTED_IP_ADDRESS => {
                Self::RequestedIpAddress(single_addr(value).ok_or_else(bad_len)?)
            }
            ADDRESS_LEASE_TIME => {
                let secs: [u8; 4] = value.try_into().map_err(|_| bad_len())?;
                Self::AddressLeaseTime(u32::from_be_bytes(secs))
            }
            MESSAGE_TYPE => match value {
                [kind] => Self::MessageType(MessageType::from(*kind)),
                _ => return Err(bad_len()),
            },
            SERVER_IDENTIFIER => Self::ServerIdentifier(single_addr(value).ok_or_else(bad_len)?),
            PARAMETER_REQUEST_LIST => Self::ParameterRequestList(value.to_vec()),
            _ => Self::Unknown {
                tag,
                data: value.to_vec(),
            },
        };
        Ok(option)
    }
}

fn single_addr(value: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = value.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn addr_list(value: &[u8]) -> Option<Vec<Ipv4Addr>> {
    if value.is_empty() || value.len() % 4 != 0 {
        return None;
    }
    Some(
        value
            .chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect(),
    )
}

/// Decodes the option area that follows the magic cookie.
///
/// Pad records are skipped and decoding stops at End; anything after End is
/// padding. A list that runs out before End is accepted as long as no
/// record is cut short.
pub fn parse_options(mut data: &[u8]) -> Result<Vec<DhcpOption>, ParseError> {
    let mut options = Vec::new();
    while let Some((&tag, rest)) = data.split_first() {
        match tag {
            PAD => {
                data = rest;
            }
            END => break,
            _ => {
                let (&len, rest) = rest
                    .split_first()
                    .ok_or(ParseError::TruncatedOption { tag })?;
                let len = usize::from(len);
                if rest.len() < len {
                    return Err(ParseError::TruncatedOption { tag });
                }
                let (value, rest) = rest.split_at(len);
                options.push(DhcpOption::decode(tag, value)?);
                data = rest;
            }
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_message_type_after_variable_length_options() {
        let data = [
            PAD, HOSTNAME, 5, b'h', b'e', b'l', b'l', b'o', PAD, MESSAGE_TYPE, 1, 2,
            SERVER_IDENTIFIER, 4, 10, 0, 0, 1, END, 0xde, 0xad,
        ];
        let options = parse_options(&data).unwrap();
        assert_eq!(
            options,
            vec![
                DhcpOption::Hostname("hello".to_string()),
                DhcpOption::MessageType(MessageType::Offer),
                DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1)),
            ]
        );
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let data = [61, 3, 1, 2, 3, END];
        assert_eq!(
            parse_options(&data).unwrap(),
            vec![DhcpOption::Unknown {
                tag: 61,
                data: vec![1, 2, 3]
            }]
        );
    }

    #[test]
    fn truncated_records_are_rejected() {
        assert_eq!(
            parse_options(&[MESSAGE_TYPE]),
            Err(ParseError::TruncatedOption { tag: MESSAGE_TYPE })
        );
        assert_eq!(
            parse_options(&[SERVER_IDENTIFIER, 4, 10, 0]),
            Err(ParseError::TruncatedOption {
                tag: SERVER_IDENTIFIER
            })
        );
    }

    #[test]
    fn wrong_fixed_lengths_are_rejected() {
        assert_eq!(
            parse_options(&[MESSAGE_TYPE, 2, 2, 2, END]),
            Err(ParseError::BadOptionLength {
                tag: MESSAGE_TYPE,
                len: 2
            })
        );
        assert!(parse_options(&[ROUTER, 3, 1, 2, 3, END]).is_err());
    }

    #[test]
    fn encode_writes_tlv_bytes() {
        let mut buf = BytesMut::new();
        DhcpOption::MessageType(MessageType::Request).encode(&mut buf);
        DhcpOption::RequestedIpAddress(Ipv4Addr::new(17, 17, 17, 17)).encode(&mut buf);
        DhcpOption::ServerIdentifier(Ipv4Addr::new(17, 17, 17, 1)).encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[0x35, 0x01, 0x03, 0x32, 0x04, 0x11, 0x11, 0x11, 0x11, 0x36, 0x04, 0x11, 0x11, 0x11, 0x01]
        );
    }

    #[test]
    fn long_address_lists_keep_whole_addresses() {
        let routers: Vec<Ipv4Addr> = (0..70u32).map(|i| Ipv4Addr::from(0x0a00_0000 + i)).collect();
        let mut buf = BytesMut::new();
        DhcpOption::Router(routers.clone()).encode(&mut buf);
        assert_eq!(usize::from(buf[1]), MAX_ADDRESSES_PER_OPTION * 4);
        buf.put_u8(END);

        let options = parse_options(&buf).unwrap();
        assert_eq!(
            options,
            vec![DhcpOption::Router(routers[..MAX_ADDRESSES_PER_OPTION].to_vec())]
        );
    }

    #[test]
    fn decodes_lease_parameters() {
        let mut buf = BytesMut::new();
        DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)).encode(&mut buf);
        DhcpOption::Router(vec![Ipv4Addr::new(10, 0, 0, 1)]).encode(&mut buf);
        DhcpOption::DomainNameServer(vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(8, 8, 8, 8)])
            .encode(&mut buf);
        DhcpOption::AddressLeaseTime(86400).encode(&mut buf);
        buf.put_u8(END);

        let options = parse_options(&buf).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options[3], DhcpOption::AddressLeaseTime(86400));
        assert_eq!(
            options[2],
            DhcpOption::DomainNameServer(vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(8, 8, 8, 8)])
        );
    }
}
