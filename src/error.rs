use crate::network::SocketError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarbingerError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("Transport operation failed")]
    Transport(#[from] TransportError),

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State machine reached a critical failure: {0}")]
    Critical(String),
}

/// Failures reported by the send/receive primitives.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to send frame")]
    Send(#[source] io::Error),

    #[error("Failed to receive frame")]
    Receive(#[source] io::Error),

    #[error("Transport closed")]
    Closed,
}

/// Reasons an inbound datagram is discarded.
///
/// These never leave the codec: `parse_offer` logs them and returns `None`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("{layer} truncated: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Not an IPv4 frame (ethertype {0:#06x})")]
    NotIpv4(u16),

    #[error("Unsupported IPv4 header (version/IHL byte {0:#04x})")]
    BadIpHeader(u8),

    #[error("Fragmented IPv4 datagram")]
    Fragmented,

    #[error("Not a UDP datagram (protocol {0})")]
    NotUdp(u8),

    #[error("UDP datagram for port {0}, not the DHCP client port")]
    WrongPort(u16),

    #[error("{0} checksum mismatch")]
    BadChecksum(&'static str),

    #[error("Not a BOOTREPLY (opcode {0})")]
    NotReply(u8),

    #[error("Missing DHCP magic cookie")]
    BadMagicCookie,

    #[error("Option {tag} runs past the end of the message")]
    TruncatedOption { tag: u8 },

    #[error("Option {tag} has invalid length {len}")]
    BadOptionLength { tag: u8, len: usize },

    #[error("No DHCP message type option")]
    MissingMessageType,

    #[error("DHCP message type {0} is not an Offer")]
    NotOffer(u8),
}
