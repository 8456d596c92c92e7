//! DHCPv4 over raw Ethernet frames
//!
//! This module contains the DHCPv4-specific implementation including:
//! - The Internet checksum
//! - Ethernet/IPv4/UDP framing and DHCP option TLVs
//! - Discover/Request construction and Offer parsing
//! - The negotiation state machine

pub mod checksum;
pub mod frame;
pub mod handler;
pub mod message;
pub mod offer;
pub mod options;


pub use checksum::internet_checksum;
pub use frame::MacAddress;
pub use handler::{NegotiationHandler, NegotiationSession, SessionState};
pub use message::{build_discover, build_request, FrameBuilder};
pub use offer::{parse_offer, parse_offer_payload, OfferFields};
