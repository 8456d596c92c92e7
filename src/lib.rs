//! # Harbinger - A Raw-Frame DHCPv4 Negotiator
//!
//! Harbinger crafts DHCP Discover and Request messages as complete Ethernet
//! frames and sends them through a raw packet socket, bypassing the operating
//! system's DHCP client. It runs any number of Discover → Offer → Request
//! exchanges in parallel, correlating each Offer with its Discover by
//! transaction id.
//!
//! ## Features
//!
//! - Byte-exact Ethernet/IPv4/UDP/BOOTP frame construction
//! - RFC 1071 Internet checksum with full carry folding
//! - Offer parsing that walks the option list instead of trusting offsets
//! - Bounded negotiation with per-session retransmission
//!
//! ## Example
//!
//! ```rust,no_run
//! use harbinger::{run_negotiation, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ClientConfig::new("eth0".to_string());
//!     config.count = 2;
//!     for session in run_negotiation(&config).await? {
//!         println!("{:#010x}: {:?}", session.xid, session.state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod v4;

pub use client::{run_negotiation, FrameTransport, Negotiator};
pub use config::{Args, ClientConfig};
pub use error::HarbingerError;
pub use v4::{build_discover, build_request, internet_checksum, parse_offer, MacAddress};
