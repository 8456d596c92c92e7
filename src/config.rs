use crate::{
    error::HarbingerError,
    v4::{frame::MacAddress, message::FrameBuilder},
};
use clap::Parser;
use std::time::Duration;

/// Upper bound for `--count`; each session holds a table entry and a frame.
pub const MAX_SESSIONS: u32 = 65_535;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to send and listen on (e.g., 'eth0')
    #[arg(short, long)]
    pub interface: String,

    /// How many Discover/Offer/Request sessions to run
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SESSIONS)))]
    pub count: u32,

    /// Seconds to wait for an Offer before retransmitting Discovers
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Discovers sent per session before giving up
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: u32,

    /// Hostname to announce in option 12
    #[arg(long)]
    pub hostname: Option<String>,

    /// Ethernet source address for outgoing frames (default aa:aa:aa:aa:aa:aa)
    #[arg(long)]
    pub source_mac: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub interface: String,
    pub count: usize,
    pub offer_timeout: Duration,
    pub max_attempts: u32,
    pub hostname: Option<String>,
    pub source_mac: Option<MacAddress>,
}

impl ClientConfig {
    pub fn new(interface: String) -> Self {
        Self {
            interface,
            count: 1,
            offer_timeout: Duration::from_secs(5),
            max_attempts: 3,
            hostname: None,
            source_mac: None,
        }
    }

    /// The frame builder described by this configuration.
    pub fn frame_builder(&self) -> FrameBuilder {
        let mut builder = FrameBuilder::new();
        if let Some(mac) = self.source_mac {
            builder = builder.with_source_mac(mac);
        }
        if let Some(name) = &self.hostname {
            builder = builder.with_hostname(name.clone());
        }
        builder
    }
}

impl TryFrom<Args> for ClientConfig {
    type Error = HarbingerError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.interface.is_empty() {
            return Err(HarbingerError::InvalidConfig(
                "interface name must not be empty".to_string(),
            ));
        }
        if let Some(name) = &args.hostname {
            if name.is_empty() || name.len() > usize::from(u8::MAX) {
                return Err(HarbingerError::InvalidConfig(format!(
                    "hostname must be 1-255 bytes, got {}",
                    name.len()
                )));
            }
        }
        let source_mac = args.source_mac.as_deref().map(str::parse::<MacAddress>).transpose()?;

        Ok(Self {
            interface: args.interface,
            count: args.count as usize,
            offer_timeout: Duration::from_secs(args.timeout),
            max_attempts: args.attempts,
            hostname: args.hostname,
            source_mac,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_convert_to_config() {
        let args = Args::parse_from([
            "harbinger",
            "--interface",
            "eth0",
            "-n",
            "4",
            "--timeout",
            "2",
            "--hostname",
            "lab-host",
            "--source-mac",
            "02:00:00:00:00:01",
        ]);
        let config = ClientConfig::try_from(args).unwrap();
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.count, 4);
        assert_eq!(config.offer_timeout, Duration::from_secs(2));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.hostname.as_deref(), Some("lab-host"));
        assert_eq!(
            config.source_mac,
            Some(MacAddress::new([0x02, 0, 0, 0, 0, 1]))
        );
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(Args::try_parse_from(["harbinger", "-i", "eth0", "-n", "0"]).is_err());
    }

    #[test]
    fn count_is_bounded() {
        let max = MAX_SESSIONS.to_string();
        assert!(Args::try_parse_from(["harbinger", "-i", "eth0", "-n", max.as_str()]).is_ok());

        let over = (MAX_SESSIONS + 1).to_string();
        assert!(Args::try_parse_from(["harbinger", "-i", "eth0", "-n", over.as_str()]).is_err());
        assert!(Args::try_parse_from(["harbinger", "-i", "eth0", "-n", "4000000000"]).is_err());
    }

    #[test]
    fn bad_source_mac_is_rejected() {
        let args = Args::parse_from(["harbinger", "-i", "eth0", "--source-mac", "nope"]);
        assert!(matches!(
            ClientConfig::try_from(args),
            Err(HarbingerError::MacParse(_))
        ));
    }
}
