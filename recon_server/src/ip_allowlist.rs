//! Source address allowlists for webhook routes.
//!
//! Entries are either single addresses (`192.0.2.7`, `2001:db8::1`) or CIDR ranges (`192.0.2.0/24`, `2001:db8::/32`).
use std::{fmt::Display, net::IpAddr, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid allowlist entry '{0}'")]
pub struct InvalidAllowlistEntry(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(*ip) & mask
            },
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(*ip) & mask
            },
            (IpAddr::V4(_), IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
                Some(v4) => self.contains(&IpAddr::V4(v4)),
                None => false,
            },
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRange {
    type Err = InvalidAllowlistEntry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || InvalidAllowlistEntry(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network = IpAddr::from_str(addr).map_err(|_| err())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| err())?,
            None => max,
        };
        if prefix > max {
            return Err(err());
        }
        Ok(Self { network, prefix })
    }
}

impl Display for IpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// The set of addresses a processor may deliver webhooks from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpAllowlist {
    /// No allowlist is configured. Every address is let through (HMAC checks still apply).
    Open,
    Ranges(Vec<IpRange>),
    /// The configured allowlist could not be parsed. Nothing is let through.
    DenyAll,
}

impl IpAllowlist {
    /// Parses a comma-separated list. Any invalid entry makes the whole list invalid.
    pub fn parse(value: &str) -> Result<Self, InvalidAllowlistEntry> {
        let ranges = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(IpRange::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Ranges(ranges))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether a request from `ip` may proceed. A request whose address could not be determined is only let through an
    /// open allowlist.
    pub fn allows(&self, ip: Option<&IpAddr>) -> bool {
        match (self, ip) {
            (Self::Open, _) => true,
            (Self::DenyAll, _) => false,
            (Self::Ranges(_), None) => false,
            (Self::Ranges(ranges), Some(ip)) => ranges.iter().any(|r| r.contains(ip)),
        }
    }
}

impl Display for IpAllowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::DenyAll => f.write_str("deny all"),
            Self::Ranges(ranges) => {
                let list = ranges.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
                f.write_str(&list)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn single_addresses_and_ranges() {
        let list = IpAllowlist::parse("192.0.2.7, 10.0.0.0/8,2001:db8::/32").unwrap();
        assert!(list.allows(Some(&ip("192.0.2.7"))));
        assert!(!list.allows(Some(&ip("192.0.2.8"))));
        assert!(list.allows(Some(&ip("10.200.3.4"))));
        assert!(!list.allows(Some(&ip("11.0.0.1"))));
        assert!(list.allows(Some(&ip("2001:db8:ffff::1"))));
        assert!(!list.allows(Some(&ip("2001:db9::1"))));
        assert!(list.allows(Some(&ip("::ffff:10.1.1.1"))));
        assert!(!list.allows(None));
    }

    #[test]
    fn invalid_entries() {
        assert_eq!(IpAllowlist::parse("10.0.0.0/8, nope"), Err(InvalidAllowlistEntry("nope".into())));
        assert!(IpAllowlist::parse("10.0.0.0/33").is_err());
        assert!(IpAllowlist::parse("2001:db8::/129").is_err());
        assert!(IpAllowlist::parse("10.0.0.1/x").is_err());
    }

    #[test]
    fn open_and_closed() {
        assert!(IpAllowlist::Open.allows(None));
        assert!(!IpAllowlist::DenyAll.allows(Some(&ip("127.0.0.1"))));
        let zero = IpAllowlist::parse("0.0.0.0/0").unwrap();
        assert!(zero.allows(Some(&ip("203.0.113.9"))));
        assert!(!IpAllowlist::parse("").unwrap().allows(Some(&ip("127.0.0.1"))));
    }
}
