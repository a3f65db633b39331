//! Allowlist data structures and the allowlist string parser
//!
//! An allowlist specification is a comma-separated list of tokens, each one of:
//!
//! - a bare address (`10.0.0.1`), treated as a host block (`/32`, or `/128` for IPv6)
//! - a CIDR block (`10.0.0.0/24`)
//! - an inclusive address range (`192.168.1.1-192.168.1.10`)
//!
//! Whitespace around each token is ignored. Parsing is all-or-nothing.
//!
//! # Example
//!
//! ```
//! use vethguard::core::allowlist::parse;
//!
//! let allowlist = parse("10.0.0.0/24, 192.168.1.1-192.168.1.10")
//!     .expect("valid spec")
//!     .expect("non-empty spec");
//! assert_eq!(allowlist.networks.len(), 1);
//! assert_eq!(allowlist.ranges.len(), 1);
//!
//! // An empty spec disables filtering rather than allowing nothing
//! assert!(parse("").unwrap().is_none());
//! ```

use crate::core::error::ParseError;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Inclusive range of source addresses, matched with the iprange extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressRange {
    from: IpAddr,
    to: IpAddr,
}

impl AddressRange {
    pub const fn new(from: IpAddr, to: IpAddr) -> Self {
        Self { from, to }
    }

    pub const fn from(&self) -> IpAddr {
        self.from
    }

    pub const fn to(&self) -> IpAddr {
        self.to
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

impl FromStr for AddressRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError {
            token: s.to_string(),
        };

        let parts: Vec<&str> = s.split('-').collect();
        let [from, to] = parts.as_slice() else {
            return Err(err());
        };

        let from = from.trim().parse::<IpAddr>().map_err(|_| err())?;
        let to = to.trim().parse::<IpAddr>().map_err(|_| err())?;
        Ok(Self::new(from, to))
    }
}

impl TryFrom<String> for AddressRange {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressRange> for String {
    fn from(range: AddressRange) -> Self {
        range.to_string()
    }
}

/// CIDR block of source addresses
///
/// Always stored as its network address, so `10.0.0.5/24` and `10.0.0.0/24`
/// are the same block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkBlock(IpNetwork);

impl NetworkBlock {
    pub fn new(network: IpNetwork) -> Self {
        // network() and prefix() come from a valid IpNetwork, so this cannot fail
        let normalized = IpNetwork::new(network.network(), network.prefix()).unwrap_or(network);
        Self(normalized)
    }

    /// Full-length block covering exactly one address
    pub fn host(addr: IpAddr) -> Self {
        Self(IpNetwork::from(addr))
    }

    pub const fn network(&self) -> IpNetwork {
        self.0
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }
}

impl fmt::Display for NetworkBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkBlock {
    type Err = ParseError;

    /// Parses `addr/prefix`, or a bare address as a host block.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError {
            token: s.to_string(),
        };

        if let Some((_, prefix)) = s.split_once('/') {
            // ipnetwork tolerates a sign on the prefix length
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            let network = s.parse::<IpNetwork>().map_err(|_| err())?;
            Ok(Self::new(network))
        } else {
            let addr = s.parse::<IpAddr>().map_err(|_| err())?;
            Ok(Self::host(addr))
        }
    }
}

impl TryFrom<String> for NetworkBlock {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetworkBlock> for String {
    fn from(block: NetworkBlock) -> Self {
        block.to_string()
    }
}

/// Parsed ingress allowlist
///
/// Blocks and ranges each keep their input order, but the interleaving
/// between the two kinds is not kept: every block is matched before any range.
/// An empty allowlist is meaningful and rejects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowlist {
    #[serde(default)]
    pub networks: Vec<NetworkBlock>,
    #[serde(default)]
    pub ranges: Vec<AddressRange>,
}

impl Allowlist {
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() && self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len() + self.ranges.len()
    }
}

impl fmt::Display for Allowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .networks
            .iter()
            .map(ToString::to_string)
            .chain(self.ranges.iter().map(ToString::to_string))
            .collect();
        write!(f, "[{}]", entries.join(", "))
    }
}

/// Parses an allowlist specification.
///
/// Returns `Ok(None)` for an empty string, which means filtering is disabled
/// for the interface. Each token is tried as a CIDR block or bare address
/// first, then as a range.
///
/// # Errors
///
/// Returns the first token that is neither a block nor a range. No partial
/// allowlist is ever returned.
pub fn parse(spec: &str) -> Result<Option<Allowlist>, ParseError> {
    if spec.is_empty() {
        return Ok(None);
    }

    let mut allowlist = Allowlist::default();
    for token in spec.split(',').map(str::trim) {
        if let Ok(block) = token.parse::<NetworkBlock>() {
            allowlist.networks.push(block);
        } else if let Ok(range) = token.parse::<AddressRange>() {
            allowlist.ranges.push(range);
        } else {
            return Err(ParseError {
                token: token.to_string(),
            });
        }
    }

    Ok(Some(allowlist))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn block(s: &str) -> NetworkBlock {
        s.parse().unwrap()
    }

    #[test]
    fn test_bare_address_becomes_host_block() {
        let allowlist = parse("10.0.0.1").unwrap().unwrap();
        assert_eq!(allowlist.networks, vec![block("10.0.0.1/32")]);
        assert!(allowlist.ranges.is_empty());
        assert_eq!(allowlist.networks[0].to_string(), "10.0.0.1/32");
    }

    #[test]
    fn test_bare_ipv6_address_uses_full_prefix() {
        let allowlist = parse("2001:db8::1").unwrap().unwrap();
        assert_eq!(allowlist.networks[0].prefix(), 128);
    }

    #[test]
    fn test_cidr_and_range_with_whitespace() {
        let allowlist = parse("10.0.0.0/24, 192.168.1.1-192.168.1.10")
            .unwrap()
            .unwrap();
        assert_eq!(allowlist.networks, vec![block("10.0.0.0/24")]);
        assert_eq!(
            allowlist.ranges,
            vec![AddressRange::new(
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            )]
        );
    }

    #[test]
    fn test_range_endpoints_are_trimmed() {
        let allowlist = parse("  10.0.0.1 - 10.0.0.9  ").unwrap().unwrap();
        assert_eq!(allowlist.ranges[0].to_string(), "10.0.0.1-10.0.0.9");
    }

    #[test]
    fn test_cidr_is_normalized_to_network_address() {
        let allowlist = parse("10.0.0.5/24").unwrap().unwrap();
        assert_eq!(allowlist.networks[0].to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_empty_spec_disables_filtering() {
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn test_whitespace_only_spec_is_an_error() {
        let err = parse("   ").unwrap_err();
        assert_eq!(err.token, "");
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = parse("not-an-address").unwrap_err();
        assert_eq!(err.token, "not-an-address");
    }

    #[test]
    fn test_one_bad_token_rejects_everything() {
        let err = parse("10.0.0.1, 10.0.0.0/24, bogus, 10.0.0.2-10.0.0.3").unwrap_err();
        assert_eq!(err.token, "bogus");
    }

    #[test]
    fn test_range_needs_exactly_two_parts() {
        assert!(parse("10.0.0.1-10.0.0.2-10.0.0.3").is_err());
        assert!(parse("10.0.0.1-").is_err());
        assert!(parse("-10.0.0.1").is_err());
    }

    #[test]
    fn test_bad_prefix_is_rejected() {
        let err = parse("10.0.0.0/33").unwrap_err();
        assert_eq!(err.token, "10.0.0.0/33");

        for token in ["10.0.0.0/+24", "10.0.0.0/-8", "10.0.0.0/", "10.0.0.0/ 24", "10.0.0.0/2a"] {
            assert_eq!(parse(token).unwrap_err().token, token);
        }
    }

    #[test]
    fn test_trailing_comma_is_rejected() {
        assert!(parse("10.0.0.1,").is_err());
    }

    #[test]
    fn test_kind_order_is_not_interleaved() {
        let allowlist = parse("10.0.0.1-10.0.0.2, 10.1.0.0/16, 10.2.0.1-10.2.0.2, 10.3.0.1")
            .unwrap()
            .unwrap();
        assert_eq!(
            allowlist.to_string(),
            "[10.1.0.0/16, 10.3.0.1/32, 10.0.0.1-10.0.0.2, 10.2.0.1-10.2.0.2]"
        );
    }

    #[test]
    fn test_mixed_family_range_is_accepted() {
        let range: AddressRange = "10.0.0.1-::1".parse().unwrap();
        assert_eq!(range.from(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(range.to(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn test_allowlist_json_uses_string_forms() {
        let allowlist = parse("10.0.0.0/8,1.1.1.1-1.1.1.2").unwrap().unwrap();
        let json = serde_json::to_value(&allowlist).unwrap();
        assert_eq!(json["networks"][0], "10.0.0.0/8");
        assert_eq!(json["ranges"][0], "1.1.1.1-1.1.1.2");

        let back: Allowlist = serde_json::from_value(json).unwrap();
        assert_eq!(back, allowlist);
    }

    #[test]
    fn test_deserialized_block_is_normalized() {
        let allowlist: Allowlist =
            serde_json::from_str(r#"{"networks": ["10.0.0.5/24", "192.0.2.7"]}"#).unwrap();
        assert_eq!(allowlist.networks[0].to_string(), "10.0.0.0/24");
        assert_eq!(allowlist.networks[1].to_string(), "192.0.2.7/32");

        assert!(serde_json::from_str::<NetworkBlock>(r#""10.0.0.0/+24""#).is_err());
    }

    #[test]
    fn test_len_and_is_empty() {
        let allowlist = parse("10.0.0.1, 10.0.0.2-10.0.0.3").unwrap().unwrap();
        assert_eq!(allowlist.len(), 2);
        assert!(!allowlist.is_empty());
        assert!(Allowlist::default().is_empty());
    }
}
