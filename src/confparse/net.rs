//! Network address argument parsers.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::ArgError;

/// A 48-bit Ethernet address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EtherAddr(pub [u8; 6]);

impl EtherAddr {
    pub fn is_broadcast(self) -> bool {
        self.0 == [0xff; 6]
    }
}

impl fmt::Display for EtherAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ArgError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ArgError::Expected("IP address"))
}

/// Parse an IPv6 address in standard textual form.
pub fn parse_ipv6(s: &str) -> Result<Ipv6Addr, ArgError> {
    s.trim()
        .parse::<Ipv6Addr>()
        .map_err(|_| ArgError::Expected("IPv6 address"))
}

/// Parse an IPv4 prefix: `addr/len` (CIDR) or `addr/netmask`. With
/// `allow_bare`, a bare address means a /32 host prefix.
pub fn parse_ip_prefix(s: &str, allow_bare: bool) -> Result<(Ipv4Addr, u8), ArgError> {
    let s = s.trim();
    match s.split_once('/') {
        None if allow_bare => Ok((parse_ipv4(s)?, 32)),
        None => Err(ArgError::Expected("IP prefix")),
        Some((addr, mask)) => {
            let addr = parse_ipv4(addr)?;
            if let Ok(len) = mask.trim().parse::<u8>() {
                if len > 32 {
                    return Err(ArgError::OutOfRange("prefix length"));
                }
                return Ok((addr, len));
            }
            let mask = parse_ipv4(mask)?;
            let bits = u32::from(mask);
            // require a contiguous leading-ones mask
            let len = bits.leading_ones() as u8;
            if bits != prefix_mask(len) {
                return Err(ArgError::Expected("netmask"));
            }
            Ok((addr, len))
        }
    }
}

fn prefix_mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

/// Parse a colon-separated Ethernet address; single hex digits are
/// accepted per byte (`0:a:b:1:2:3`).
pub fn parse_ethernet(s: &str) -> Result<EtherAddr, ArgError> {
    let mut out = [0u8; 6];
    let mut parts = s.trim().split(':');
    for slot in out.iter_mut() {
        let part = parts.next().ok_or(ArgError::Expected("Ethernet address"))?;
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ArgError::Expected("Ethernet address"));
        }
        *slot = u8::from_str_radix(part, 16).map_err(|_| ArgError::Expected("Ethernet address"))?;
    }
    if parts.next().is_some() {
        return Err(ArgError::Trailing("Ethernet address"));
    }
    Ok(EtherAddr(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4() {
        assert_eq!(parse_ipv4("10.0.0.1").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(parse_ipv4("10.0.0.256").is_err());
    }

    #[test]
    fn test_prefix_forms() {
        assert_eq!(
            parse_ip_prefix("10.0.0.0/8", false).unwrap(),
            (Ipv4Addr::new(10, 0, 0, 0), 8)
        );
        assert_eq!(
            parse_ip_prefix("10.0.0.0/255.255.255.0", false).unwrap(),
            (Ipv4Addr::new(10, 0, 0, 0), 24)
        );
        assert_eq!(
            parse_ip_prefix("10.1.2.3", true).unwrap(),
            (Ipv4Addr::new(10, 1, 2, 3), 32)
        );
        assert!(parse_ip_prefix("10.0.0.0/255.0.255.0", false).is_err());
        assert!(parse_ip_prefix("10.0.0.0/33", false).is_err());
    }

    #[test]
    fn test_ethernet() {
        assert_eq!(
            parse_ethernet("00:1a:2B:3c:4D:5e").unwrap(),
            EtherAddr([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])
        );
        assert_eq!(
            parse_ethernet("0:a:b:1:2:3").unwrap(),
            EtherAddr([0, 0xa, 0xb, 1, 2, 3])
        );
        assert!(parse_ethernet("00:11:22:33:44").is_err());
        assert!(parse_ethernet("00:11:22:33:44:55:66").is_err());
    }

    #[test]
    fn test_ethernet_display() {
        let e = EtherAddr([0, 1, 2, 0xaa, 0xbb, 0xcc]);
        assert_eq!(e.to_string(), "00:01:02:aa:bb:cc");
    }

    #[test]
    fn test_ipv6() {
        assert!(parse_ipv6("::1").is_ok());
        assert!(parse_ipv6("fe80::/10").is_err());
    }
}
