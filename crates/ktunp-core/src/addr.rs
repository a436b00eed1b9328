//! Dotted-decimal IPv4 parsing.
//!
//! `in_aton` is deliberately permissive: group values are not range
//! checked. Each group is OR-packed into the running value after an 8-bit
//! shift, so an over-range group (`"999.1.1.1"`) spills into the
//! neighbouring octet and the result is truncated to 32 bits. Parsing stops
//! at NUL or end of input; a newline ends the current group only.
//! Input bytes are taken as signed: a byte at or above 0x80 contributes a
//! negative digit, which sets every high bit of its group value.
//!
//! The unspecified address is the "invalid" sentinel: `"0.0.0.0"` and a
//! malformed literal both yield `NetAddr::UNSPECIFIED`.

use core::fmt;
use std::net::Ipv4Addr;

use crate::error::ParseError;

/// An IPv4 address held in network byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetAddr(u32);

impl NetAddr {
    /// `0.0.0.0`, doubling as the parse-failure sentinel.
    pub const UNSPECIFIED: NetAddr = NetAddr(0);

    /// Wrap raw network-order bits (as read from the wire).
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        NetAddr(raw)
    }

    /// Build from a host-order value (`a << 24 | b << 16 | c << 8 | d`).
    #[inline]
    pub const fn from_host(host: u32) -> Self {
        NetAddr(host.to_be())
    }

    #[inline]
    pub const fn from_octets(octets: [u8; 4]) -> Self {
        NetAddr(u32::from_ne_bytes(octets))
    }

    /// Raw network-order bits.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Octets, most-significant first.
    #[inline]
    pub const fn octets(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }

    #[inline]
    pub const fn is_unspecified(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl fmt::Debug for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddr({})", self)
    }
}

impl From<Ipv4Addr> for NetAddr {
    fn from(addr: Ipv4Addr) -> Self {
        NetAddr::from_octets(addr.octets())
    }
}

impl From<NetAddr> for Ipv4Addr {
    fn from(addr: NetAddr) -> Self {
        Ipv4Addr::from(addr.octets())
    }
}

/// Result of the raw scan: packed host-order value and dots consumed.
fn scan(input: &[u8]) -> (u32, u32) {
    let at = |p: usize| -> u8 { input.get(p).copied().unwrap_or(0) };

    let mut packed: u32 = 0;
    let mut dots = 0u32;
    let mut p = 0usize;

    for _ in 0..4 {
        packed <<= 8;
        if at(p) == 0 {
            continue;
        }
        let mut val: u32 = 0;
        while !matches!(at(p), 0 | b'.' | b'\n') {
            let digit = i32::from(at(p) as i8) - i32::from(b'0');
            val = val.wrapping_mul(10).wrapping_add(digit as u32);
            p += 1;
        }
        if at(p) == b'.' {
            dots += 1;
        }
        packed |= val;
        if at(p) != 0 {
            p += 1;
        }
    }

    (packed, dots)
}

/// Convert a dotted-decimal literal into a network-order address.
///
/// Returns `NetAddr::UNSPECIFIED` unless exactly three dots were consumed.
pub fn in_aton(input: &[u8]) -> NetAddr {
    let (packed, dots) = scan(input);
    if dots != 3 {
        return NetAddr::UNSPECIFIED;
    }
    NetAddr::from_host(packed)
}

/// Like `in_aton`, but reports why the literal was rejected.
///
/// A literal that packs to zero (including `"0.0.0.0"`) is `Unspecified`:
/// it cannot be told apart from a failed parse.
pub fn parse(input: &[u8]) -> Result<NetAddr, ParseError> {
    let (packed, dots) = scan(input);
    if dots != 3 {
        return Err(ParseError::SegmentCount(dots));
    }
    if packed == 0 {
        return Err(ParseError::Unspecified);
    }
    Ok(NetAddr::from_host(packed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_literals() {
        assert_eq!(in_aton(b"10.0.0.5").octets(), [10, 0, 0, 5]);
        assert_eq!(in_aton(b"192.0.2.1").octets(), [192, 0, 2, 1]);
        assert_eq!(in_aton(b"255.255.255.255").octets(), [255; 4]);
        assert_eq!(in_aton(b"1.2.3.4"), NetAddr::from(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_trailing_newline_and_nul() {
        assert_eq!(in_aton(b"10.0.0.5\n").octets(), [10, 0, 0, 5]);
        assert_eq!(in_aton(b"10.0.0.5\0garbage").octets(), [10, 0, 0, 5]);
    }

    #[test]
    fn test_wrong_dot_count() {
        assert_eq!(in_aton(b"1.2.3"), NetAddr::UNSPECIFIED);
        assert_eq!(in_aton(b"1.2.3.4.5"), NetAddr::UNSPECIFIED);
        assert_eq!(in_aton(b""), NetAddr::UNSPECIFIED);
        assert_eq!(in_aton(b"10"), NetAddr::UNSPECIFIED);

        assert_eq!(parse(b"1.2.3"), Err(ParseError::SegmentCount(2)));
        assert_eq!(parse(b"1.2.3.4.5"), Err(ParseError::SegmentCount(4)));
        assert_eq!(parse(b""), Err(ParseError::SegmentCount(0)));
    }

    #[test]
    fn test_zero_is_sentinel() {
        assert_eq!(in_aton(b"0.0.0.0"), NetAddr::UNSPECIFIED);
        assert_eq!(parse(b"0.0.0.0"), Err(ParseError::Unspecified));
        assert_eq!(parse(b"0.0.0.0\n"), Err(ParseError::Unspecified));
    }

    #[test]
    fn test_over_range_groups_are_lossy() {
        // 999 = 0x3e7: low byte kept, high bits shifted out.
        assert_eq!(in_aton(b"999.1.1.1").octets(), [231, 1, 1, 1]);
        assert_eq!(in_aton(b"256.1.1.1").octets(), [0, 1, 1, 1]);
        // 300 = 0x12c: bit 8 spills into the third octet.
        assert_eq!(in_aton(b"1.1.2.300").octets(), [1, 1, 3, 44]);
    }

    #[test]
    fn test_non_digits_not_rejected() {
        // 'a' - '0' == 49
        assert_eq!(in_aton(b"a.a.a.a").octets(), [49, 49, 49, 49]);
    }

    #[test]
    fn test_high_bytes_are_signed() {
        // 0xc0 as i8 is -64; -64 - '0' == -112 == 0xffffff90.
        assert_eq!(in_aton(b"1.1.1.\xc0").octets(), [255, 255, 255, 144]);
        // Earlier groups have their high bits shifted out.
        assert_eq!(in_aton(b"\xc0.1.1.1").octets(), [144, 1, 1, 1]);
        assert_eq!(parse(b"1.1.1.\xc0"), Ok(NetAddr::from_host(0xffff_ff90)));
    }

    #[test]
    fn test_display_and_conversions() {
        let addr = NetAddr::from_octets([192, 0, 2, 1]);
        assert_eq!(addr.to_string(), "192.0.2.1");
        assert_eq!(Ipv4Addr::from(addr), Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(NetAddr::from_host(0xc000_0201), addr);
        assert_eq!(NetAddr::from_raw(addr.raw()), addr);
        assert!(NetAddr::UNSPECIFIED.is_unspecified());
        assert!(!addr.is_unspecified());
    }
}
