//! Codecs for `inet` and `cidr` values.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::{utf8, DecodeContext, DecodeError, Value};

/// Address family bytes from `utils/inet.h`.
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// A host address with an optional network prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inet {
    pub addr: IpAddr,
    pub prefix: u8,
}

/// A network address, the bits right of the prefix are zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl std::fmt::Display for Inet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn host_bits_zero(addr: &IpAddr, prefix: u8) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from_be_bytes(v4.octets());
            prefix >= 32 || bits & (u32::MAX >> prefix) == 0
        }
        IpAddr::V6(v6) => {
            let bits = u128::from_be_bytes(v6.octets());
            prefix >= 128 || bits & (u128::MAX >> prefix) == 0
        }
    }
}

fn parse_text(buf: &[u8], r#type: &'static str) -> Result<(IpAddr, Option<u8>), DecodeError> {
    let err = || DecodeError::invalid(r#type);
    let text = utf8(buf)?;
    let (addr, prefix) = match text.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix.parse().map_err(|_| err())?)),
        None => (text, None),
    };
    let addr: IpAddr = addr.parse().map_err(|_| err())?;
    if prefix.is_some_and(|p| p > max_prefix(&addr)) {
        return Err(err());
    }
    Ok((addr, prefix))
}

fn parse_bin(
    buf: &[u8],
    r#type: &'static str,
    expect_cidr: bool,
) -> Result<(IpAddr, u8), DecodeError> {
    let err = || DecodeError::invalid(r#type);
    let [family, prefix, is_cidr, addr_len, addr @ ..] = buf else {
        return Err(DecodeError::length(r#type, buf.len()));
    };
    if *is_cidr != expect_cidr as u8 {
        return Err(err());
    }
    let addr: IpAddr = match (*family, *addr_len, addr) {
        (PGSQL_AF_INET, 4, &[a, b, c, d]) => Ipv4Addr::new(a, b, c, d).into(),
        (PGSQL_AF_INET6, 16, addr) => match <[u8; 16]>::try_from(addr) {
            Ok(octets) => Ipv6Addr::from(octets).into(),
            Err(_) => return Err(err()),
        },
        _ => return Err(err()),
    };
    if *prefix > max_prefix(&addr) {
        return Err(err());
    }
    Ok((addr, *prefix))
}

pub(crate) fn inet_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let (addr, prefix) = parse_text(buf, "inet")?;
    Ok(Value::Inet(Inet { addr, prefix: prefix.unwrap_or(max_prefix(&addr)) }))
}

pub(crate) fn inet_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let (addr, prefix) = parse_bin(buf, "inet", false)?;
    Ok(Value::Inet(Inet { addr, prefix }))
}

pub(crate) fn cidr_text(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let (addr, prefix) = parse_text(buf, "cidr")?;
    let prefix = prefix.unwrap_or(max_prefix(&addr));
    match host_bits_zero(&addr, prefix) {
        true => Ok(Value::Cidr(Cidr { addr, prefix })),
        false => Err(DecodeError::invalid("cidr")),
    }
}

pub(crate) fn cidr_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let (addr, prefix) = parse_bin(buf, "cidr", true)?;
    match host_bits_zero(&addr, prefix) {
        true => Ok(Value::Cidr(Cidr { addr, prefix })),
        false => Err(DecodeError::invalid("cidr")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    #[test]
    fn inet_text_default_prefix() {
        let Value::Inet(inet) = inet_text(&ctx(), b"192.168.1.5").unwrap() else { panic!() };
        assert_eq!(inet.prefix, 32);
        let Value::Inet(inet) = inet_text(&ctx(), b"::1").unwrap() else { panic!() };
        assert_eq!(inet.prefix, 128);
        assert!(inet_text(&ctx(), b"192.168.1.5/33").is_err());
    }

    #[test]
    fn inet_binary() {
        let wire = [PGSQL_AF_INET, 24, 0, 4, 10, 0, 0, 1];
        let Value::Inet(inet) = inet_bin(&ctx(), &wire).unwrap() else { panic!() };
        assert_eq!(inet.to_string(), "10.0.0.1/24");
        // cidr flag set on an inet value
        let wire = [PGSQL_AF_INET, 24, 1, 4, 10, 0, 0, 1];
        assert!(inet_bin(&ctx(), &wire).is_err());
    }

    #[test]
    fn cidr_rejects_host_bits() {
        assert!(cidr_text(&ctx(), b"192.168.1.0/24").is_ok());
        assert!(cidr_text(&ctx(), b"192.168.1.5/24").is_err());
        let wire = [PGSQL_AF_INET, 24, 1, 4, 192, 168, 1, 5];
        assert!(cidr_bin(&ctx(), &wire).is_err());
    }
}
