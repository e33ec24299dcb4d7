use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::io::Write;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

/// RFC 6733 Address format: a 2-octet Address Family (IANA AddressFamilyNumbers)
/// followed by the address itself. Only the two families the base protocol
/// and its applications actually use are implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    IPv4(Ipv4Addr),
    IPv6(Ipv6Addr),
}

const FAMILY_IPV4: u16 = 1;
const FAMILY_IPV6: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(Value);

impl Address {
    pub fn new(value: Value) -> Address {
        Address(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn ip(&self) -> IpAddr {
        match self.0 {
            Value::IPv4(v) => IpAddr::V4(v),
            Value::IPv6(v) => IpAddr::V6(v),
        }
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<Address> {
        let mut fam = [0u8; 2];
        reader.read_exact(&mut fam)?;
        let family = u16::from_be_bytes(fam);

        match family {
            FAMILY_IPV4 => {
                if len != 6 {
                    return Err(Error::DecodeError("invalid IPv4 Address AVP length".into()));
                }
                let mut b = [0u8; 4];
                reader.read_exact(&mut b)?;
                Ok(Address(Value::IPv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))))
            }
            FAMILY_IPV6 => {
                if len != 18 {
                    return Err(Error::DecodeError("invalid IPv6 Address AVP length".into()));
                }
                let mut b = [0u8; 16];
                reader.read_exact(&mut b)?;
                let mut segs = [0u16; 8];
                for (i, seg) in segs.iter_mut().enumerate() {
                    *seg = u16::from_be_bytes([b[2 * i], b[2 * i + 1]]);
                }
                Ok(Address(Value::IPv6(Ipv6Addr::new(
                    segs[0], segs[1], segs[2], segs[3], segs[4], segs[5], segs[6], segs[7],
                ))))
            }
            other => Err(Error::DecodeError(format!(
                "unsupported address family {}",
                other
            ))),
        }
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self.0 {
            Value::IPv4(v) => {
                writer.write_all(&FAMILY_IPV4.to_be_bytes())?;
                writer.write_all(&v.octets())?;
            }
            Value::IPv6(v) => {
                writer.write_all(&FAMILY_IPV6.to_be_bytes())?;
                writer.write_all(&v.octets())?;
            }
        }
        Ok(())
    }

    pub fn length(&self) -> u32 {
        match self.0 {
            Value::IPv4(_) => 2 + 4,
            Value::IPv6(_) => 2 + 16,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_ipv4() {
        let avp = Address::new(Value::IPv4(Ipv4Addr::new(127, 0, 0, 1)));
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = Cursor::new(&encoded);
        let avp = Address::decode_from(&mut cursor, encoded.len() - 2).unwrap();
        assert_eq!(avp.value(), &Value::IPv4(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn test_encode_decode_ipv6() {
        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let avp = Address::new(Value::IPv6(ip));
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = Cursor::new(&encoded);
        let avp = Address::decode_from(&mut cursor, encoded.len() - 2).unwrap();
        assert_eq!(avp.value(), &Value::IPv6(ip));
    }

    #[test]
    fn test_decode_unknown_family() {
        let bytes = [0x00, 0x09, 0xaa];
        let mut cursor = Cursor::new(&bytes);
        assert!(Address::decode_from(&mut cursor, 1).is_err());
    }
}
