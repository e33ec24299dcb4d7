use crate::avp::OctetString;
use crate::error::Result;
use std::fmt;
use std::io::Read;
use std::io::Write;

/// DiameterIdentity: a FQDN-shaped OctetString, compared case-insensitively
/// during CER/CEA election (RFC 6733 section 5.6.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(OctetString);

impl Identity {
    pub fn new(value: impl Into<Vec<u8>>) -> Identity {
        Identity(OctetString::new(value))
    }

    pub fn value(&self) -> &[u8] {
        self.0.value()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.value()).unwrap_or("")
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<Identity> {
        let inner = OctetString::decode_from(reader, len)?;
        Ok(Identity(inner))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.0.encode_to(writer)
    }

    pub fn length(&self) -> u32 {
        self.0.length()
    }

    /// Case-insensitive ordering used by the election algorithm.
    pub fn election_cmp(&self, other: &Identity) -> std::cmp::Ordering {
        self.as_str().to_ascii_lowercase().cmp(&other.as_str().to_ascii_lowercase())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_ascii() {
        let bytes = b"example.com";
        let avp = Identity::new(bytes.to_vec());
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = Cursor::new(&encoded);
        let avp = Identity::decode_from(&mut cursor, bytes.len()).unwrap();
        assert_eq!(avp.value(), bytes);
        assert_eq!(avp.as_str(), "example.com");
    }

    #[test]
    fn test_election_cmp_case_insensitive() {
        let a = Identity::new(b"Host-A.example.com".to_vec());
        let b = Identity::new(b"host-b.example.com".to_vec());
        assert_eq!(a.election_cmp(&b), std::cmp::Ordering::Less);

        let a = Identity::new(b"HOST.example.com".to_vec());
        let b = Identity::new(b"host.example.com".to_vec());
        assert_eq!(a.election_cmp(&b), std::cmp::Ordering::Equal);
    }
}
