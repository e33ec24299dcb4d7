use crate::error::Result;
use std::fmt;
use std::io::Read;
use std::io::Write;

use crate::avp::OctetString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterURI(OctetString);

impl DiameterURI {
    pub fn new(value: impl Into<Vec<u8>>) -> DiameterURI {
        DiameterURI(OctetString::new(value))
    }

    pub fn value(&self) -> &[u8] {
        self.0.value()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.value()).unwrap_or("")
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<DiameterURI> {
        let avp = OctetString::decode_from(reader, len)?;
        Ok(DiameterURI(avp))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.0.encode_to(writer)
    }

    pub fn length(&self) -> u32 {
        self.0.length()
    }
}

impl fmt::Display for DiameterURI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode() {
        let avp = DiameterURI::new(b"aaa://host.example.com:3868".to_vec());
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = Cursor::new(&encoded);
        let avp = DiameterURI::decode_from(&mut cursor, encoded.len()).unwrap();
        assert_eq!(avp.as_str(), "aaa://host.example.com:3868");
    }
}
