/*
 * AVP format:
 *   0                   1                   2                   3
 *   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                         Command-Code                          |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |  Flags       |                 AVP Length                     |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                         Vendor ID (optional)                  |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                             Data                              |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                             Data             |    Padding     |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *
 * AVP Flags:
 *   0 1 2 3 4 5 6 7
 *  +-+-+-+-+-+-+-+-+  V(endor), M(andatory), P(rivate)
 *  |V M P r r r r r|  r(eserved)
 *  +-+-+-+-+-+-+-+-+
 *
 */

pub mod address;
pub mod enumerated;
pub mod flags;
pub mod float32;
pub mod float64;
pub mod group;
pub mod identity;
pub mod integer32;
pub mod integer64;
pub mod octetstring;
pub mod time;
pub mod unsigned32;
pub mod unsigned64;
pub mod uri;
pub mod utf8string;

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use core::fmt;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::sync::Arc;

use self::address::Address;
use self::enumerated::Enumerated;
use self::float32::Float32;
use self::float64::Float64;
use self::group::Grouped;
use self::identity::Identity;
use self::integer32::Integer32;
use self::integer64::Integer64;
use self::time::Time;
use self::unsigned32::Unsigned32;
use self::unsigned64::Unsigned64;
use self::uri::DiameterURI;
use self::utf8string::UTF8String;

pub use self::octetstring::OctetString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpType {
    Unknown,
    Address,
    Identity,
    DiameterURI,
    Enumerated,
    Float32,
    Float64,
    Grouped,
    Integer32,
    Integer64,
    OctetString,
    Time,
    Unsigned32,
    Unsigned64,
    UTF8String,
}

#[derive(Debug, Clone)]
pub enum AvpValue {
    Address(Address),
    Identity(Identity),
    DiameterURI(DiameterURI),
    Enumerated(Enumerated),
    Float32(Float32),
    Float64(Float64),
    Grouped(Grouped),
    Integer32(Integer32),
    Integer64(Integer64),
    OctetString(OctetString),
    Time(Time),
    Unsigned32(Unsigned32),
    Unsigned64(Unsigned64),
    UTF8String(UTF8String),
}

impl fmt::Display for AvpValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AvpValue::Address(v) => v.fmt(f),
            AvpValue::Float32(v) => v.fmt(f),
            AvpValue::Float64(v) => v.fmt(f),
            AvpValue::Enumerated(v) => v.fmt(f),
            AvpValue::Grouped(v) => v.fmt(f),
            AvpValue::Integer32(v) => v.fmt(f),
            AvpValue::Integer64(v) => v.fmt(f),
            AvpValue::Unsigned32(v) => v.fmt(f),
            AvpValue::Unsigned64(v) => v.fmt(f),
            AvpValue::UTF8String(v) => v.fmt(f),
            AvpValue::OctetString(v) => v.fmt(f),
            AvpValue::Identity(v) => v.fmt(f),
            AvpValue::DiameterURI(v) => v.fmt(f),
            AvpValue::Time(v) => v.fmt(f),
        }
    }
}

impl AvpValue {
    pub fn length(&self) -> u32 {
        match self {
            AvpValue::Address(v) => v.length(),
            AvpValue::Float32(v) => v.length(),
            AvpValue::Float64(v) => v.length(),
            AvpValue::Enumerated(v) => v.length(),
            AvpValue::Grouped(v) => v.length(),
            AvpValue::Integer32(v) => v.length(),
            AvpValue::Integer64(v) => v.length(),
            AvpValue::Unsigned32(v) => v.length(),
            AvpValue::Unsigned64(v) => v.length(),
            AvpValue::UTF8String(v) => v.length(),
            AvpValue::OctetString(v) => v.length(),
            AvpValue::Identity(v) => v.length(),
            AvpValue::DiameterURI(v) => v.length(),
            AvpValue::Time(v) => v.length(),
        }
    }

    pub fn get_type_name(&self) -> &'static str {
        match self {
            AvpValue::Address(_) => "Address",
            AvpValue::Float32(_) => "Float32",
            AvpValue::Float64(_) => "Float64",
            AvpValue::Enumerated(_) => "Enumerated",
            AvpValue::Grouped(_) => "Grouped",
            AvpValue::Integer32(_) => "Integer32",
            AvpValue::Integer64(_) => "Integer64",
            AvpValue::Unsigned32(_) => "Unsigned32",
            AvpValue::Unsigned64(_) => "Unsigned64",
            AvpValue::UTF8String(_) => "UTF8String",
            AvpValue::OctetString(_) => "OctetString",
            AvpValue::Identity(_) => "Identity",
            AvpValue::DiameterURI(_) => "DiameterURI",
            AvpValue::Time(_) => "Time",
        }
    }
}

macro_rules! impl_from_avp_value {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for AvpValue {
            fn from(v: $ty) -> Self {
                AvpValue::$variant(v)
            }
        }
    };
}

impl_from_avp_value!(Address, Address);
impl_from_avp_value!(Identity, Identity);
impl_from_avp_value!(DiameterURI, DiameterURI);
impl_from_avp_value!(Enumerated, Enumerated);
impl_from_avp_value!(Float32, Float32);
impl_from_avp_value!(Float64, Float64);
impl_from_avp_value!(Grouped, Grouped);
impl_from_avp_value!(Integer32, Integer32);
impl_from_avp_value!(Integer64, Integer64);
impl_from_avp_value!(OctetString, OctetString);
impl_from_avp_value!(Time, Time);
impl_from_avp_value!(Unsigned32, Unsigned32);
impl_from_avp_value!(Unsigned64, Unsigned64);
impl_from_avp_value!(UTF8String, UTF8String);

#[derive(Debug, Clone)]
pub struct Avp {
    header: AvpHeader,
    value: AvpValue,
    padding: u8,
}

#[derive(Debug, Clone)]
pub struct AvpHeader {
    code: u32,
    flags: AvpFlags,
    length: u32,
    vendor_id: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvpFlags {
    pub vendor: bool,
    pub mandatory: bool,
    pub private: bool,
}

impl AvpFlags {
    pub fn from_bits(b: u8) -> AvpFlags {
        AvpFlags {
            vendor: (b & flags::V) != 0,
            mandatory: (b & flags::M) != 0,
            private: (b & flags::P) != 0,
        }
    }

    pub fn to_bits(self) -> u8 {
        let mut b = 0u8;
        if self.vendor {
            b |= flags::V;
        }
        if self.mandatory {
            b |= flags::M;
        }
        if self.private {
            b |= flags::P;
        }
        b
    }
}

impl AvpHeader {
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<AvpHeader> {
        let mut b = [0; 8];
        reader.read_exact(&mut b)?;

        let code = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let raw_flags = b[4];
        let flags = AvpFlags::from_bits(raw_flags);
        let length = u32::from_be_bytes([0, b[5], b[6], b[7]]);

        if flags.vendor {
            let mut b = [0; 4];
            reader.read_exact(&mut b)?;
            let vendor_id = u32::from_be_bytes(b);

            Ok(AvpHeader {
                code,
                flags,
                length,
                vendor_id: Some(vendor_id),
            })
        } else {
            Ok(AvpHeader {
                code,
                flags,
                length,
                vendor_id: None,
            })
        }
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.code.to_be_bytes())?;
        writer.write_all(&[self.flags.to_bits()])?;
        writer.write_all(&self.length.to_be_bytes()[1..4])?;

        if let Some(vendor_id) = self.vendor_id {
            writer.write_all(&vendor_id.to_be_bytes())?;
        }

        Ok(())
    }
}

impl Avp {
    /// `flags` is the raw `V M P r r r r r` octet; the vendor bit is
    /// overridden by whether `vendor_id` is `Some`.
    pub fn new(code: u32, vendor_id: Option<u32>, flags: u8, value: AvpValue) -> Avp {
        let mut avp_flags = AvpFlags::from_bits(flags);
        avp_flags.vendor = vendor_id.is_some();

        let header_length = if vendor_id.is_some() { 12 } else { 8 };
        let padding = Avp::pad_to_32_bits(value.length());
        let header = AvpHeader {
            code,
            flags: avp_flags,
            length: header_length + value.length(),
            vendor_id,
        };
        Avp {
            header,
            value,
            padding,
        }
    }

    pub fn get_code(&self) -> u32 {
        self.header.code
    }

    pub fn get_flags(&self) -> &AvpFlags {
        &self.header.flags
    }

    pub fn get_vendor_id(&self) -> Option<u32> {
        self.header.vendor_id
    }

    pub fn get_length(&self) -> u32 {
        self.header.length
    }

    pub fn get_padding(&self) -> u8 {
        self.padding
    }

    pub fn get_value(&self) -> &AvpValue {
        &self.value
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R, dict: Arc<Dictionary>) -> Result<Avp> {
        let header = AvpHeader::decode_from(reader)?;

        let header_length = if header.flags.vendor { 12 } else { 8 };
        let value_length = header.length.saturating_sub(header_length) as usize;

        let avp_type = dict
            .get_avp_type(header.code, header.vendor_id)
            .unwrap_or(AvpType::Unknown);

        let value = match avp_type {
            AvpType::Address => AvpValue::Address(Address::decode_from(reader, value_length)?),
            AvpType::Float32 => AvpValue::Float32(Float32::decode_from(reader)?),
            AvpType::Float64 => AvpValue::Float64(Float64::decode_from(reader)?),
            AvpType::Enumerated => AvpValue::Enumerated(Enumerated::decode_from(reader)?),
            AvpType::Grouped => {
                AvpValue::Grouped(Grouped::decode_from(reader, value_length, Arc::clone(&dict))?)
            }
            AvpType::Integer32 => AvpValue::Integer32(Integer32::decode_from(reader)?),
            AvpType::Integer64 => AvpValue::Integer64(Integer64::decode_from(reader)?),
            AvpType::Unsigned32 => AvpValue::Unsigned32(Unsigned32::decode_from(reader)?),
            AvpType::Unsigned64 => AvpValue::Unsigned64(Unsigned64::decode_from(reader)?),
            AvpType::UTF8String => AvpValue::UTF8String(UTF8String::decode_from(reader, value_length)?),
            AvpType::OctetString => {
                AvpValue::OctetString(OctetString::decode_from(reader, value_length)?)
            }
            AvpType::Identity => AvpValue::Identity(Identity::decode_from(reader, value_length)?),
            AvpType::DiameterURI => {
                AvpValue::DiameterURI(DiameterURI::decode_from(reader, value_length)?)
            }
            AvpType::Time => AvpValue::Time(Time::decode_from(reader)?),
            AvpType::Unknown => {
                AvpValue::OctetString(OctetString::decode_from(reader, value_length)?)
            }
        };

        let padding = Avp::pad_to_32_bits(value_length as u32);
        if padding > 0 {
            reader.seek(SeekFrom::Current(padding as i64))?;
        }

        Ok(Avp {
            header,
            value,
            padding,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode_to(writer)?;

        match &self.value {
            AvpValue::Address(v) => v.encode_to(writer)?,
            AvpValue::Float32(v) => v.encode_to(writer)?,
            AvpValue::Float64(v) => v.encode_to(writer)?,
            AvpValue::Enumerated(v) => v.encode_to(writer)?,
            AvpValue::Grouped(v) => v.encode_to(writer)?,
            AvpValue::Integer32(v) => v.encode_to(writer)?,
            AvpValue::Integer64(v) => v.encode_to(writer)?,
            AvpValue::Unsigned32(v) => v.encode_to(writer)?,
            AvpValue::Unsigned64(v) => v.encode_to(writer)?,
            AvpValue::UTF8String(v) => v.encode_to(writer)?,
            AvpValue::OctetString(v) => v.encode_to(writer)?,
            AvpValue::Identity(v) => v.encode_to(writer)?,
            AvpValue::DiameterURI(v) => v.encode_to(writer)?,
            AvpValue::Time(v) => v.encode_to(writer)?,
        };

        for _ in 0..self.padding {
            writer.write_all(&[0])?;
        }

        Ok(())
    }

    fn pad_to_32_bits(length: u32) -> u8 {
        ((4 - (length & 0b11)) % 4) as u8
    }

    /// Writes `  <avp-name>  <vendor>  <code>  V M P  <type>  <value>`,
    /// recursing into grouped AVPs at `depth + 1`. Falls back to the numeric
    /// code when the dictionary has no name for it.
    pub fn fmt_with_dict(
        &self,
        f: &mut fmt::Formatter<'_>,
        depth: usize,
        dict: &Dictionary,
    ) -> fmt::Result {
        let name = dict
            .get_avp_name(self.get_code(), self.get_vendor_id())
            .unwrap_or_else(|| self.get_code().to_string());
        let vendor_id = self.get_vendor_id().map(|v| v.to_string()).unwrap_or_default();
        let indent = "  ".repeat(depth + 1);

        write!(
            f,
            "{}{:<40} {:>8} {:>5}  {} {} {}  {:<16}  ",
            indent,
            name,
            vendor_id,
            self.get_code(),
            bool_mark(self.get_flags().vendor),
            bool_mark(self.get_flags().mandatory),
            bool_mark(self.get_flags().private),
            self.get_value().get_type_name(),
        )?;

        if let AvpValue::Grouped(g) = &self.get_value() {
            g.fmt(f, depth)
        } else {
            write!(f, "{}", self.get_value())
        }
    }

    pub fn get_integer32(&self) -> Option<i32> {
        match &self.value {
            AvpValue::Integer32(avp) => Some(avp.value()),
            _ => None,
        }
    }

    pub fn get_integer64(&self) -> Option<i64> {
        match &self.value {
            AvpValue::Integer64(avp) => Some(avp.value()),
            _ => None,
        }
    }

    pub fn get_unsigned32(&self) -> Option<u32> {
        match &self.value {
            AvpValue::Unsigned32(avp) => Some(avp.value()),
            _ => None,
        }
    }

    pub fn get_unsigned64(&self) -> Option<u64> {
        match &self.value {
            AvpValue::Unsigned64(avp) => Some(avp.value()),
            _ => None,
        }
    }

    pub fn get_utf8string(&self) -> Option<&str> {
        match &self.value {
            AvpValue::UTF8String(avp) => Some(avp.value()),
            _ => None,
        }
    }

    pub fn get_identity(&self) -> Option<&Identity> {
        match &self.value {
            AvpValue::Identity(avp) => Some(avp),
            _ => None,
        }
    }

    pub fn get_grouped(&self) -> Option<&Grouped> {
        match &self.value {
            AvpValue::Grouped(avp) => Some(avp),
            _ => None,
        }
    }

    pub fn get_address(&self) -> Option<&Address> {
        match &self.value {
            AvpValue::Address(avp) => Some(avp),
            _ => None,
        }
    }

    pub fn get_enumerated(&self) -> Option<i32> {
        match &self.value {
            AvpValue::Enumerated(avp) => Some(avp.value()),
            _ => None,
        }
    }
}

fn bool_mark(v: bool) -> &'static str {
    if v {
        "\u{2713}"
    } else {
        "\u{2717}"
    }
}

#[macro_export]
macro_rules! avp {
    ($code:expr, $vendor_id:expr, $flags:expr, $value:expr) => {
        $crate::avp::Avp::new($code, $vendor_id, $flags, $value.into())
    };
    ($code:expr, $vendor_id:expr, $value:expr) => {
        $crate::avp::Avp::new($code, $vendor_id, 0, $value.into())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_encode_header() {
        let data = [
            0x00, 0x00, 0x00, 0x64, // command code
            0x40, 0x00, 0x00, 0x0C, // flags, length
        ];

        let mut cursor = Cursor::new(&data);
        let header = AvpHeader::decode_from(&mut cursor).unwrap();

        assert_eq!(header.code, 100);
        assert_eq!(header.length, 12);
        assert_eq!(header.flags.vendor, false);
        assert_eq!(header.flags.mandatory, true);
        assert_eq!(header.flags.private, false);
        assert_eq!(header.vendor_id, None);

        let mut encoded = Vec::new();
        header.encode_to(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_decode_encode_header_with_vendor() {
        let data = [
            0x00, 0x00, 0x00, 0x64, // command code
            0x80, 0x00, 0x00, 0x0C, // flags, length
            0x00, 0x00, 0x00, 0xC8, // vendor_id
        ];

        let mut cursor = Cursor::new(&data);
        let header = AvpHeader::decode_from(&mut cursor).unwrap();

        assert_eq!(header.code, 100);
        assert_eq!(header.length, 12);
        assert_eq!(header.flags.vendor, true);
        assert_eq!(header.flags.mandatory, false);
        assert_eq!(header.flags.private, false);
        assert_eq!(header.vendor_id, Some(200));

        let mut encoded = Vec::new();
        header.encode_to(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_new_sets_vendor_flag_from_vendor_id() {
        let avp = Avp::new(571, Some(10415), flags::V, Integer32::new(-3600).into());
        assert!(avp.get_flags().vendor);
        assert_eq!(avp.get_vendor_id(), Some(10415));
        assert_eq!(avp.get_length(), 12 + 4);
    }
}
