use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use core::convert::TryInto;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::cursor::Cursor;
use crate::error::Error;
use crate::registry::DataType;

/// Template length announcing a per-occurrence length prefix (RFC 7011 Sec 7).
pub const VARIABLE_LENGTH: u16 = 65535;

/******************************** IPFIX FIELD VALUE ********************************/

/// One decoded information element value.
///
/// Every integer width decodes to the 64 bit variant of its signedness, reduced size encoding
/// makes the wire width meaningless once decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Octets(String), // hex encoded
    MacAddress(String),
    Ipv4Address(Ipv4Addr),
    Ipv6Address(Ipv6Addr),
    DateTime(DateTime<Utc>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) | FieldValue::Octets(v) | FieldValue::MacAddress(v) => f.write_str(v),
            FieldValue::Ipv4Address(v) => write!(f, "{}", v),
            FieldValue::Ipv6Address(v) => write!(f, "{}", v),
            FieldValue::DateTime(v) => f.write_str(&v.to_rfc3339()),
        }
    }
}

pub fn timestamp(secs: i64, nanos: u32) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(secs, nanos).ok_or(Error::InvalidTimestamp(secs))
}

/// Resolves the on-wire length of a field, reading the length prefix of variable length fields.
pub fn field_length(declared_length: u16, cursor: &mut Cursor) -> Result<usize, Error> {
    if declared_length == VARIABLE_LENGTH {
        cursor.read_var_length()
    } else {
        Ok(declared_length as usize)
    }
}

/// Decodes one primitive value at the cursor, advancing it past the value (and its length prefix).
pub fn decode_value(data_type: DataType, declared_length: u16, cursor: &mut Cursor) -> Result<FieldValue, Error> {
    let length = field_length(declared_length, cursor)?;
    let bytes = cursor.read_bytes(length)?;

    decode_bytes(data_type, bytes)
}

/// Decodes the exact bytes of one value.
pub fn decode_bytes(data_type: DataType, bytes: &[u8]) -> Result<FieldValue, Error> {
    let invalid_length = || Error::InvalidLength { data_type, length: bytes.len() };

    match data_type {
        // these are special because they can use reduced-size encoding (RFC 7011 Sec 6.2)
        DataType::Unsigned8 | DataType::Unsigned16 | DataType::Unsigned32 | DataType::Unsigned64 => match bytes.len() {
            1..=8 => Ok(FieldValue::Unsigned(read_unsigned(bytes))),
            _ => Err(invalid_length()),
        },
        DataType::Signed8 | DataType::Signed16 | DataType::Signed32 | DataType::Signed64 => match bytes.len() {
            1..=8 => Ok(FieldValue::Signed(read_signed(bytes))),
            _ => Err(invalid_length()),
        },
        DataType::Float32 | DataType::Float64 => match bytes.len() {
            4 => Ok(FieldValue::Float(BigEndian::read_f32(bytes) as f64)),
            8 => Ok(FieldValue::Float(BigEndian::read_f64(bytes))),
            _ => Err(invalid_length()),
        },
        // the remaining types aren't subject to reduced-size encoding
        DataType::Boolean => match bytes {
            [1] => Ok(FieldValue::Boolean(true)),
            [2] => Ok(FieldValue::Boolean(false)),
            [other] => Err(Error::InvalidBooleanValue(*other)),
            _ => Err(invalid_length()),
        },
        DataType::MacAddress => match bytes {
            [a, b, c, d, e, f] => Ok(FieldValue::MacAddress(format!("{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, f))),
            _ => Err(invalid_length()),
        },
        DataType::Ipv4Address => {
            let octets: [u8; 4] = bytes.try_into().map_err(|_| invalid_length())?;
            Ok(FieldValue::Ipv4Address(Ipv4Addr::from(octets)))
        }
        DataType::Ipv6Address => {
            let octets: [u8; 16] = bytes.try_into().map_err(|_| invalid_length())?;
            Ok(FieldValue::Ipv6Address(Ipv6Addr::from(octets)))
        }
        DataType::String => Ok(FieldValue::String(String::from_utf8_lossy(bytes).replace('\0', ""))),
        DataType::OctetArray => Ok(FieldValue::Octets(hex::encode(bytes))),
        DataType::DateTimeSeconds => match bytes.len() {
            4 => Ok(FieldValue::DateTime(timestamp(BigEndian::read_u32(bytes) as i64, 0)?)),
            _ => Err(invalid_length()),
        },
        DataType::DateTimeMilliseconds => match bytes.len() {
            8 => {
                let millis = BigEndian::read_i64(bytes);
                DateTime::from_timestamp_millis(millis).map(FieldValue::DateTime).ok_or(Error::InvalidTimestamp(millis))
            }
            _ => Err(invalid_length()),
        },
        DataType::DateTimeMicroseconds | DataType::DateTimeNanoseconds => match bytes.len() {
            8 => {
                let seconds = BigEndian::read_u32(&bytes[0..4]);
                let mut fraction = BigEndian::read_u32(&bytes[4..8]);
                if data_type == DataType::DateTimeMicroseconds {
                    // bottom 11 bits must be cleared for micros to ensure the precision is correct (RFC 7011 Sec 6.1.9)
                    fraction &= !0x7FF;
                }
                Ok(FieldValue::DateTime(timestamp(seconds as i64, fraction_to_nanos(fraction))?))
            }
            _ => Err(invalid_length()),
        },
        DataType::BasicList | DataType::SubTemplateList | DataType::SubTemplateMultiList => {
            Err(Error::Decode(format!("{} is a structured type, not a primitive value", data_type)))
        }
    }
}

/// Zero extends a big endian unsigned integer of 1 to 8 bytes.
fn read_unsigned(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

/// Sign extends a big endian two's complement integer of 1 to 8 bytes.
fn read_signed(bytes: &[u8]) -> i64 {
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(buf)
}

/// The fraction field counts units of 2^-32 seconds.
#[inline]
fn fraction_to_nanos(fraction: u32) -> u32 {
    ((fraction as u64 * 1_000_000_000) >> 32) as u32
}
