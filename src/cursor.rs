use bincode::Options;
use byteorder::{BigEndian, ByteOrder};
use serde::Deserialize;

use crate::error::Error;

/// Read position over the bytes of one message, set or record.
///
/// A cursor never looks outside of the slice it was created with: sets and lists get their own
/// sub cursor so a bogus length can't make the parser wander into the next set.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unread bytes, without consuming them.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Bytes consumed between `start` (a previous `position()`) and now.
    pub fn since(&self, start: usize) -> &'a [u8] {
        &self.buf[start.min(self.pos)..self.pos]
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(Error::UnexpectedEnd { needed: len, remaining: self.remaining() });
        }

        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.read_bytes(len).map(|_| ())
    }

    /// Splits off the next `len` bytes as an independent cursor.
    pub fn sub_cursor(&mut self, len: usize) -> Result<Cursor<'a>, Error> {
        self.read_bytes(len).map(Cursor::new)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// RFC 7011 Sec 7: one length byte, or 255 followed by a 16 bit length.
    pub fn read_var_length(&mut self) -> Result<usize, Error> {
        let first = self.read_u8()?;
        if first < 255 {
            return Ok(first as usize);
        }

        Ok(self.read_u16()? as usize)
    }

    /// Deserializes a fixed layout big endian structure of `size` bytes.
    pub fn read_struct<T: Deserialize<'a>>(&mut self, size: usize) -> Result<T, Error> {
        let bytes = self.read_bytes(size)?;

        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_big_endian()
            .deserialize::<T>(bytes)
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Pair {
        first: u16,
        second: u32,
    }

    #[test]
    fn read_scalars() {
        let buf = hex!("01 02 03 04 05 06 07");
        let mut cursor = Cursor::new(&buf);

        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u32().unwrap(), 0x04050607);
        assert!(cursor.is_empty());
    }

    #[test]
    fn read_short_var_length() {
        let buf = hex!("fe");
        let mut cursor = Cursor::new(&buf);

        assert_eq!(cursor.read_var_length().unwrap(), 254);
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn read_long_var_length() {
        let buf = hex!("ff 03 e8");
        let mut cursor = Cursor::new(&buf);

        assert_eq!(cursor.read_var_length().unwrap(), 1000);
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    #[should_panic]
    fn read_truncated_var_length() {
        let buf = hex!("ff 03");
        Cursor::new(&buf).read_var_length().unwrap();
    }

    #[test]
    fn sub_cursor_is_bounded() {
        let buf = hex!("00 01 00 02 00 03");
        let mut cursor = Cursor::new(&buf);
        let mut sub = cursor.sub_cursor(2).unwrap();

        assert_eq!(sub.read_u16().unwrap(), 1);
        assert_eq!(sub.read_u16(), Err(Error::UnexpectedEnd { needed: 2, remaining: 0 }));
        assert_eq!(cursor.read_u16().unwrap(), 2);
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn since_returns_consumed_bytes() {
        let buf = hex!("0a 0b 0c 0d");
        let mut cursor = Cursor::new(&buf);
        cursor.skip(1).unwrap();
        let start = cursor.position();
        cursor.skip(2).unwrap();

        assert_eq!(cursor.since(start), &hex!("0b 0c"));
        assert_eq!(cursor.rest(), &hex!("0d"));
    }

    #[test]
    fn read_fixed_struct() {
        let buf = hex!("00 0a 00 00 01 00 ff");
        let mut cursor = Cursor::new(&buf);

        assert_eq!(cursor.read_struct::<Pair>(6).unwrap(), Pair { first: 10, second: 256 });
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    #[should_panic]
    fn read_truncated_struct() {
        let buf = hex!("00 0a 00 00 01");
        Cursor::new(&buf).read_struct::<Pair>(6).unwrap();
    }
}
