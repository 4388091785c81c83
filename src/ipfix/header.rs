use chrono::{DateTime, Utc};

use crate::cursor::Cursor;
use crate::error::{Error, MessageError};
use crate::ipfix::value::timestamp;

pub const VERSION: u16 = 10;

/******************************** MSG HEADER ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       Version Number          |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Export Time                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Sequence Number                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Observation Domain ID                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```

#[derive(Deserialize, Debug)]
struct RawHeader {
    version: u16,
    length: u16,
    export_time: u32,
    sequence_number: u32,
    observation_domain_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageHeader {
    pub version: u16,                // Version of IPFIX to which this Message conforms
    pub length: u16,                 // Total length of the IPFIX Message, measured in octets, including Message Header and Set(s).
    pub export_time: DateTime<Utc>,  // Time at which the IPFIX Message Header leaves the Exporter
    pub sequence_number: u32,        // Incremental sequence counter modulo 2^32 of all IPFIX Data Records sent from the current Observation Domain
    pub observation_domain_id: u32,  // Identifier of the Observation Domain that metered the Flows
}

impl MessageHeader {
    pub const SIZE: usize = 16;

    /// Reads and validates the header of a message held entirely in `buf`.
    ///
    /// Returns the header and a cursor over the sets following it.
    pub fn read(buf: &[u8]) -> Result<(Self, Cursor), MessageError> {
        if buf.len() < Self::SIZE {
            return Err(MessageError::new(Error::IncompleteMessage { declared: Self::SIZE, available: buf.len() }));
        }

        let mut cursor = Cursor::new(buf);
        let raw: RawHeader = cursor.read_struct(Self::SIZE).map_err(MessageError::new)?;
        let fail = |kind| MessageError::with_header(kind, raw.sequence_number, raw.observation_domain_id);

        if raw.version != VERSION {
            return Err(fail(Error::InvalidVersion(raw.version)));
        }

        // we need exactly the complete message in the buffer
        if raw.length as usize != buf.len() {
            return Err(fail(Error::IncompleteMessage { declared: raw.length as usize, available: buf.len() }));
        }

        let header = MessageHeader {
            version: raw.version,
            length: raw.length,
            export_time: timestamp(raw.export_time as i64, 0).map_err(fail)?,
            sequence_number: raw.sequence_number,
            observation_domain_id: raw.observation_domain_id,
        };

        Ok((header, cursor))
    }

    /// Tags a decoding error with this message's identifiers.
    pub fn error(&self, kind: Error) -> MessageError {
        MessageError::with_header(kind, self.sequence_number, self.observation_domain_id)
    }
}

/******************************** SET HEADER ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Set ID               |          Length               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```

#[derive(Deserialize, Debug, PartialEq)]
pub struct SetHeader {
    pub id: u16,     // Identifies the Set.
    pub length: u16, // Total length of the Set, in octets, including the Set Header, all records, and the optional padding
}

impl SetHeader {
    pub const SIZE: usize = 4;

    /// Reads the next set header and splits off the set content.
    pub fn read<'a>(cursor: &mut Cursor<'a>) -> Result<(Self, Cursor<'a>), Error> {
        let header: SetHeader = cursor.read_struct(Self::SIZE)?;
        if (header.length as usize) < Self::SIZE {
            return Err(Error::InvalidSetLength { set_id: header.id, length: header.length });
        }

        let content = cursor.sub_cursor(header.content_size())?;
        Ok((header, content))
    }

    #[inline]
    pub fn content_size(&self) -> usize {
        self.length as usize - Self::SIZE
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SetKind {
    Template,
    OptionsTemplate,
    Data(u16),
}

impl SetKind {
    pub const TEMPLATE_SET_ID: u16 = 2;
    pub const OPTIONS_TEMPLATE_SET_ID: u16 = 3;

    /// 0 and 1 are reserved (NetFlow v9 template ids). Any other id names the template of a
    /// data set.
    pub fn from_id(id: u16) -> Result<Self, Error> {
        match id {
            0 | 1 => Err(Error::InvalidSetId(id)),
            Self::TEMPLATE_SET_ID => Ok(SetKind::Template),
            Self::OPTIONS_TEMPLATE_SET_ID => Ok(SetKind::OptionsTemplate),
            id => Ok(SetKind::Data(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const HEADER_PAYLOAD: [u8; MessageHeader::SIZE] = hex!("00 0a 00 10 60 6c 55 89 df b2 ba d2 00 08 00 00");

    const SET_PAYLOAD: [u8; 8] = hex!("01 00 00 08 0a 00 00 01");

    #[test]
    fn read_msg_header() {
        let (header, cursor) = MessageHeader::read(&HEADER_PAYLOAD).unwrap();

        assert_eq!(header.version, VERSION);
        assert_eq!(header.length, 16);
        assert_eq!(header.export_time.timestamp(), 1617712521);
        assert_eq!(header.sequence_number, 3753032402);
        assert_eq!(header.observation_domain_id, 524288);
        assert!(cursor.is_empty());
    }

    #[test]
    #[should_panic]
    fn read_invalid_msg_header() {
        MessageHeader::read(&HEADER_PAYLOAD[0..HEADER_PAYLOAD.len() - 1]).unwrap();
    }

    #[test]
    fn reject_netflow_v9() {
        let mut payload = HEADER_PAYLOAD;
        payload[1] = 9;

        let err = MessageHeader::read(&payload).unwrap_err();
        assert_eq!(err.kind, Error::InvalidVersion(9));
        assert_eq!(err.sequence_number, Some(3753032402));
        assert_eq!(err.observation_domain_id, Some(524288));
    }

    #[test]
    fn reject_length_mismatch() {
        let mut payload = [0u8; 20];
        payload[..16].copy_from_slice(&HEADER_PAYLOAD);

        let err = MessageHeader::read(&payload).unwrap_err();
        assert_eq!(err.kind, Error::IncompleteMessage { declared: 16, available: 20 });
    }

    #[test]
    fn read_set_header() {
        let mut cursor = Cursor::new(&SET_PAYLOAD);
        let (set, content) = SetHeader::read(&mut cursor).unwrap();

        assert_eq!(set, SetHeader { id: 256, length: 8 });
        assert_eq!(content.rest(), &hex!("0a 00 00 01"));
        assert!(cursor.is_empty());
    }

    #[test]
    fn reject_short_set_length() {
        let payload = hex!("00 02 00 03");

        assert_eq!(SetHeader::read(&mut Cursor::new(&payload)), Err(Error::InvalidSetLength { set_id: 2, length: 3 }));
    }

    #[test]
    #[should_panic]
    fn read_truncated_set() {
        SetHeader::read(&mut Cursor::new(&SET_PAYLOAD[0..SET_PAYLOAD.len() - 1])).unwrap();
    }

    #[test]
    fn set_kinds() {
        assert_eq!(SetKind::from_id(2), Ok(SetKind::Template));
        assert_eq!(SetKind::from_id(3), Ok(SetKind::OptionsTemplate));
        assert_eq!(SetKind::from_id(256), Ok(SetKind::Data(256)));
        assert_eq!(SetKind::from_id(0), Err(Error::InvalidSetId(0)));
        assert_eq!(SetKind::from_id(1), Err(Error::InvalidSetId(1)));
        assert_eq!(SetKind::from_id(4), Ok(SetKind::Data(4)));
        assert_eq!(SetKind::from_id(42), Ok(SetKind::Data(42)));
        assert_eq!(SetKind::from_id(255), Ok(SetKind::Data(255)));
    }
}
