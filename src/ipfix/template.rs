use log::debug;
use std::collections::HashMap;
use std::fmt;

use crate::cursor::Cursor;
use crate::error::Error;
use crate::ipfix::value::VARIABLE_LENGTH;

/// Templates known for one observation domain, by template id.
pub type TemplateMap = HashMap<u16, Template>;

/******************************** TEMPLATE RECORD FIELD ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |E|  Information Element ident. |        Field Length           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Enterprise Number                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InformationElement {
    pub id: u16,                // A numeric value that represents the Information Element, enterprise bit removed
    pub length: u16,            // The length of the corresponding encoded Information Element, in octets, 65535 if variable
    pub enterprise_number: u32, // IANA enterprise number of the authority defining the Information Element, 0 for IANA elements
}

impl InformationElement {
    pub const ENTERPRISE_BIT: u16 = 0x8000;

    pub fn new(id: u16, length: u16) -> Self {
        InformationElement { id, length, enterprise_number: 0 }
    }

    pub fn read(cursor: &mut Cursor) -> Result<Self, Error> {
        let raw_id = cursor.read_u16()?;
        let length = cursor.read_u16()?;

        if raw_id & Self::ENTERPRISE_BIT == 0 {
            return Ok(InformationElement::new(raw_id, length));
        }

        Ok(InformationElement {
            id: raw_id & !Self::ENTERPRISE_BIT,
            length,
            enterprise_number: cursor.read_u32()?,
        })
    }

    #[inline]
    pub fn is_variable_length(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }

    /// Smallest number of bytes a value of this element can take in a record.
    #[inline]
    pub fn min_length(&self) -> usize {
        if self.is_variable_length() {
            1
        } else {
            self.length as usize
        }
    }
}

/******************************** TEMPLATE RECORD ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Template ID (> 255)      |         Field Count           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```

#[derive(Deserialize, Debug)]
struct TemplateHeader {
    id: u16,          // Each Template Record is given a unique Template ID in the range 256 to 65535
    field_count: u16, // Number of fields in this Template Record.
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub template_id: u16,
    pub information_elements: Vec<InformationElement>,
}

impl TemplateRecord {
    pub const HEADER_SIZE: usize = 4;

    pub fn read(cursor: &mut Cursor) -> Result<Self, Error> {
        let header: TemplateHeader = cursor.read_struct(Self::HEADER_SIZE)?;
        let mut information_elements = Vec::with_capacity(header.field_count as usize);

        for _ in 0..header.field_count {
            information_elements.push(InformationElement::read(cursor)?);
        }

        Ok(TemplateRecord { template_id: header.id, information_elements })
    }
}

impl fmt::Display for TemplateRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "template {} ({} fields)", self.template_id, self.information_elements.len())?;

        for field in &self.information_elements {
            write!(f, "\n{:?}", field)?;
        }

        Ok(())
    }
}

/********************************  OPTIONS TEMPLATE RECORD ********************************/

/// from https://tools.ietf.org/html/rfc7011
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Template ID (> 255)   |         Field Count           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Scope Field Count        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```

#[derive(Deserialize, Debug)]
struct OptionsTemplateHeader {
    id: u16,                // Options Template id in the range 256 to 65535
    field_count: u16,       // Number of all fields in this Options Template Record, including the Scope Fields
    scope_field_count: u16, // Number of scope fields in this Options Template Record
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsTemplateRecord {
    pub template_id: u16,
    pub scope_fields: Vec<InformationElement>,
    pub option_fields: Vec<InformationElement>,
}

impl OptionsTemplateRecord {
    pub const HEADER_SIZE: usize = 6;

    pub fn read(cursor: &mut Cursor) -> Result<Self, Error> {
        let header: OptionsTemplateHeader = cursor.read_struct(Self::HEADER_SIZE)?;
        if header.scope_field_count > header.field_count {
            return Err(Error::InvalidScopeFieldCount {
                template_id: header.id,
                field_count: header.field_count,
                scope_field_count: header.scope_field_count,
            });
        }

        let mut scope_fields = Vec::with_capacity(header.scope_field_count as usize);
        for _ in 0..header.scope_field_count {
            scope_fields.push(InformationElement::read(cursor)?);
        }

        let mut option_fields = Vec::with_capacity((header.field_count - header.scope_field_count) as usize);
        for _ in header.scope_field_count..header.field_count {
            option_fields.push(InformationElement::read(cursor)?);
        }

        Ok(OptionsTemplateRecord { template_id: header.id, scope_fields, option_fields })
    }

    /// Scope fields followed by option fields, the layout of the data records.
    pub fn fields(&self) -> impl Iterator<Item = &InformationElement> {
        self.scope_fields.iter().chain(self.option_fields.iter())
    }
}

/******************************** TEMPLATE ********************************/

/// Any template a data set can refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Data(TemplateRecord),
    Options(OptionsTemplateRecord),
}

impl Template {
    pub fn id(&self) -> u16 {
        match self {
            Template::Data(t) => t.template_id,
            Template::Options(t) => t.template_id,
        }
    }

    /// Ordered fields of the records described by this template.
    pub fn fields(&self) -> Vec<&InformationElement> {
        match self {
            Template::Data(t) => t.information_elements.iter().collect(),
            Template::Options(t) => t.fields().collect(),
        }
    }
}

impl From<TemplateRecord> for Template {
    fn from(record: TemplateRecord) -> Self {
        Template::Data(record)
    }
}

impl From<OptionsTemplateRecord> for Template {
    fn from(record: OptionsTemplateRecord) -> Self {
        Template::Options(record)
    }
}

/******************************** TEMPLATE SETS ********************************/

/// Only padding is left: too short for another record header, or zeros (template ids are > 255).
fn is_padding(content: &Cursor, header_size: usize) -> bool {
    content.remaining() < header_size || content.rest().iter().all(|b| *b == 0)
}

/// Reads every record of a Template Set, along with the raw bytes of each record.
pub fn read_template_set<'a>(mut content: Cursor<'a>) -> Result<Vec<(TemplateRecord, &'a [u8])>, Error> {
    let mut records = vec![];

    while !content.is_empty() {
        if is_padding(&content, TemplateRecord::HEADER_SIZE) {
            debug!("Ignoring {} bytes of template set padding", content.remaining());
            break;
        }

        let start = content.position();
        let record = TemplateRecord::read(&mut content)?;
        debug!("Read template {} with {} fields", record.template_id, record.information_elements.len());
        records.push((record, content.since(start)));
    }

    Ok(records)
}

/// Reads every record of an Options Template Set, along with the raw bytes of each record.
pub fn read_options_template_set<'a>(mut content: Cursor<'a>) -> Result<Vec<(OptionsTemplateRecord, &'a [u8])>, Error> {
    let mut records = vec![];

    while !content.is_empty() {
        if is_padding(&content, OptionsTemplateRecord::HEADER_SIZE) {
            debug!("Ignoring {} bytes of options template set padding", content.remaining());
            break;
        }

        let start = content.position();
        let record = OptionsTemplateRecord::read(&mut content)?;
        debug!(
            "Read options template {} with {} scope and {} option fields",
            record.template_id,
            record.scope_fields.len(),
            record.option_fields.len()
        );
        records.push((record, content.since(start)));
    }

    Ok(records)
}

/// Decodes one raw template record, as kept by a shallow parse.
pub fn parse_template_record(bytes: &[u8]) -> Result<TemplateRecord, Error> {
    TemplateRecord::read(&mut Cursor::new(bytes))
}

/// Decodes one raw options template record, as kept by a shallow parse.
pub fn parse_options_template_record(bytes: &[u8]) -> Result<OptionsTemplateRecord, Error> {
    OptionsTemplateRecord::read(&mut Cursor::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    const TEMPLATE_PAYLOAD: [u8; 112] = hex!(
        "01 00 00 1b 00 08 00 04 00 0c 00 04 00 05 00 01
         00 04 00 01 00 07 00 02 00 0b 00 02 00 20 00 02
         00 0a 00 04 00 3a 00 02 00 09 00 01 00 0d 00 01
         00 10 00 04 00 11 00 04 00 0f 00 04 00 06 00 01
         00 0e 00 04 00 01 00 08 00 02 00 08 00 34 00 01
         00 35 00 01 00 98 00 08 00 99 00 08 00 88 00 01
         00 3d 00 01 00 f3 00 02 00 f5 00 02 00 36 00 04"
    );

    const OPTION_TEMPLATE_PAYLOAD: [u8; 50] = hex!(
        "02 00 00 0b 00 01 00 90 00 04 00 29 00 08 00 2a
         00 08 00 a0 00 08 00 82 00 04 00 83 00 10 00 22
         00 04 00 24 00 02 00 25 00 02 00 d6 00 01 00 d7
         00 01"
    );

    // template 300: enterprise element 110 of PEN 3054, then a variable length string
    const ENTERPRISE_TEMPLATE_PAYLOAD: [u8; 16] = hex!("01 2c 00 02 80 6e 00 04 00 00 0b ee 00 52 ff ff");

    fn ie(id: u16, length: u16) -> InformationElement {
        InformationElement::new(id, length)
    }

    #[test]
    fn read_data_template() {
        let mut cursor = Cursor::new(&TEMPLATE_PAYLOAD);
        let template = TemplateRecord::read(&mut cursor).unwrap();

        assert_eq!(template.template_id, 256);
        assert_eq!(template.information_elements.len(), 27);
        assert!(cursor.is_empty());

        #[cfg_attr(rustfmt, rustfmt::skip)]
        {
        assert_eq!(template.information_elements[0], ie(8, 4));
        assert_eq!(template.information_elements[1], ie(12, 4));
        assert_eq!(template.information_elements[2], ie(5, 1));
        assert_eq!(template.information_elements[3], ie(4, 1));
        assert_eq!(template.information_elements[16], ie(1, 8));
        assert_eq!(template.information_elements[17], ie(2, 8));
        assert_eq!(template.information_elements[20], ie(152, 8));
        assert_eq!(template.information_elements[26], ie(54, 4));
        }
    }

    #[test]
    #[should_panic]
    fn read_invalid_data_template() {
        TemplateRecord::read(&mut Cursor::new(&TEMPLATE_PAYLOAD[0..TEMPLATE_PAYLOAD.len() - 1])).unwrap();
    }

    #[test]
    fn read_option_template() {
        let template = parse_options_template_record(&OPTION_TEMPLATE_PAYLOAD).unwrap();

        assert_eq!(template.template_id, 512);
        assert_eq!(template.scope_fields, vec![ie(144, 4)]);
        assert_eq!(template.option_fields.len(), 10);
        assert_eq!(template.option_fields[0], ie(41, 8));
        assert_eq!(template.option_fields[9], ie(215, 1));

        let fields: Vec<_> = template.fields().collect();
        assert_eq!(fields.len(), 11);
        assert_eq!(*fields[0], ie(144, 4));
        assert_eq!(*fields[1], ie(41, 8));
    }

    #[test]
    #[should_panic]
    fn read_invalid_option_template() {
        parse_options_template_record(&OPTION_TEMPLATE_PAYLOAD[0..OPTION_TEMPLATE_PAYLOAD.len() - 1]).unwrap();
    }

    #[test]
    fn reject_scope_count_above_field_count() {
        let payload = hex!("02 00 00 01 00 02 00 90 00 04");

        assert_eq!(
            parse_options_template_record(&payload),
            Err(Error::InvalidScopeFieldCount { template_id: 512, field_count: 1, scope_field_count: 2 })
        );
    }

    #[test]
    fn read_enterprise_element() {
        let template = parse_template_record(&ENTERPRISE_TEMPLATE_PAYLOAD).unwrap();

        assert_eq!(template.template_id, 300);
        assert_eq!(template.information_elements[0], InformationElement { id: 110, length: 4, enterprise_number: 3054 });
        assert_eq!(template.information_elements[1], ie(82, VARIABLE_LENGTH));
        assert!(template.information_elements[1].is_variable_length());
        assert_eq!(template.information_elements[1].min_length(), 1);
    }

    #[test]
    fn read_template_set_with_padding() {
        let mut set = ENTERPRISE_TEMPLATE_PAYLOAD.to_vec();
        set.extend_from_slice(&hex!("01 2d 00 01 00 08 00 04"));
        set.extend_from_slice(&[0, 0, 0]);

        let records = read_template_set(Cursor::new(&set)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, &ENTERPRISE_TEMPLATE_PAYLOAD[..]);
        assert_eq!(records[1].0, TemplateRecord { template_id: 301, information_elements: vec![ie(8, 4)] });
        assert_eq!(records[1].1, &hex!("01 2d 00 01 00 08 00 04")[..]);
    }

    #[test]
    fn read_options_template_set_with_padding() {
        let mut set = OPTION_TEMPLATE_PAYLOAD.to_vec();
        set.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);

        let records = read_options_template_set(Cursor::new(&set)).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.template_id, 512);
        assert_eq!(records[0].1, &OPTION_TEMPLATE_PAYLOAD[..]);
    }

    #[test]
    #[should_panic]
    fn read_truncated_template_set() {
        read_template_set(Cursor::new(&ENTERPRISE_TEMPLATE_PAYLOAD[0..10])).unwrap();
    }

    #[test]
    fn template_fields() {
        let data: Template = parse_template_record(&ENTERPRISE_TEMPLATE_PAYLOAD).unwrap().into();
        let options: Template = parse_options_template_record(&OPTION_TEMPLATE_PAYLOAD).unwrap().into();

        assert_eq!(data.id(), 300);
        assert_eq!(data.fields().len(), 2);
        assert_eq!(options.id(), 512);
        assert_eq!(options.fields().len(), 11);
        assert_eq!(*options.fields()[0], ie(144, 4));
    }
}
