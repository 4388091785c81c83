use log::debug;

use crate::cursor::Cursor;
use crate::error::{Error, MessageError};
use crate::ipfix::data::{DataSetDecoder, Diagnostic, Flow, TemplateLookup};
use crate::ipfix::header::{MessageHeader, SetHeader, SetKind};
use crate::ipfix::shallow::{MessageDescription, ShallowDataSet};
use crate::ipfix::template::{read_options_template_set, read_template_set, OptionsTemplateRecord, Template, TemplateMap, TemplateRecord};
use crate::registry::InformationElementRegistry;

/// What to do with a field whose information element has no definition.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownElementPolicy {
    Fail,
    Skip,
}

impl Default for UnknownElementPolicy {
    fn default() -> Self {
        UnknownElementPolicy::Fail
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ParserOptions {
    pub max_nesting_depth: usize,
    pub unknown_elements: UnknownElementPolicy,
}

impl ParserOptions {
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 16;
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
            unknown_elements: UnknownElementPolicy::default(),
        }
    }
}

/// A fully decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct IpfixMessage {
    pub header: MessageHeader,
    pub templates: Vec<TemplateRecord>,
    pub options_templates: Vec<OptionsTemplateRecord>,
    pub flows: Vec<Flow>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Decodes IPFIX messages against an information element registry.
///
/// The parser keeps no state between messages: templates learned from one message must be handed
/// back by the caller, per observation domain, when parsing the next ones.
#[derive(Debug, Clone)]
pub struct IpfixParser<R> {
    registry: R,
    options: ParserOptions,
}

impl<R: InformationElementRegistry> IpfixParser<R> {
    pub fn new(registry: R) -> Self {
        Self::with_options(registry, ParserOptions::default())
    }

    pub fn with_options(registry: R, options: ParserOptions) -> Self {
        IpfixParser { registry, options }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Decodes a complete message.
    ///
    /// Data sets are resolved against the templates declared earlier in the same message, then
    /// against `templates`. A data set whose template is found in neither fails the whole message.
    pub fn parse_message(&self, buf: &[u8], templates: &TemplateMap) -> Result<IpfixMessage, MessageError> {
        let (header, cursor) = MessageHeader::read(buf)?;
        let mut message = IpfixMessage {
            header,
            templates: vec![],
            options_templates: vec![],
            flows: vec![],
            diagnostics: vec![],
        };

        if let Err(kind) = self.parse_sets(cursor, templates, &mut message) {
            return Err(message.header.error(kind));
        }

        Ok(message)
    }

    fn parse_sets(&self, mut cursor: Cursor, templates: &TemplateMap, message: &mut IpfixMessage) -> Result<(), Error> {
        let mut declared = TemplateMap::new();

        while !cursor.is_empty() {
            let (set, content) = SetHeader::read(&mut cursor)?;
            debug!("Reading set {} of {} bytes", set.id, set.length);

            match SetKind::from_id(set.id)? {
                SetKind::Template => {
                    for (record, _) in read_template_set(content)? {
                        declared.insert(record.template_id, Template::Data(record.clone()));
                        message.templates.push(record);
                    }
                }
                SetKind::OptionsTemplate => {
                    for (record, _) in read_options_template_set(content)? {
                        declared.insert(record.template_id, Template::Options(record.clone()));
                        message.options_templates.push(record);
                    }
                }
                SetKind::Data(template_id) => {
                    let lookup = TemplateLookup::new(&declared, templates);
                    let template = lookup.get(template_id).ok_or(Error::MissingTemplate(template_id))?;
                    let decoder = DataSetDecoder::new(&self.registry, &self.options, lookup);

                    let flows = decoder.read(content, &template.fields(), &mut message.diagnostics)?;
                    debug!("Read {} flows from data set {}", flows.len(), template_id);
                    message.flows.extend(flows);
                }
            }
        }

        Ok(())
    }

    /// Slices a message into its records without decoding any data, see [`MessageDescription`].
    pub fn shallow_parse_message(&self, buf: &[u8]) -> Result<MessageDescription, MessageError> {
        MessageDescription::read(buf)
    }

    /// Decodes a data set kept by a shallow parse, once its template is known.
    pub fn parse_data_set(&self, data_set: &ShallowDataSet, templates: &TemplateMap, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<Flow>, Error> {
        let declared = TemplateMap::new();
        let lookup = TemplateLookup::new(&declared, templates);
        let template = lookup.get(data_set.template_id).ok_or(Error::MissingTemplate(data_set.template_id))?;

        DataSetDecoder::new(&self.registry, &self.options, lookup).read(Cursor::new(&data_set.content), &template.fields(), diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipfix::template::InformationElement;
    use crate::ipfix::value::{FieldValue, VARIABLE_LENGTH};
    use crate::registry::Definitions;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    // template 256: sourceIPv4Address (4), packetDeltaCount (4)
    const TEMPLATE_SET: [u8; 16] = hex!("00 02 00 10 01 00 00 02 00 08 00 04 00 02 00 04");

    const DATA_SET: [u8; 12] = hex!("01 00 00 0c 0a 00 00 01 00 00 00 2a");

    fn message(sets: &[&[u8]]) -> Vec<u8> {
        let length = 16 + sets.iter().map(|set| set.len()).sum::<usize>();
        let mut buf = vec![0x00, 0x0a];
        buf.extend_from_slice(&(length as u16).to_be_bytes());
        buf.extend_from_slice(&hex!("60 6c 55 89 00 00 00 07 00 00 00 01"));
        for set in sets {
            buf.extend_from_slice(set);
        }

        buf
    }

    fn parser() -> IpfixParser<Definitions> {
        IpfixParser::new(Definitions::iana())
    }

    /// A template field, basicLists also name the element of their entries.
    enum Column {
        Value(InformationElement),
        List(InformationElement, InformationElement),
    }

    fn set(id: u16, content: &[u8]) -> Vec<u8> {
        let mut buf = id.to_be_bytes().to_vec();
        buf.extend_from_slice(&(content.len() as u16 + 4).to_be_bytes());
        buf.extend_from_slice(content);
        buf
    }

    fn encode_value(value: &FieldValue, length: u16) -> Vec<u8> {
        match value {
            FieldValue::Unsigned(v) => v.to_be_bytes()[8 - length as usize..].to_vec(),
            FieldValue::Ipv6Address(address) => address.octets().to_vec(),
            FieldValue::String(v) => v.as_bytes().to_vec(),
            other => panic!("no encoding for {:?}", other),
        }
    }

    fn push_field(buf: &mut Vec<u8>, declared_length: u16, bytes: &[u8]) {
        if declared_length == VARIABLE_LENGTH {
            if bytes.len() < 255 {
                buf.push(bytes.len() as u8);
            } else {
                buf.push(255);
                buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            }
        } else {
            assert_eq!(bytes.len(), declared_length as usize);
        }
        buf.extend_from_slice(bytes);
    }

    /// Writes decoded flows back into a message holding their template and one data set.
    fn encode_message(template_id: u16, columns: &[Column], flows: &[Flow]) -> Vec<u8> {
        let registry = Definitions::iana();
        let name = |element: &InformationElement| registry.lookup(element.id, element.enterprise_number).unwrap().name.clone();

        let mut template = template_id.to_be_bytes().to_vec();
        template.extend_from_slice(&(columns.len() as u16).to_be_bytes());
        for column in columns {
            let element = match column {
                Column::Value(element) | Column::List(element, _) => element,
            };
            template.extend_from_slice(&element.id.to_be_bytes());
            template.extend_from_slice(&element.length.to_be_bytes());
        }

        let mut records = vec![];
        for flow in flows {
            for column in columns {
                match column {
                    Column::Value(element) => {
                        let value = flow.get(&name(element)).unwrap();
                        push_field(&mut records, element.length, &encode_value(value, element.length));
                    }
                    Column::List(element, entry) => {
                        let mut content = vec![0x03];
                        content.extend_from_slice(&entry.id.to_be_bytes());
                        content.extend_from_slice(&entry.length.to_be_bytes());
                        let mut index = 0;
                        while let Some(value) = flow.get(&format!("{}_{}", name(entry), index)) {
                            content.extend(encode_value(value, entry.length));
                            index += 1;
                        }
                        push_field(&mut records, element.length, &content);
                    }
                }
            }
        }

        message(&[&set(2, &template), &set(template_id, &records)])
    }

    #[test]
    fn parse_template_and_data() {
        let buf = message(&[&TEMPLATE_SET, &DATA_SET]);

        let msg = parser().parse_message(&buf, &TemplateMap::new()).unwrap();

        assert_eq!(msg.header.sequence_number, 7);
        assert_eq!(msg.header.observation_domain_id, 1);
        assert_eq!(msg.templates, vec![TemplateRecord { template_id: 256, information_elements: vec![InformationElement::new(8, 4), InformationElement::new(2, 4)] }]);
        assert!(msg.options_templates.is_empty());
        assert_eq!(msg.flows.len(), 1);
        assert_eq!(msg.flows[0].get("sourceIPv4Address"), Some(&FieldValue::Ipv4Address(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(msg.flows[0].get("packetDeltaCount"), Some(&FieldValue::Unsigned(42)));
        assert!(msg.diagnostics.is_empty());
    }

    #[test]
    fn parse_data_with_known_templates() {
        let mut templates = TemplateMap::new();
        let template = TemplateRecord { template_id: 256, information_elements: vec![InformationElement::new(8, 4), InformationElement::new(2, 4)] };
        templates.insert(256, Template::Data(template));
        let buf = message(&[&DATA_SET]);

        let msg = parser().parse_message(&buf, &templates).unwrap();

        assert!(msg.templates.is_empty());
        assert_eq!(msg.flows[0].to_string(), "packetDeltaCount: 42, sourceIPv4Address: 10.0.0.1, ");
    }

    #[test]
    fn declared_template_overrides_known() {
        let mut templates = TemplateMap::new();
        templates.insert(256, Template::Data(TemplateRecord { template_id: 256, information_elements: vec![InformationElement::new(4, 8)] }));
        let buf = message(&[&TEMPLATE_SET, &DATA_SET]);

        let msg = parser().parse_message(&buf, &templates).unwrap();

        assert_eq!(msg.flows[0].len(), 2);
    }

    #[test]
    fn parse_options_template_and_data() {
        // options template 512: scope exportingProcessId (4), option samplingInterval (4)
        let options_set = hex!("00 03 00 14 02 00 00 02 00 01 00 90 00 04 00 22 00 04 00 00");
        let data_set = hex!("02 00 00 0c 00 00 00 02 00 00 00 0a");
        let buf = message(&[&options_set, &data_set]);

        let msg = parser().parse_message(&buf, &TemplateMap::new()).unwrap();

        assert_eq!(msg.options_templates.len(), 1);
        assert_eq!(msg.options_templates[0].scope_fields, vec![InformationElement::new(144, 4)]);
        assert_eq!(msg.flows.len(), 1);
        assert_eq!(msg.flows[0].get("exportingProcessId"), Some(&FieldValue::Unsigned(2)));
        assert_eq!(msg.flows[0].get("samplingInterval"), Some(&FieldValue::Unsigned(10)));
    }

    #[test]
    fn reject_version() {
        let mut buf = message(&[&TEMPLATE_SET]);
        buf[1] = 9;

        let err = parser().parse_message(&buf, &TemplateMap::new()).unwrap_err();

        assert_eq!(err.kind, Error::InvalidVersion(9));
        assert_eq!(err.sequence_number, Some(7));
    }

    #[test]
    fn reject_missing_template() {
        let data_set = hex!("03 e7 00 08 00 00 00 01");
        let buf = message(&[&TEMPLATE_SET, &data_set]);

        let err = parser().parse_message(&buf, &TemplateMap::new()).unwrap_err();

        assert_eq!(err, MessageError::with_header(Error::MissingTemplate(999), 7, 1));
    }

    #[test]
    fn reject_reserved_set_ids() {
        for id in &[0u16, 1] {
            let mut set = hex!("00 00 00 08 00 00 00 00");
            set[0..2].copy_from_slice(&id.to_be_bytes());
            let buf = message(&[&set]);

            assert_eq!(parser().parse_message(&buf, &TemplateMap::new()).unwrap_err().kind, Error::InvalidSetId(*id));
        }
    }

    #[test]
    fn low_set_ids_are_data_sets() {
        for id in &[4u16, 42, 100, 255] {
            let mut templates = TemplateMap::new();
            templates.insert(*id, Template::Data(TemplateRecord { template_id: *id, information_elements: vec![InformationElement::new(4, 1)] }));
            let mut set = hex!("00 00 00 05 11");
            set[0..2].copy_from_slice(&id.to_be_bytes());
            let buf = message(&[&set]);

            let msg = parser().parse_message(&buf, &templates).unwrap();

            assert_eq!(msg.flows.len(), 1);
            assert_eq!(msg.flows[0].get("protocolIdentifier"), Some(&FieldValue::Unsigned(17)));
        }
    }

    #[test]
    fn reject_set_past_message_end() {
        let mut buf = message(&[&DATA_SET]);
        buf[19] = 0x10;

        assert_eq!(
            parser().parse_message(&buf, &TemplateMap::new()).unwrap_err().kind,
            Error::UnexpectedEnd { needed: 12, remaining: 8 }
        );
    }

    #[test]
    #[should_panic]
    fn parse_truncated_message() {
        let buf = message(&[&TEMPLATE_SET, &DATA_SET]);
        parser().parse_message(&buf[..buf.len() - 1], &TemplateMap::new()).unwrap();
    }

    #[test]
    fn unknown_nested_template_keeps_siblings() {
        // template 257: protocolIdentifier, subTemplateList, sourceTransportPort
        let template_set = hex!("00 02 00 14 01 01 00 03 00 04 00 01 01 24 ff ff 00 07 00 02");
        let data_set = hex!("01 01 00 0f 06 07 04 01 f4 00 50 01 bb 00 35");
        let buf = message(&[&template_set, &data_set]);

        let msg = parser().parse_message(&buf, &TemplateMap::new()).unwrap();

        assert_eq!(msg.flows.len(), 1);
        assert_eq!(msg.flows[0].get("protocolIdentifier"), Some(&FieldValue::Unsigned(6)));
        assert_eq!(msg.flows[0].get("sourceTransportPort"), Some(&FieldValue::Unsigned(53)));
        assert_eq!(msg.diagnostics, vec![Diagnostic::MissingNestedTemplate { template_id: 500, field: "subTemplateList".to_string() }]);
    }

    #[test]
    fn sub_template_multi_list_is_skipped() {
        // template 258: subTemplateMultiList, protocolIdentifier
        let template_set = hex!("00 02 00 10 01 02 00 02 01 25 ff ff 00 04 00 01");
        let data_set = hex!("01 02 00 0b 05 03 01 90 00 04 11");
        let buf = message(&[&template_set, &data_set]);

        let msg = parser().parse_message(&buf, &TemplateMap::new()).unwrap();

        assert_eq!(msg.flows[0].get("protocolIdentifier"), Some(&FieldValue::Unsigned(17)));
        assert_eq!(msg.diagnostics, vec![Diagnostic::UnsupportedConstruct { field: "subTemplateMultiList".to_string(), length: 5 }]);
    }

    #[test]
    fn skip_unknown_elements_when_configured() {
        // template 259: enterprise element 110 of PEN 3054, protocolIdentifier
        let template_set = hex!("00 02 00 14 01 03 00 02 80 6e 00 04 00 00 0b ee 00 04 00 01");
        let data_set = hex!("01 03 00 09 00 00 00 01 06");
        let buf = message(&[&template_set, &data_set]);

        let strict = parser().parse_message(&buf, &TemplateMap::new()).unwrap_err();
        assert_eq!(strict.kind, Error::UnknownInformationElement { id: 110, enterprise_number: 3054 });

        let options = ParserOptions { unknown_elements: UnknownElementPolicy::Skip, ..ParserOptions::default() };
        let msg = IpfixParser::with_options(Definitions::iana(), options).parse_message(&buf, &TemplateMap::new()).unwrap();
        assert_eq!(msg.flows[0].len(), 1);
        assert_eq!(msg.diagnostics, vec![Diagnostic::SkippedUnknownElement { id: 110, enterprise_number: 3054 }]);
    }

    #[test]
    fn parse_kept_data_set() {
        let buf = message(&[&TEMPLATE_SET, &DATA_SET]);
        let parser = parser();
        let description = parser.shallow_parse_message(&buf).unwrap();

        let mut templates = TemplateMap::new();
        for id in description.declared_template_ids() {
            let record = crate::ipfix::template::parse_template_record(description.template_record(id).unwrap()).unwrap();
            templates.insert(id, record.into());
        }

        let mut diagnostics = vec![];
        let flows = parser.parse_data_set(&description.data_sets(256)[0], &templates, &mut diagnostics).unwrap();

        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].get("packetDeltaCount"), Some(&FieldValue::Unsigned(42)));
        assert_eq!(
            parser.parse_data_set(&description.data_sets(256)[0], &TemplateMap::new(), &mut diagnostics),
            Err(Error::MissingTemplate(256))
        );
    }

    #[test]
    fn reencoded_flows_decode_identically() {
        // template 300: packetDeltaCount (4), sourceIPv6Address (16), interfaceName (var), basicList (var)
        let template_set = hex!("00 02 00 18 01 2c 00 04 00 02 00 04 00 1b 00 10 00 52 ff ff 01 23 ff ff");
        let data_set = hex!(
            "01 2c 00 27 00 00 05 39 20 01 0d b8 00 00 00 00 00 00 00 00 00 00 00 01
             04 65 74 68 30 09 03 00 07 00 02 00 50 01 bb"
        );
        let first = parser().parse_message(&message(&[&template_set, &data_set]), &TemplateMap::new()).unwrap();

        assert_eq!(first.flows.len(), 1);
        assert_eq!(first.flows[0].get("packetDeltaCount"), Some(&FieldValue::Unsigned(1337)));
        assert_eq!(first.flows[0].get("sourceIPv6Address"), Some(&FieldValue::Ipv6Address("2001:db8::1".parse().unwrap())));
        assert_eq!(first.flows[0].get("interfaceName"), Some(&FieldValue::String("eth0".to_string())));
        assert_eq!(first.flows[0].get("sourceTransportPort_1"), Some(&FieldValue::Unsigned(443)));

        // packetDeltaCount goes back at its full width
        let columns = [
            Column::Value(InformationElement::new(2, 8)),
            Column::Value(InformationElement::new(27, 16)),
            Column::Value(InformationElement::new(82, VARIABLE_LENGTH)),
            Column::List(InformationElement::new(291, VARIABLE_LENGTH), InformationElement::new(7, 2)),
        ];
        let second = parser().parse_message(&encode_message(300, &columns, &first.flows), &TemplateMap::new()).unwrap();

        assert_eq!(second.flows, first.flows);
        assert!(second.diagnostics.is_empty());
    }

    #[test]
    fn options_deserialize_from_settings() {
        let options: ParserOptions = serde_json::from_str(r#"{ "unknown_elements": "skip" }"#).unwrap();

        assert_eq!(options.unknown_elements, UnknownElementPolicy::Skip);
        assert_eq!(options.max_nesting_depth, ParserOptions::DEFAULT_MAX_NESTING_DEPTH);
    }
}
