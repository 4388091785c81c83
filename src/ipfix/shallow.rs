use chrono::{DateTime, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};

use crate::cursor::Cursor;
use crate::error::{Error, MessageError};
use crate::ipfix::header::{MessageHeader, SetHeader, SetKind};
use crate::ipfix::template::{read_options_template_set, read_template_set};

/// Raw content of a data set, kept until the template it refers to is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ShallowDataSet {
    pub template_id: u16,
    pub export_time: DateTime<Utc>,
    pub content: Vec<u8>,
}

/// Layout of a message: which templates it declares and which it needs, with the raw bytes of
/// each record so they can be decoded once every template is known.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescription {
    pub header: MessageHeader,
    templates: HashMap<u16, Vec<u8>>,
    options_templates: HashMap<u16, Vec<u8>>,
    data_sets: HashMap<u16, Vec<ShallowDataSet>>,
}

impl MessageDescription {
    /// Walks the sets of a message. Template records are delimited, data sets are not looked into.
    pub fn read(buf: &[u8]) -> Result<Self, MessageError> {
        let (header, cursor) = MessageHeader::read(buf)?;
        let mut description = MessageDescription {
            header,
            templates: HashMap::new(),
            options_templates: HashMap::new(),
            data_sets: HashMap::new(),
        };

        if let Err(kind) = description.read_sets(cursor) {
            return Err(description.header.error(kind));
        }

        Ok(description)
    }

    fn read_sets(&mut self, mut cursor: Cursor) -> Result<(), Error> {
        while !cursor.is_empty() {
            let (set, content) = SetHeader::read(&mut cursor)?;

            match SetKind::from_id(set.id)? {
                SetKind::Template => {
                    for (record, bytes) in read_template_set(content)? {
                        self.templates.insert(record.template_id, bytes.to_vec());
                    }
                }
                SetKind::OptionsTemplate => {
                    for (record, bytes) in read_options_template_set(content)? {
                        self.options_templates.insert(record.template_id, bytes.to_vec());
                    }
                }
                SetKind::Data(template_id) => {
                    debug!("Keeping {} bytes of data set {}", content.remaining(), template_id);
                    self.data_sets.entry(template_id).or_insert_with(Vec::new).push(ShallowDataSet {
                        template_id,
                        export_time: self.header.export_time,
                        content: content.rest().to_vec(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn declared_template_ids(&self) -> Vec<u16> {
        sorted(self.templates.keys())
    }

    pub fn declared_options_template_ids(&self) -> Vec<u16> {
        sorted(self.options_templates.keys())
    }

    /// Template ids used by the data sets of the message.
    pub fn referenced_template_ids(&self) -> Vec<u16> {
        sorted(self.data_sets.keys())
    }

    pub fn template_record(&self, template_id: u16) -> Option<&[u8]> {
        self.templates.get(&template_id).map(Vec::as_slice)
    }

    pub fn options_template_record(&self, template_id: u16) -> Option<&[u8]> {
        self.options_templates.get(&template_id).map(Vec::as_slice)
    }

    /// Data sets referring to `template_id`, in message order.
    pub fn data_sets(&self, template_id: u16) -> &[ShallowDataSet] {
        self.data_sets.get(&template_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Referenced template ids that neither the message nor `known` declares.
    pub fn missing_template_ids(&self, known: &HashSet<u16>) -> Vec<u16> {
        self.referenced_template_ids()
            .into_iter()
            .filter(|id| !known.contains(id) && !self.templates.contains_key(id) && !self.options_templates.contains_key(id))
            .collect()
    }
}

fn sorted<'a, I: Iterator<Item = &'a u16>>(ids: I) -> Vec<u16> {
    let mut ids: Vec<u16> = ids.copied().collect();
    ids.sort_unstable();
    ids
}
