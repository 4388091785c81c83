use log::{debug, error, warn};
use num_traits::FromPrimitive;
use std::collections::BTreeMap;
use std::fmt;

use crate::cursor::Cursor;
use crate::error::Error;
use crate::ipfix::parser::{ParserOptions, UnknownElementPolicy};
use crate::ipfix::template::{InformationElement, Template, TemplateMap};
use crate::ipfix::value::{decode_value, field_length, FieldValue};
use crate::registry::{DataType, InformationElementRegistry};

/******************************** FLOW ********************************/

/// One decoded data record, nested lists flattened into the field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Flow {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Flow {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn insert(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in self.fields.iter() {
            write!(f, "{}: {}, ", name, value)?;
        }

        Ok(())
    }
}

/******************************** DIAGNOSTIC ********************************/

/// A condition that was recovered from while decoding a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A subTemplateList referenced a template that isn't known, its content was skipped.
    MissingNestedTemplate { template_id: u16, field: String },
    /// A subTemplateMultiList was skipped.
    UnsupportedConstruct { field: String, length: usize },
    SkippedUnknownElement { id: u16, enterprise_number: u32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Diagnostic::MissingNestedTemplate { template_id, field } => {
                write!(f, "skipped subTemplateList {}, template {} is unknown", field, template_id)
            }
            Diagnostic::UnsupportedConstruct { field, length } => write!(f, "skipped subTemplateMultiList {} ({} bytes)", field, length),
            Diagnostic::SkippedUnknownElement { id, enterprise_number } => {
                write!(f, "skipped unknown information element {} (enterprise {})", id, enterprise_number)
            }
        }
    }
}

/******************************** LIST SEMANTIC ********************************/

/// Relationship between the elements of a structured data type (RFC 6313 Sec 4.4).
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Semantic {
    NoneOf = 0,
    ExactlyOneOf = 1,
    OneOrMoreOf = 2,
    AllOf = 3,
    Ordered = 4,
    Undefined = 255,
}

impl Semantic {
    pub fn read(cursor: &mut Cursor) -> Result<Self, Error> {
        let value = cursor.read_u8()?;
        Semantic::from_u8(value).ok_or(Error::InvalidSemantic(value))
    }
}

/******************************** TEMPLATE LOOKUP ********************************/

/// Templates visible to a data set: those declared earlier in the same message first,
/// then the ones the caller already knew.
#[derive(Debug, Clone, Copy)]
pub struct TemplateLookup<'t> {
    declared: &'t TemplateMap,
    known: &'t TemplateMap,
}

impl<'t> TemplateLookup<'t> {
    pub fn new(declared: &'t TemplateMap, known: &'t TemplateMap) -> Self {
        TemplateLookup { declared, known }
    }

    pub fn get(&self, template_id: u16) -> Option<&'t Template> {
        self.declared.get(&template_id).or_else(|| self.known.get(&template_id))
    }
}

/******************************** DATA SET ********************************/

/// Decodes the records of data sets against a resolved template.
pub struct DataSetDecoder<'a, R: ?Sized> {
    registry: &'a R,
    options: &'a ParserOptions,
    templates: TemplateLookup<'a>,
}

impl<'a, R: InformationElementRegistry + ?Sized> DataSetDecoder<'a, R> {
    pub fn new(registry: &'a R, options: &'a ParserOptions, templates: TemplateLookup<'a>) -> Self {
        DataSetDecoder { registry, options, templates }
    }

    /// Decodes every record of a data set content until only padding is left.
    pub fn read(&self, mut content: Cursor, fields: &[&InformationElement], diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<Flow>, Error> {
        self.read_records(&mut content, fields, 0, diagnostics)
    }

    fn read_records(&self, content: &mut Cursor, fields: &[&InformationElement], depth: usize, diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<Flow>, Error> {
        let mut flows = vec![];
        if fields.is_empty() {
            return Ok(flows);
        }

        let min_length: usize = fields.iter().map(|field| field.min_length()).sum();

        while !content.is_empty() {
            if content.remaining() < min_length && content.rest().iter().all(|b| *b == 0) {
                debug!("Ignoring {} bytes of data set padding", content.remaining());
                break;
            }

            let start = content.position();
            flows.push(self.read_record(content, fields, depth, diagnostics)?);

            // zero length fields only, nothing more can be read
            if content.position() == start {
                break;
            }
        }

        Ok(flows)
    }

    fn read_record(&self, cursor: &mut Cursor, fields: &[&InformationElement], depth: usize, diagnostics: &mut Vec<Diagnostic>) -> Result<Flow, Error> {
        let mut flow = Flow::default();

        for field in fields {
            self.read_field(cursor, field, depth, &mut flow, diagnostics)?;
        }

        Ok(flow)
    }

    fn read_field(&self, cursor: &mut Cursor, field: &InformationElement, depth: usize, flow: &mut Flow, diagnostics: &mut Vec<Diagnostic>) -> Result<(), Error> {
        let definition = match self.registry.lookup(field.id, field.enterprise_number) {
            Some(definition) => definition,
            None => return self.skip_unknown(cursor, field, diagnostics),
        };

        match definition.data_type {
            DataType::BasicList => self.read_basic_list(cursor, field, depth, flow, diagnostics),
            DataType::SubTemplateList => self.read_sub_template_list(cursor, field, &definition.name, depth, flow, diagnostics),
            DataType::SubTemplateMultiList => {
                let length = list_length(cursor, field)?;
                cursor.skip(length)?;
                warn!("subTemplateMultiList {} is not supported, skipping data ({} bytes)", definition.name, length);
                diagnostics.push(Diagnostic::UnsupportedConstruct { field: definition.name.clone(), length });
                Ok(())
            }
            data_type => {
                let value = decode_value(data_type, field.length, cursor)?;
                flow.insert(definition.name.clone(), value);
                Ok(())
            }
        }
    }

    fn skip_unknown(&self, cursor: &mut Cursor, field: &InformationElement, diagnostics: &mut Vec<Diagnostic>) -> Result<(), Error> {
        if self.options.unknown_elements == UnknownElementPolicy::Fail {
            return Err(Error::UnknownInformationElement { id: field.id, enterprise_number: field.enterprise_number });
        }

        let length = field_length(field.length, cursor)?;
        cursor.skip(length)?;

        let diagnostic = Diagnostic::SkippedUnknownElement { id: field.id, enterprise_number: field.enterprise_number };
        if !diagnostics.contains(&diagnostic) {
            debug!("Skipping unknown information element {} (enterprise {})", field.id, field.enterprise_number);
            diagnostics.push(diagnostic);
        }

        Ok(())
    }

    /// from https://tools.ietf.org/html/rfc6313
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |    Semantic   |1|         Field ID            |   Element...  |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// | ...Length     |           Enterprise Number ...               |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |      ...      |              basicList Content ...            |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    fn read_basic_list(&self, cursor: &mut Cursor, field: &InformationElement, depth: usize, flow: &mut Flow, diagnostics: &mut Vec<Diagnostic>) -> Result<(), Error> {
        let depth = self.enter(depth)?;
        let length = list_length(cursor, field)?;
        let mut list = cursor.sub_cursor(length)?;

        let semantic = Semantic::read(&mut list)?;
        let element = InformationElement::read(&mut list)?;
        debug!("Reading basicList of element {} ({:?}), {} bytes", element.id, semantic, list.remaining());

        if !element.is_variable_length() && (element.length == 0 || list.remaining() % element.length as usize != 0) {
            return Err(Error::InvalidListLength { length: list.remaining(), element_length: element.length as usize });
        }

        let mut index = 0;
        while !list.is_empty() {
            let mut entry = Flow::default();
            self.read_field(&mut list, &element, depth, &mut entry, diagnostics)?;

            for (name, value) in entry.fields {
                flow.insert(format!("{}_{}", name, index), value);
            }
            index += 1;
        }

        Ok(())
    }

    /// from https://tools.ietf.org/html/rfc6313
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |   Semantic    |         Template ID           |     ...       |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |                subTemplateList Content    ...                 |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    fn read_sub_template_list(
        &self,
        cursor: &mut Cursor,
        field: &InformationElement,
        name: &str,
        depth: usize,
        flow: &mut Flow,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), Error> {
        let depth = self.enter(depth)?;
        let length = list_length(cursor, field)?;
        let mut list = cursor.sub_cursor(length)?;

        let semantic = Semantic::read(&mut list)?;
        let template_id = list.read_u16()?;

        let template = match self.templates.get(template_id) {
            Some(template) => template,
            None => {
                error!(
                    "Unable to parse subTemplateList {}, template {} is unknown, skipping data ({} bytes)",
                    name,
                    template_id,
                    list.remaining()
                );
                diagnostics.push(Diagnostic::MissingNestedTemplate { template_id, field: name.to_string() });
                return Ok(());
            }
        };

        debug!("Reading subTemplateList {} of template {} ({:?}), {} bytes", name, template_id, semantic, list.remaining());
        let rows = self.read_records(&mut list, &template.fields(), depth, diagnostics)?;

        for (row, nested) in rows.into_iter().enumerate() {
            for (nested_name, value) in nested.fields {
                flow.insert(format!("{}_{}_{}", name, row, nested_name), value);
            }
        }

        Ok(())
    }

    fn enter(&self, depth: usize) -> Result<usize, Error> {
        if depth >= self.options.max_nesting_depth {
            return Err(Error::NestingTooDeep(self.options.max_nesting_depth));
        }

        Ok(depth + 1)
    }
}

/// Lists carry their own length prefix, variable length encoded when the template says so.
fn list_length(cursor: &mut Cursor, field: &InformationElement) -> Result<usize, Error> {
    if field.is_variable_length() {
        cursor.read_var_length()
    } else {
        cursor.read_u8().map(|length| length as usize)
    }
}
