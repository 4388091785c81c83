//! IPFIX (RFC 7011) message decoding.

pub mod data;
pub mod header;
pub mod parser;
pub mod shallow;
pub mod template;
pub mod value;

pub use data::{Diagnostic, Flow, Semantic};
pub use header::{MessageHeader, SetHeader, VERSION};
pub use parser::{IpfixMessage, IpfixParser, ParserOptions, UnknownElementPolicy};
pub use shallow::{MessageDescription, ShallowDataSet};
pub use template::{parse_options_template_record, parse_template_record, InformationElement, OptionsTemplateRecord, Template, TemplateMap, TemplateRecord};
pub use value::{FieldValue, VARIABLE_LENGTH};
