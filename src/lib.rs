#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate num_derive;

pub mod cursor;
pub mod error;
pub mod ipfix;
pub mod registry;

pub use error::{Error, MessageError};
pub use ipfix::{FieldValue, Flow, IpfixMessage, IpfixParser, MessageDescription, ParserOptions, TemplateMap};
pub use registry::{DataType, Definitions, InformationElementDefinition, InformationElementRegistry};
