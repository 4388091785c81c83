use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

mod iana;

/******************************** DATA TYPE ********************************/

/// Abstract data types of information elements, numbered as in the IANA
/// "IPFIX Information Element Data Types" registry (RFC 7011 Sec 6.1, RFC 6313).
#[derive(FromPrimitive, PartialEq, Eq, Hash, Debug, Copy, Clone)]
#[repr(u8)]
pub enum DataType {
    OctetArray = 0,
    Unsigned8 = 1,
    Unsigned16 = 2,
    Unsigned32 = 3,
    Unsigned64 = 4,
    Signed8 = 5,
    Signed16 = 6,
    Signed32 = 7,
    Signed64 = 8,
    Float32 = 9,
    Float64 = 10,
    Boolean = 11,
    MacAddress = 12,
    String = 13,
    DateTimeSeconds = 14,
    DateTimeMilliseconds = 15,
    DateTimeMicroseconds = 16,
    DateTimeNanoseconds = 17,
    Ipv4Address = 18,
    Ipv6Address = 19,
    BasicList = 20,
    SubTemplateList = 21,
    SubTemplateMultiList = 22,
}

const DATA_TYPE_NAMES: [(DataType, &str); 23] = [
    (DataType::OctetArray, "octetArray"),
    (DataType::Unsigned8, "unsigned8"),
    (DataType::Unsigned16, "unsigned16"),
    (DataType::Unsigned32, "unsigned32"),
    (DataType::Unsigned64, "unsigned64"),
    (DataType::Signed8, "signed8"),
    (DataType::Signed16, "signed16"),
    (DataType::Signed32, "signed32"),
    (DataType::Signed64, "signed64"),
    (DataType::Float32, "float32"),
    (DataType::Float64, "float64"),
    (DataType::Boolean, "boolean"),
    (DataType::MacAddress, "macAddress"),
    (DataType::String, "string"),
    (DataType::DateTimeSeconds, "dateTimeSeconds"),
    (DataType::DateTimeMilliseconds, "dateTimeMilliseconds"),
    (DataType::DateTimeMicroseconds, "dateTimeMicroseconds"),
    (DataType::DateTimeNanoseconds, "dateTimeNanoseconds"),
    (DataType::Ipv4Address, "ipv4Address"),
    (DataType::Ipv6Address, "ipv6Address"),
    (DataType::BasicList, "basicList"),
    (DataType::SubTemplateList, "subTemplateList"),
    (DataType::SubTemplateMultiList, "subTemplateMultiList"),
];

impl DataType {
    pub fn name(&self) -> &'static str {
        DATA_TYPE_NAMES.iter().find(|(t, _)| t == self).map(|(_, n)| *n).unwrap_or("unknown")
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self, DataType::BasicList | DataType::SubTemplateList | DataType::SubTemplateMultiList)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    /// Definition files spell types in any case (`ipv4address`, `ipv4Address`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DATA_TYPE_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(s))
            .map(|(t, _)| *t)
            .ok_or_else(|| Error::Definitions(format!("unknown data type '{}'", s)))
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/******************************** DEFINITIONS ********************************/

#[derive(Debug, Clone, PartialEq)]
pub struct InformationElementDefinition {
    pub id: u16,
    pub enterprise_number: u32,
    pub name: String,
    pub data_type: DataType,
}

/// Resolves the type and name of the information elements used in templates.
///
/// The decoder only ever reads from it, one registry can be shared by any number of parsers.
pub trait InformationElementRegistry {
    fn lookup(&self, id: u16, enterprise_number: u32) -> Option<&InformationElementDefinition>;
}

impl<R: InformationElementRegistry + ?Sized> InformationElementRegistry for &R {
    fn lookup(&self, id: u16, enterprise_number: u32) -> Option<&InformationElementDefinition> {
        (**self).lookup(id, enterprise_number)
    }
}

impl<R: InformationElementRegistry + ?Sized> InformationElementRegistry for std::sync::Arc<R> {
    fn lookup(&self, id: u16, enterprise_number: u32) -> Option<&InformationElementDefinition> {
        (**self).lookup(id, enterprise_number)
    }
}

/// Layout of a definition file, one enterprise per file:
/// ```json
/// { "enterprise_number": 3054,
///   "information_elements": [ { "element_id": 110, "name": "l7ApplicationId", "data_type": "unsigned32" } ] }
/// ```
#[derive(Deserialize, Debug)]
struct DefinitionFile {
    #[serde(default)]
    enterprise_number: u32,
    information_elements: Vec<DefinitionEntry>,
}

#[derive(Deserialize, Debug)]
struct DefinitionEntry {
    element_id: u16,
    name: String,
    data_type: DataType,
}

/// Table backed registry: the IANA elements plus whatever enterprise definitions get loaded.
#[derive(Debug, Default, Clone)]
pub struct Definitions {
    elements: HashMap<(u32, u16), InformationElementDefinition>,
}

impl Definitions {
    /// An empty registry, every lookup fails.
    pub fn new() -> Self {
        Definitions::default()
    }

    /// The IANA assigned information elements (enterprise number 0).
    pub fn iana() -> Self {
        let mut definitions = Definitions::new();
        for (id, name, data_type) in iana::ELEMENTS {
            definitions.insert(InformationElementDefinition {
                id: *id,
                enterprise_number: 0,
                name: name.to_string(),
                data_type: *data_type,
            });
        }

        definitions
    }

    /// Adds or replaces a definition.
    pub fn insert(&mut self, definition: InformationElementDefinition) {
        self.elements.insert((definition.enterprise_number, definition.id), definition);
    }

    /// Loads a JSON definition file, returns the number of elements read.
    pub fn load_json(&mut self, json: &str) -> Result<usize, Error> {
        let file: DefinitionFile = serde_json::from_str(json).map_err(|e| Error::Definitions(e.to_string()))?;
        let count = file.information_elements.len();

        for entry in file.information_elements {
            self.insert(InformationElementDefinition {
                id: entry.element_id,
                enterprise_number: file.enterprise_number,
                name: entry.name,
                data_type: entry.data_type,
            });
        }

        Ok(count)
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, Error> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::Definitions(format!("{}: {}", path.display(), e)))?;
        let count = self.load_json(&json)?;
        log::info!("Loaded {} information element definitions from {}", count, path.display());

        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl InformationElementRegistry for Definitions {
    fn lookup(&self, id: u16, enterprise_number: u32) -> Option<&InformationElementDefinition> {
        self.elements.get(&(enterprise_number, id))
    }
}
