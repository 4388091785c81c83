use crate::registry::DataType;

/// Everything that can abort the decoding of a message, a set or a record.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid IPFIX version, expected 10 but read {0}")]
    InvalidVersion(u16),
    #[error("buffer does not contain the complete IPFIX message, header declares {declared} bytes but {available} were received")]
    IncompleteMessage { declared: usize, available: usize },
    #[error("not enough space in buffer, required {needed} bytes but only {remaining} remain")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("invalid set id in IPFIX message: {0}")]
    InvalidSetId(u16),
    #[error("invalid length {length} for set {set_id}")]
    InvalidSetLength { set_id: u16, length: u16 },
    #[error("options template {template_id} declares {scope_field_count} scope fields out of {field_count}")]
    InvalidScopeFieldCount { template_id: u16, field_count: u16, scope_field_count: u16 },
    #[error("missing template for data set using template id {0}, cannot parse data set")]
    MissingTemplate(u16),
    #[error("unexpected length {length} for {data_type} value")]
    InvalidLength { data_type: DataType, length: usize },
    #[error("invalid value for boolean: {0}")]
    InvalidBooleanValue(u8),
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(i64),
    #[error("wrong data length {length} in list of {element_length} byte elements")]
    InvalidListLength { length: usize, element_length: usize },
    #[error("illegal semantics value {0}")]
    InvalidSemantic(u8),
    #[error("no information element definition for id {id} (enterprise {enterprise_number})")]
    UnknownInformationElement { id: u16, enterprise_number: u32 },
    #[error("nested lists exceed the maximum depth of {0}")]
    NestingTooDeep(usize),
    #[error("failed to decode fixed structure: {0}")]
    Decode(String),
    #[error("invalid information element definitions: {0}")]
    Definitions(String),
}

/// A fatal decoding error tagged with the message it happened in.
///
/// `sequence_number` and `observation_domain_id` are only known once the 16 header bytes could be read.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{}: {kind}", origin(.sequence_number, .observation_domain_id))]
pub struct MessageError {
    pub sequence_number: Option<u32>,
    pub observation_domain_id: Option<u32>,
    #[source]
    pub kind: Error,
}

impl MessageError {
    pub fn new(kind: Error) -> Self {
        MessageError { sequence_number: None, observation_domain_id: None, kind }
    }

    pub fn with_header(kind: Error, sequence_number: u32, observation_domain_id: u32) -> Self {
        MessageError {
            sequence_number: Some(sequence_number),
            observation_domain_id: Some(observation_domain_id),
            kind,
        }
    }
}

fn origin(sequence_number: &Option<u32>, observation_domain_id: &Option<u32>) -> String {
    match (sequence_number, observation_domain_id) {
        (Some(seq), Some(domain)) => format!("message {} from observation domain {}", seq, domain),
        _ => "message without readable header".to_string(),
    }
}
