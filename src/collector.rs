use chrono::{DateTime, Utc};
use ipfix_decoder::cursor::Cursor;
use ipfix_decoder::ipfix::{parse_options_template_record, parse_template_record, MessageHeader, Template};
use ipfix_decoder::{Error, Flow, InformationElementRegistry, IpfixMessage, IpfixParser, MessageDescription, MessageError, TemplateMap};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/******************************** MESSAGE SPLITTER ********************************/

/// Cuts a buffer of back to back messages (RFC 5655 file layout) using the header length field.
pub struct MessageSplitter<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> MessageSplitter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        MessageSplitter { rest: buf, failed: false }
    }

    fn next_message(&mut self) -> Result<&'a [u8], Error> {
        let mut header = Cursor::new(self.rest);
        header.skip(2)?;
        let length = header.read_u16()? as usize;

        if length < MessageHeader::SIZE {
            return Err(Error::IncompleteMessage { declared: length, available: self.rest.len() });
        }
        if length > self.rest.len() {
            return Err(Error::UnexpectedEnd { needed: length, remaining: self.rest.len() });
        }

        let (message, rest) = self.rest.split_at(length);
        self.rest = rest;
        Ok(message)
    }
}

impl<'a> Iterator for MessageSplitter<'a> {
    type Item = Result<&'a [u8], Error>;

    /// Stops after the first framing error, nothing after it can be trusted.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }

        let result = self.next_message();
        self.failed = result.is_err();
        Some(result)
    }
}

/******************************** OUTPUT ********************************/

/// One decoded flow with the identifiers of the message it came from.
#[derive(Debug, Serialize)]
pub struct FlowRecord<'a> {
    pub export_time: DateTime<Utc>,
    pub observation_domain_id: u32,
    pub sequence_number: u32,
    pub flow: &'a Flow,
}

impl<'a> FlowRecord<'a> {
    pub fn from_message(message: &'a IpfixMessage) -> impl Iterator<Item = FlowRecord<'a>> {
        message.flows.iter().map(move |flow| FlowRecord {
            export_time: message.header.export_time,
            observation_domain_id: message.header.observation_domain_id,
            sequence_number: message.header.sequence_number,
            flow,
        })
    }
}

/// What a shallow parse tells about a message.
#[derive(Debug, Serialize, PartialEq)]
pub struct MessageSummary {
    pub export_time: DateTime<Utc>,
    pub observation_domain_id: u32,
    pub sequence_number: u32,
    pub templates: Vec<u16>,
    pub options_templates: Vec<u16>,
    pub referenced_templates: Vec<u16>,
    pub undeclared_templates: Vec<u16>,
}

impl From<&MessageDescription> for MessageSummary {
    fn from(description: &MessageDescription) -> Self {
        MessageSummary {
            export_time: description.header.export_time,
            observation_domain_id: description.header.observation_domain_id,
            sequence_number: description.header.sequence_number,
            templates: description.declared_template_ids(),
            options_templates: description.declared_options_template_ids(),
            referenced_templates: description.referenced_template_ids(),
            undeclared_templates: description.missing_template_ids(&HashSet::new()),
        }
    }
}

/******************************** COLLECTOR ********************************/

/// Messages held back per observation domain unless configured otherwise.
pub const DEFAULT_MAX_PENDING: usize = 1024;

struct PendingMessage {
    observation_domain_id: u32,
    sequence_number: u32,
    missing: Vec<u16>,
    buf: Vec<u8>,
}

/// Keeps the templates of every observation domain and holds back messages whose data sets
/// use templates that haven't been received yet.
///
/// At most `max_pending` messages are held back per observation domain, the oldest one is
/// dropped to make room for a new one.
pub struct Collector<R> {
    parser: IpfixParser<R>,
    domains: HashMap<u32, TemplateMap>,
    pending: Vec<PendingMessage>,
    max_pending: usize,
    dropped: usize,
}

impl<R: InformationElementRegistry> Collector<R> {
    pub fn with_max_pending(parser: IpfixParser<R>, max_pending: usize) -> Self {
        Collector { parser, domains: HashMap::new(), pending: vec![], max_pending, dropped: 0 }
    }

    /// Handles one message, returns it decoded along with every held back message it unblocked.
    pub fn push(&mut self, buf: &[u8]) -> Vec<Result<IpfixMessage, MessageError>> {
        let description = match self.parser.shallow_parse_message(buf) {
            Ok(description) => description,
            Err(e) => return vec![Err(e)],
        };
        let domain_id = description.header.observation_domain_id;

        if let Err(kind) = self.learn_templates(&description) {
            return vec![Err(description.header.error(kind))];
        }

        let mut results = vec![];
        let missing = description.missing_template_ids(&self.known_template_ids(domain_id));

        if missing.is_empty() {
            results.push(self.parse(buf, domain_id));
        } else {
            info!(
                "Holding back message {} from observation domain {}, missing templates {:?}",
                description.header.sequence_number, domain_id, missing
            );
            self.make_room(domain_id);
            self.pending.push(PendingMessage {
                observation_domain_id: domain_id,
                sequence_number: description.header.sequence_number,
                missing,
                buf: buf.to_vec(),
            });
        }

        results.extend(self.release_pending());
        results
    }

    pub fn parser(&self) -> &IpfixParser<R> {
        &self.parser
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Gives up on the messages still held back, returns how many were dropped overall.
    pub fn finish(self) -> usize {
        for message in &self.pending {
            warn!(
                "Dropping message {} from observation domain {}, templates {:?} never received",
                message.sequence_number, message.observation_domain_id, message.missing
            );
        }

        self.dropped + self.pending.len()
    }

    fn make_room(&mut self, domain_id: u32) {
        let held = self.pending.iter().filter(|message| message.observation_domain_id == domain_id).count();
        if held < self.max_pending {
            return;
        }

        if let Some(pos) = self.pending.iter().position(|message| message.observation_domain_id == domain_id) {
            let message = self.pending.remove(pos);
            warn!(
                "Dropping message {} from observation domain {}, {} messages already held back, templates {:?} not received",
                message.sequence_number, domain_id, held, message.missing
            );
            self.dropped += 1;
        }
    }

    fn learn_templates(&mut self, description: &MessageDescription) -> Result<(), Error> {
        let templates = self.domains.entry(description.header.observation_domain_id).or_insert_with(TemplateMap::new);

        for id in description.declared_template_ids() {
            if let Some(bytes) = description.template_record(id) {
                templates.insert(id, Template::Data(parse_template_record(bytes)?));
            }
        }

        for id in description.declared_options_template_ids() {
            if let Some(bytes) = description.options_template_record(id) {
                templates.insert(id, Template::Options(parse_options_template_record(bytes)?));
            }
        }

        Ok(())
    }

    fn known_template_ids(&self, domain_id: u32) -> HashSet<u16> {
        self.domains.get(&domain_id).map(|templates| templates.keys().copied().collect()).unwrap_or_default()
    }

    fn parse(&self, buf: &[u8], domain_id: u32) -> Result<IpfixMessage, MessageError> {
        let empty = TemplateMap::new();
        let templates = self.domains.get(&domain_id).unwrap_or(&empty);
        let message = self.parser.parse_message(buf, templates)?;

        for diagnostic in &message.diagnostics {
            debug!("message {}: {}", message.header.sequence_number, diagnostic);
        }

        Ok(message)
    }

    fn release_pending(&mut self) -> Vec<Result<IpfixMessage, MessageError>> {
        let mut results = vec![];
        let mut still_pending = vec![];

        for message in std::mem::take(&mut self.pending) {
            let known = self.known_template_ids(message.observation_domain_id);
            if message.missing.iter().all(|id| known.contains(id)) {
                debug!("Releasing message {} from observation domain {}", message.sequence_number, message.observation_domain_id);
                results.push(self.parse(&message.buf, message.observation_domain_id));
            } else {
                still_pending.push(message);
            }
        }

        self.pending = still_pending;
        results
    }
}
