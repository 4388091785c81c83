#[macro_use]
extern crate serde_derive;

use ipfix_decoder::{Definitions, IpfixParser};
use log::{error, info};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use structopt::StructOpt;

mod collector;
mod logger;
mod settings;

use collector::{Collector, FlowRecord, MessageSplitter, MessageSummary};

#[derive(Debug, StructOpt)]
#[structopt(name = "ipfix-decode", about = "Decode files of IPFIX messages into JSON flows")]
struct Opts {
    /// Settings file (toml, json, yaml or ini)
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Enterprise information element definitions, loaded after the ones from the settings
    #[structopt(short, long = "definitions", parse(from_os_str))]
    definitions: Vec<PathBuf>,

    /// Only describe each message: declared templates and the templates its data sets use
    #[structopt(long)]
    shallow: bool,

    /// Files of back to back IPFIX messages
    #[structopt(name = "FILE", parse(from_os_str), required = true)]
    files: Vec<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid log level: {0}")]
    LogLevel(#[from] log::ParseLevelError),
    #[error("failed to init the logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Definitions(#[from] ipfix_decoder::Error),
    #[error("failed to read {path}: {source}")]
    Input { path: PathBuf, source: io::Error },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    let opts = Opts::from_args();

    if let Err(e) = run(&opts) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(opts: &Opts) -> Result<(), AppError> {
    // read config from file
    let settings = settings::Settings::init(opts.config.as_deref())?;

    // init the env logger
    logger::init(&settings.log.level)?;

    info!("Starting ipfix-decode");

    let mut definitions = Definitions::iana();
    for path in settings.definitions.files.iter().chain(opts.definitions.iter()) {
        definitions.load_file(path)?;
    }

    let parser = IpfixParser::with_options(definitions, settings.parser);
    let mut collector = Collector::with_max_pending(parser, settings.collector.max_pending);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for path in &opts.files {
        let buf = fs::read(path).map_err(|source| AppError::Input { path: path.clone(), source })?;
        info!("Reading {} ({} bytes)", path.display(), buf.len());

        for message in MessageSplitter::new(&buf) {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    error!("Invalid message framing in {}: {}", path.display(), e);
                    break;
                }
            };

            if opts.shallow {
                match collector.parser().shallow_parse_message(message) {
                    Ok(description) => writeln!(out, "{}", serde_json::to_string(&MessageSummary::from(&description))?)?,
                    Err(e) => error!("Error while parsing ipfix msg: {}", e),
                }
                continue;
            }

            for result in collector.push(message) {
                match result {
                    Ok(decoded) => {
                        for record in FlowRecord::from_message(&decoded) {
                            writeln!(out, "{}", serde_json::to_string(&record)?)?;
                        }
                    }
                    Err(e) => error!("Error while parsing ipfix msg: {}", e),
                }
            }
        }
    }

    let dropped = collector.finish();
    info!("Closing ipfix-decode, {} messages dropped for lack of templates", dropped);

    Ok(())
}
