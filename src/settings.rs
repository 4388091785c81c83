use config::{Config, ConfigError, Environment, File};
use ipfix_decoder::ParserOptions;
use std::path::{Path, PathBuf};

use crate::collector::DEFAULT_MAX_PENDING;

#[derive(Debug, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct DefinitionFiles {
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CollectorSettings {
    pub max_pending: usize,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub parser: ParserOptions,
    pub definitions: DefinitionFiles,
    pub collector: CollectorSettings,
}

impl Settings {
    /// Defaults, overloaded by the optional config file, then by `IPFIX_*` environment variables
    /// (`IPFIX_LOG__LEVEL=debug`, `IPFIX_PARSER__UNKNOWN_ELEMENTS=skip`).
    pub fn init(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut s = Self::defaults()?;

        if let Some(file) = config_file {
            s.merge(File::from(file))?;
        }
        s.merge(Environment::with_prefix("IPFIX").separator("__"))?;

        // freeze the configuration
        s.try_into()
    }

    fn defaults() -> Result<Config, ConfigError> {
        let mut s = Config::new();
        s.set_default("log.level", "info")?;
        s.set_default("parser.max_nesting_depth", ParserOptions::DEFAULT_MAX_NESTING_DEPTH as i64)?;
        s.set_default("parser.unknown_elements", "fail")?;
        s.set_default("definitions.files", Vec::<String>::new())?;
        s.set_default("collector.max_pending", DEFAULT_MAX_PENDING as i64)?;

        Ok(s)
    }
}
