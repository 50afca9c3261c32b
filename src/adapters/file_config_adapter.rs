//! INI file configuration adapter.

use crate::domain::error::ChaintraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

/// Label used in errors for configuration parsed from memory.
const INLINE_SOURCE: &str = "<inline>";

pub struct FileConfigAdapter {
    config: Ini,
}

fn parse_error(file: impl Into<String>, reason: String) -> ChaintraderError {
    ChaintraderError::ConfigParse {
        file: file.into(),
        reason,
    }
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ChaintraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| parse_error(path.display().to_string(), reason))?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ChaintraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| parse_error(INLINE_SOURCE, reason))?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}
