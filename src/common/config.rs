//! read-only settings loaded from settings.json
//!
//! The client only ever reads from this.  Values that are not in the file
//! fall back to the defaults handed in at build time, so a missing or
//! unparseable file just means "run with defaults".
use json::JsonValue;
use log::{info, warn};
use regex::Regex;
use std::{error::Error, fmt, io::ErrorKind};

#[derive(Debug)]
pub struct MissingConfigError {
    key: String,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Required configuration value '{}' is missing", self.key)
    }
}

impl Error for MissingConfigError {}

pub struct Config {
    filename: String,
    settings: JsonValue,
    defaults: JsonValue,
}

impl Config {
    pub fn build(filename: String, defaults: JsonValue) -> Result<Config, std::io::Error> {
        // Filename must be a plain json file, no path separators or shell junk
        let filename_regex = Regex::new(r"^[a-zA-Z0-9_\-\.]+\.json$").unwrap();
        if !filename_regex.is_match(&filename) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid filename '{}' - must contain only letters, numbers, underscore, dash, dot and end in .json", filename),
            ));
        }

        let mut config = Config {
            filename,
            settings: json::object! {},
            defaults,
        };

        if let Err(err) = config.load_from_file() {
            warn!("Using default settings: {}", err);
        }

        Ok(config)
    }

    fn load_from_file(&mut self) -> std::io::Result<()> {
        let raw_data = std::fs::read_to_string(&self.filename)?;
        match json::parse(&raw_data) {
            Ok(parsed) => {
                self.settings.clone_from(&parsed);
                info!("Loaded settings from {}", self.filename);
            }
            Err(err) => {
                warn!("Failed to parse config file {}: {}", self.filename, err);
            }
        }
        Ok(())
    }

    pub fn get_str_value(&self, key: &str, default: Option<String>) -> Result<String, MissingConfigError> {
        if let Some(val) = self.settings[key].as_str() {
            return Ok(val.to_string());
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_str() {
            return Ok(val.to_string());
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn get_bool_value(&self, key: &str, default: Option<bool>) -> Result<bool, MissingConfigError> {
        if let Some(val) = self.settings[key].as_bool() {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_bool() {
            return Ok(val);
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn get_u32_value(&self, key: &str, default: Option<u32>) -> Result<u32, MissingConfigError> {
        if let Some(val) = self.settings[key].as_u32() {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_u32() {
            return Ok(val);
        }
        Err(MissingConfigError { key: key.to_string() })
    }
}
