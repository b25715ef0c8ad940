//! Configuration file loading.
//!
//! Settings structs live in [`super::settings`], parsing in
//! [`super::parser`]. The file is plain INI; the active section is chosen
//! at the command line so several bridge processes can share one file.

use std::path::Path;

use ini::Ini;
use thiserror::Error;

pub use super::settings::Settings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A key the bridge cannot run without was never supplied
    #[error("required configuration missing: {key} (config file or environment)")]
    MissingValue { key: String },
}

impl Settings {
    /// Load the given section from a config file.
    ///
    /// A missing file yields pure defaults; broker validation later decides
    /// whether those are enough to run with.
    pub fn load_from(path: &Path, section: &str) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini, section)
    }
}
