//! Bridge configuration.
//!
//! Tokay reads an INI file (default `/etc/vfd/vfd.cfg`) in which every key
//! is looked up first in the section selected with `-s` (default `tokay`)
//! and then in `[default]`. Broker credentials may instead come from the
//! `TOKAY_RMQUNAME` / `TOKAY_RMQPW` environment variables, which win over
//! the file.
//!
//! # Example
//!
//! ```ignore
//! use tokay::config::Settings;
//!
//! let mut settings = Settings::load_from(path, "tokay")?;
//! settings.apply_env_overrides();
//! settings.broker.validate()?;
//! ```

mod file;
mod parser;
mod settings;

pub use file::{ConfigFileError, Settings};
pub use settings::{
    BrokerSettings, ExchangeSpec, PipeSettings, TimingSettings, DEFAULT_BROKER_PORT,
    DEFAULT_CONFIG_PATH, DEFAULT_CONF_DIR, DEFAULT_ORPHAN_TTL_SECS, DEFAULT_REPLY_TIMEOUT_SECS,
    DEFAULT_REQUEST_EXCHANGE, DEFAULT_REQUEST_FIFO, DEFAULT_RESPONSE_EXCHANGE,
    DEFAULT_RESPONSE_FIFO, DEFAULT_SECTION, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_VERBOSE,
    ENV_BROKER_PASSWORD, ENV_BROKER_USERNAME,
};
