//! Settings structs and built-in defaults.
//!
//! Values come from the INI config file (see [`super::parser`]), with the
//! environment allowed to override broker credentials so they never have to
//! live on disk.

use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file consulted when `-c` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vfd/vfd.cfg";

/// Default config section consulted when `-s` is not given. Parallel bridge
/// processes against the same file pick distinct sections.
pub const DEFAULT_SECTION: &str = "tokay";

/// Environment variable overriding the broker username.
pub const ENV_BROKER_USERNAME: &str = "TOKAY_RMQUNAME";

/// Environment variable overriding the broker password.
pub const ENV_BROKER_PASSWORD: &str = "TOKAY_RMQPW";

pub const DEFAULT_REQUEST_FIFO: &str = "/var/lib/vfd/request.fifo";
pub const DEFAULT_RESPONSE_FIFO: &str = "/var/lib/vfd/fifos/tokay.fifo";
pub const DEFAULT_CONF_DIR: &str = "/var/lib/vfd/config";
pub const DEFAULT_BROKER_PORT: u16 = 5672;
pub const DEFAULT_REQUEST_EXCHANGE: &str = "tokay_req";
pub const DEFAULT_RESPONSE_EXCHANGE: &str = "tokay_resp";
pub const DEFAULT_VERBOSE: u8 = 1;

/// How long a forwarded request may wait for its VFd response.
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 15;

/// Period of the responder's timeout sweep tick.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

/// How long an unmatched VFd blob is parked before being discarded.
pub const DEFAULT_ORPHAN_TTL_SECS: u64 = 60;

/// Complete bridge configuration for one config section.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory for the rolling log file; stdout only when unset.
    pub log_dir: Option<PathBuf>,
    /// Log verbosity 0..=3; the command line may raise it.
    pub verbose: u8,
    /// VFd pipe locations.
    pub pipes: PipeSettings,
    /// Where `add` requests stash their JSON config files.
    pub conf_dir: PathBuf,
    /// Broker connection and exchange layout.
    pub broker: BrokerSettings,
    /// Correlation timing knobs.
    pub timing: TimingSettings,
}

/// VFd pipe locations.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeSettings {
    /// Pipe VFd listens on for requests; must already exist.
    pub request: PathBuf,
    /// Pipe the bridge reads responses from; created if missing.
    pub response: PathBuf,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Broker host; required.
    pub host: String,
    /// Broker port; `-P` overrides.
    pub port: u16,
    /// Username; required, env may supply.
    pub username: String,
    /// Password; required, env may supply.
    pub password: String,
    /// One collector is started per request exchange.
    pub request_exchanges: Vec<ExchangeSpec>,
    /// Exchange replies are published to.
    pub response_exchange: ExchangeSpec,
}

/// Correlation timing knobs (defaults match the protocol contract).
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSettings {
    pub reply_timeout: Duration,
    pub sweep_interval: Duration,
    pub orphan_ttl: Duration,
}

/// An exchange reference of the form `name[:key]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub key: String,
}

impl ExchangeSpec {
    /// Parse `name[:key]`; an empty name yields `None`, an absent or empty
    /// key falls back to `default_key`.
    pub fn parse(spec: &str, default_key: &str) -> Option<Self> {
        let (name, key) = match spec.split_once(':') {
            Some((name, key)) => (name.trim(), key.trim()),
            None => (spec.trim(), ""),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            key: if key.is_empty() {
                default_key.to_string()
            } else {
                key.to_string()
            },
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: None,
            verbose: DEFAULT_VERBOSE,
            pipes: PipeSettings::default(),
            conf_dir: PathBuf::from(DEFAULT_CONF_DIR),
            broker: BrokerSettings::default(),
            timing: TimingSettings::default(),
        }
    }
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            request: PathBuf::from(DEFAULT_REQUEST_FIFO),
            response: PathBuf::from(DEFAULT_RESPONSE_FIFO),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_BROKER_PORT,
            username: String::new(),
            password: String::new(),
            request_exchanges: vec![ExchangeSpec {
                name: DEFAULT_REQUEST_EXCHANGE.to_string(),
                key: DEFAULT_REQUEST_EXCHANGE.to_string(),
            }],
            response_exchange: ExchangeSpec {
                name: DEFAULT_RESPONSE_EXCHANGE.to_string(),
                key: "response".to_string(),
            },
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(DEFAULT_REPLY_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            orphan_ttl: Duration::from_secs(DEFAULT_ORPHAN_TTL_SECS),
        }
    }
}

impl Settings {
    /// Let the environment supply broker credentials; environment wins over
    /// anything the config file carried.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var(ENV_BROKER_USERNAME) {
            if !user.is_empty() {
                self.broker.username = user;
            }
        }
        if let Ok(password) = std::env::var(ENV_BROKER_PASSWORD) {
            if !password.is_empty() {
                self.broker.password = password;
            }
        }
    }
}

impl BrokerSettings {
    /// Check that everything a connection needs is present.
    pub fn validate(&self) -> Result<(), super::ConfigFileError> {
        for (key, value) in [
            ("mqhost", &self.host),
            ("mquser", &self.username),
            ("mqpw", &self.password),
        ] {
            if value.is_empty() {
                return Err(super::ConfigFileError::MissingValue {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_spec_forms() {
        let bare = ExchangeSpec::parse("tokay_req", "dflt").unwrap();
        assert_eq!(bare.name, "tokay_req");
        assert_eq!(bare.key, "dflt");

        let keyed = ExchangeSpec::parse("requests:hot", "dflt").unwrap();
        assert_eq!(keyed.name, "requests");
        assert_eq!(keyed.key, "hot");

        let trailing_colon = ExchangeSpec::parse("requests:", "dflt").unwrap();
        assert_eq!(trailing_colon.key, "dflt");

        assert!(ExchangeSpec::parse("", "dflt").is_none());
        assert!(ExchangeSpec::parse("  :key", "dflt").is_none());
    }

    #[test]
    fn validate_reports_first_missing_broker_key() {
        let mut broker = BrokerSettings {
            host: "mq.example.net".to_string(),
            username: "scott".to_string(),
            password: "tiger".to_string(),
            ..BrokerSettings::default()
        };
        assert!(broker.validate().is_ok());

        broker.password.clear();
        let err = broker.validate().unwrap_err();
        assert!(err.to_string().contains("mqpw"));
    }

    #[test]
    fn defaults_match_contract() {
        let settings = Settings::default();
        assert_eq!(settings.timing.reply_timeout, Duration::from_secs(15));
        assert_eq!(settings.timing.sweep_interval, Duration::from_secs(5));
        assert_eq!(settings.broker.port, 5672);
        assert_eq!(settings.pipes.request, PathBuf::from(DEFAULT_REQUEST_FIFO));
    }
}
