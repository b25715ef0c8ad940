//! INI parsing logic for converting `Ini` → [`Settings`].
//!
//! This is the single place where INI key names are mapped to struct fields.
//! Every key is looked up in the selected section first and `[default]`
//! second, so shared values live once while parallel bridge processes keep
//! their own sections.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::{ExchangeSpec, Settings, DEFAULT_REQUEST_EXCHANGE};

/// Section every other section falls back to.
const FALLBACK_SECTION: &str = "default";

/// Look `key` up in the selected section, then in `[default]`.
fn lookup<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .or_else(|| ini.section(Some(FALLBACK_SECTION)).and_then(|s| s.get(key)))
}

/// Parse an `Ini` object into [`Settings`] for the given section.
///
/// Starts from `Settings::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini, section: &str) -> Result<Settings, ConfigFileError> {
    let mut settings = Settings::default();

    if let Some(v) = lookup(ini, section, "log_dir") {
        let v = v.trim();
        if !v.is_empty() {
            settings.log_dir = Some(expand_tilde(v));
        }
    }

    if let Some(v) = lookup(ini, section, "verbose") {
        settings.verbose = v.parse().map_err(|_| invalid(section, "verbose", v, "must be an integer 0..=3"))?;
    }

    if let Some(v) = lookup(ini, section, "vfd_fifo") {
        let v = v.trim();
        if !v.is_empty() {
            settings.pipes.request = expand_tilde(v);
        }
    }
    if let Some(v) = lookup(ini, section, "resp_fifo") {
        let v = v.trim();
        if !v.is_empty() {
            settings.pipes.response = expand_tilde(v);
        }
    }
    if let Some(v) = lookup(ini, section, "conf_dir") {
        let v = v.trim();
        if !v.is_empty() {
            settings.conf_dir = expand_tilde(v);
        }
    }

    if let Some(v) = lookup(ini, section, "mqhost") {
        settings.broker.host = v.trim().to_string();
    }
    if let Some(v) = lookup(ini, section, "mqport") {
        settings.broker.port = v
            .parse()
            .map_err(|_| invalid(section, "mqport", v, "must be a valid port number (1-65535)"))?;
    }
    if let Some(v) = lookup(ini, section, "mquser") {
        settings.broker.username = v.trim().to_string();
    }
    if let Some(v) = lookup(ini, section, "mqpw") {
        settings.broker.password = v.to_string();
    }

    if let Some(v) = lookup(ini, section, "req_exch") {
        let exchanges: Vec<ExchangeSpec> = v
            .split(',')
            .filter_map(|spec| ExchangeSpec::parse(spec, DEFAULT_REQUEST_EXCHANGE))
            .collect();
        if exchanges.is_empty() {
            return Err(invalid(
                section,
                "req_exch",
                v,
                "expected a comma-separated list of name[:key] entries",
            ));
        }
        settings.broker.request_exchanges = exchanges;
    }

    if let Some(v) = lookup(ini, section, "resp_exch") {
        settings.broker.response_exchange = ExchangeSpec::parse(v, "response")
            .ok_or_else(|| invalid(section, "resp_exch", v, "expected name[:key]"))?;
    }

    if let Some(v) = lookup(ini, section, "reply_timeout_secs") {
        settings.timing.reply_timeout = parse_secs(section, "reply_timeout_secs", v)?;
    }
    if let Some(v) = lookup(ini, section, "sweep_interval_secs") {
        settings.timing.sweep_interval = parse_secs(section, "sweep_interval_secs", v)?;
    }
    if let Some(v) = lookup(ini, section, "orphan_ttl_secs") {
        settings.timing.orphan_ttl = parse_secs(section, "orphan_ttl_secs", v)?;
    }

    Ok(settings)
}

fn parse_secs(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    let secs: u64 = value
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a positive integer (seconds)"))?;
    if secs == 0 {
        return Err(invalid(section, key, value, "must be a positive integer (seconds)"));
    }
    Ok(Duration::from_secs(secs))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
