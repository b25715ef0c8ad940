//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the bridge binary: consistent formatting
//! on stderr and the exit-code contract (0 clean, 1 fatal).

use std::fmt;
use std::process;

use tokay::bridge::BridgeError;
use tokay::broker::BrokerError;
use tokay::config::ConfigFileError;

/// Fatal startup or runtime failures.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration could not be loaded or is unusable
    Config(ConfigFileError),
    /// Broker connection or subscription failure
    Broker(BrokerError),
    /// Bridge structural failure (pipes)
    Bridge(BridgeError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::MissingValue { .. }) => {
                eprintln!();
                eprintln!(
                    "Broker host and credentials must be set in the config file \
                     (mqhost/mquser/mqpw) or via TOKAY_RMQUNAME / TOKAY_RMQPW."
                );
            }
            CliError::Bridge(BridgeError::RequestPipeOpen { path, .. }) => {
                eprintln!();
                eprintln!(
                    "The request fifo {} must exist before the bridge starts; \
                     is VFd running?",
                    path.display()
                );
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "configuration error: {}", e),
            CliError::Broker(e) => write!(f, "broker error: {}", e),
            CliError::Bridge(e) => write!(f, "bridge error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Broker(e) => Some(e),
            CliError::Bridge(e) => Some(e),
            CliError::LoggingInit(_) => None,
        }
    }
}
