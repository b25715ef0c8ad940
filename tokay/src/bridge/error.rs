//! Error types for the bridge runtime.
//!
//! Per-request failures never show up here; they travel back to the
//! requestor as ERROR reply envelopes. These variants are the structural
//! failures that abort the bridge process.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::broker::BrokerError;

/// Failures that take the bridge down.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// VFd's request pipe could not be opened; it must already exist
    #[error("unable to open request fifo {path}: {source}")]
    RequestPipeOpen { path: PathBuf, source: io::Error },

    /// The response pipe could not be created
    #[error("unable to create response fifo {path}: {source}")]
    ResponsePipeCreate { path: PathBuf, source: io::Error },

    /// The response pipe exists but could not be opened
    #[error("unable to open response fifo {path}: {source}")]
    ResponsePipeOpen { path: PathBuf, source: io::Error },

    /// The response pipe hit end-of-file
    #[error("response fifo closed unexpectedly")]
    ResponsePipeClosed,

    /// Reading the response pipe failed
    #[error("response fifo read failed: {0}")]
    ResponsePipeRead(io::Error),

    /// Broker connection failure at startup
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
