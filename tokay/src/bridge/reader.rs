//! Response pipe reader.
//!
//! VFd answers over its own pipe in multi-line JSON blobs, each terminated
//! by a line holding only the `@eom@` marker. This task owns that pipe,
//! reassembles the blobs, and shoves them onto the responder queue; it does
//! nothing else, so a slow responder backpressures straight onto the pipe.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipe;
use crate::protocol::EOM_SENTINEL;

use super::error::BridgeError;
use super::message::ResponderInput;

/// Reads sentinel-framed response blobs from VFd.
pub struct ResponseReader {
    path: PathBuf,
    responder_tx: mpsc::Sender<ResponderInput>,
}

impl ResponseReader {
    pub fn new(path: PathBuf, responder_tx: mpsc::Sender<ResponderInput>) -> Self {
        Self { path, responder_tx }
    }

    /// Create the pipe if needed, then read blobs until shutdown.
    ///
    /// End-of-file means the pipe went away underneath us, which the bridge
    /// cannot recover from; the error aborts the process.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BridgeError> {
        pipe::ensure_fifo(&self.path).map_err(|source| BridgeError::ResponsePipeCreate {
            path: self.path.clone(),
            source,
        })?;

        let file = pipe::open_rw(&self.path)
            .await
            .map_err(|source| BridgeError::ResponsePipeOpen {
                path: self.path.clone(),
                source,
            })?;

        info!(pipe = %self.path.display(), "response fifo opened");

        let mut lines = BufReader::new(file).lines();
        let mut blob: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("response reader shutting down");
                    return Ok(());
                }

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line == EOM_SENTINEL {
                                // blank interior lines survive; the sentinel does not
                                let bytes = blob.join("\n").into_bytes();
                                blob.clear();
                                debug!(bytes = bytes.len(), "msg from VFd");
                                if self.responder_tx.send(ResponderInput::Blob(bytes)).await.is_err() {
                                    debug!("responder queue closed, reader stopping");
                                    return Ok(());
                                }
                            } else {
                                blob.push(line);
                            }
                        }
                        Ok(None) => return Err(BridgeError::ResponsePipeClosed),
                        Err(e) => return Err(BridgeError::ResponsePipeRead(e)),
                    }
                }
            }
        }
    }
}
