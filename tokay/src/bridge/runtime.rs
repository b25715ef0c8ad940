//! Bridge runtime.
//!
//! Owns the typed queues, spawns the five component tasks, and decides
//! what is fatal. The wiring mirrors the data flow:
//!
//! ```text
//! broker ──► Collector(s) ──► serialiser queue ──► Serialiser ──► request pipe
//!                                                      │
//!                                          tracking records
//!                                                      ▼
//! broker ◄── BrokerWriter ◄── reply queue ◄──── Responder ◄── responder queue
//!                                                      ▲
//!                                                 raw blobs
//!                                                      │
//!                            response pipe ──► ResponseReader
//! ```
//!
//! Collectors ending (subscription gone) is survivable; the serialiser or
//! reader failing is not.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::{BrokerSubscription, BrokerWriter, ExchangePublisher};
use crate::config::Settings;

use super::collector::{BridgeFlags, Collector};
use super::error::BridgeError;
use super::reader::ResponseReader;
use super::responder::{Responder, ResponderConfig};
use super::serialiser::{Serialiser, SerialiserContext};

/// Capacity of the serialiser queue all collectors feed.
pub const SERIALISER_CHANNEL_CAPACITY: usize = 2048;

/// Capacity of the responder queue fed by serialiser and reader.
pub const RESPONDER_CHANNEL_CAPACITY: usize = 1024;

/// Everything the runtime needs to wire itself up.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Stable identity stamped into every envelope this process sends.
    pub sender_id: String,
    /// Pipe VFd reads requests from; must exist.
    pub request_pipe: PathBuf,
    /// Pipe VFd writes responses to; created if missing.
    pub response_pipe: PathBuf,
    /// Stash directory for `add` config files.
    pub conf_dir: PathBuf,
    /// Collector behaviour switches.
    pub flags: BridgeFlags,
    /// Correlation timing.
    pub responder: ResponderConfig,
}

impl BridgeConfig {
    /// Derive a runtime config from loaded settings.
    pub fn from_settings(settings: &Settings, sender_id: String, flags: BridgeFlags) -> Self {
        Self {
            sender_id,
            request_pipe: settings.pipes.request.clone(),
            response_pipe: settings.pipes.response.clone(),
            conf_dir: settings.conf_dir.clone(),
            flags,
            responder: ResponderConfig::from(&settings.timing),
        }
    }
}

/// A started bridge: component tasks running, queues connected.
pub struct Bridge {
    shutdown: CancellationToken,
    reader_handle: JoinHandle<Result<(), BridgeError>>,
    serialiser_handle: JoinHandle<()>,
    responder_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    collector_handles: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Wire the queues and start every component task.
    ///
    /// The writer exists before the collectors so its input port can be
    /// stamped into every request. Fails fast when the request pipe cannot
    /// be opened.
    pub async fn start<P: ExchangePublisher>(
        config: BridgeConfig,
        subscriptions: Vec<BrokerSubscription>,
        publisher: P,
    ) -> Result<Self, BridgeError> {
        info!(sender_id = %config.sender_id, "starting bridge runtime");

        let shutdown = CancellationToken::new();

        let (writer, reply_tx) = BrokerWriter::new(publisher);
        let writer_handle = tokio::spawn(writer.run(shutdown.clone()));

        let (responder, responder_tx) = Responder::new(
            config.responder.clone(),
            config.sender_id.clone(),
            RESPONDER_CHANNEL_CAPACITY,
        );
        let responder_handle = tokio::spawn(responder.run(shutdown.clone()));

        let (serialiser_tx, serialiser_rx) = mpsc::channel(SERIALISER_CHANNEL_CAPACITY);
        let serialiser = Serialiser::open(
            SerialiserContext {
                sender_id: config.sender_id.clone(),
                resp_fifo: config.response_pipe.to_string_lossy().into_owned(),
                conf_dir: config.conf_dir.clone(),
            },
            serialiser_rx,
            responder_tx.clone(),
            &config.request_pipe,
        )
        .await?;
        let serialiser_handle = tokio::spawn(serialiser.run(shutdown.clone()));

        let reader = ResponseReader::new(config.response_pipe.clone(), responder_tx);
        let reader_handle = tokio::spawn(reader.run(shutdown.clone()));

        let collector_handles = subscriptions
            .into_iter()
            .map(|subscription| {
                let collector = Collector::new(
                    subscription,
                    config.flags,
                    serialiser_tx.clone(),
                    reply_tx.clone(),
                );
                tokio::spawn(collector.run(shutdown.clone()))
            })
            .collect();

        Ok(Self {
            shutdown,
            reader_handle,
            serialiser_handle,
            responder_handle,
            writer_handle,
            collector_handles,
        })
    }

    /// Token that stops every component when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown or a structural failure.
    ///
    /// The reader is the only component that can fail after startup; its
    /// error is the bridge's error. Everything else is wound down before
    /// returning.
    pub async fn run(self) -> Result<(), BridgeError> {
        let result = match self.reader_handle.await {
            Ok(result) => result,
            Err(_) => Ok(()), // task aborted or panicked during shutdown
        };

        self.shutdown.cancel();
        let _ = self.serialiser_handle.await;
        let _ = self.responder_handle.await;
        for handle in self.collector_handles {
            let _ = handle.await;
        }
        let _ = self.writer_handle.await;

        info!("bridge runtime stopped");
        result
    }
}
