//! Broker transport seam.
//!
//! The bridge consumes the message broker through channel ports only: a
//! subscription is an [`mpsc`] receiver of [`Delivery`] records, and replies
//! go out as [`BrokerMessage`] values through the [`BrokerWriter`] task. This
//! module intentionally avoids any reference to a concrete broker protocol;
//! the WebSocket transport in [`ws`] provides the shipped implementation and
//! tests drive the same ports directly.

mod writer;
pub mod ws;

pub use writer::BrokerWriter;
pub use ws::WsBrokerClient;

use thiserror::Error;
use tokio::sync::mpsc;

/// One message delivered by a request-exchange subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw message payload as published by the client.
    pub body: Vec<u8>,
    /// Routing key the message was published under.
    pub routing_key: String,
    /// Broker-assigned correlation id; the reply key of last resort.
    pub correlation_id: String,
}

/// A reply envelope on its way to the response exchange.
///
/// `key` becomes the routing key of the publish, so the original requestor
/// can selectively consume its own replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Serialized reply envelope.
    pub data: Vec<u8>,
    /// Per-message routing key (the request's `exch_key`).
    pub key: String,
}

/// Channel port of one request-exchange subscription.
///
/// The broker client pushes deliveries into the sender half; a collector
/// owns the receiver. Tests construct these around a plain channel.
#[derive(Debug)]
pub struct BrokerSubscription {
    /// Exchange name, used for log labelling only.
    pub name: String,
    /// Delivery port.
    pub rx: mpsc::Receiver<Delivery>,
}

impl BrokerSubscription {
    /// Wrap an exchange name and its delivery port.
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<Delivery>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }
}

/// Publisher half of the broker connection.
///
/// [`BrokerWriter`] is generic over this so tests can capture publishes
/// without a live broker.
pub trait ExchangePublisher: Send + 'static {
    /// Publish `data` onto the response exchange under `key`.
    fn publish(
        &mut self,
        key: &str,
        data: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;
}

/// Broker transport failures.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach the broker at startup
    #[error("unable to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connection dropped and the I/O task is gone
    #[error("broker connection closed")]
    ConnectionClosed,

    /// The broker sent something the client could not understand
    #[error("broker protocol error: {0}")]
    Protocol(String),
}
