//! Response-exchange writer task.
//!
//! A single writer serves every component that needs to publish a reply:
//! collectors stamp its input port into each request they produce, so the
//! responder (and nothing else) funnels envelopes here. Fan-in through the
//! channel keeps the publisher itself single-owner.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BrokerMessage, ExchangePublisher};

/// Default capacity of the writer's input queue.
pub const DEFAULT_WRITER_CHANNEL_CAPACITY: usize = 1024;

/// Publishes reply envelopes onto the response exchange.
pub struct BrokerWriter<P: ExchangePublisher> {
    publisher: P,
    rx: mpsc::Receiver<BrokerMessage>,
}

impl<P: ExchangePublisher> BrokerWriter<P> {
    /// Create the writer and its input port.
    pub fn new(publisher: P) -> (Self, mpsc::Sender<BrokerMessage>) {
        let (tx, rx) = mpsc::channel(DEFAULT_WRITER_CHANNEL_CAPACITY);
        (Self { publisher, rx }, tx)
    }

    /// Drain the input queue until shutdown or every sender is gone.
    ///
    /// Publish failures are logged and skipped; a reply lost here has no
    /// retry path, matching the at-most-once delivery the bridge offers.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("broker writer is running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("broker writer shutting down");
                    break;
                }

                msg = self.rx.recv() => {
                    let Some(msg) = msg else {
                        debug!("broker writer input closed");
                        break;
                    };

                    if let Err(e) = self.publisher.publish(&msg.key, msg.data).await {
                        warn!(key = %msg.key, error = %e, "reply publish failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerError;
    use std::time::Duration;

    /// Publisher that forwards everything to a capture channel.
    struct CapturePublisher {
        tx: mpsc::UnboundedSender<BrokerMessage>,
        fail: bool,
    }

    impl ExchangePublisher for CapturePublisher {
        async fn publish(&mut self, key: &str, data: Vec<u8>) -> Result<(), BrokerError> {
            if self.fail {
                return Err(BrokerError::ConnectionClosed);
            }
            let _ = self.tx.send(BrokerMessage {
                data,
                key: key.to_string(),
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_with_per_message_key() {
        let (cap_tx, mut cap_rx) = mpsc::unbounded_channel();
        let (writer, tx) = BrokerWriter::new(CapturePublisher {
            tx: cap_tx,
            fail: false,
        });

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(writer.run(shutdown.clone()));

        tx.send(BrokerMessage {
            data: b"one".to_vec(),
            key: "K1".to_string(),
        })
        .await
        .unwrap();
        tx.send(BrokerMessage {
            data: b"two".to_vec(),
            key: "K2".to_string(),
        })
        .await
        .unwrap();

        let first = cap_rx.recv().await.unwrap();
        assert_eq!(first.key, "K1");
        assert_eq!(first.data, b"one");
        let second = cap_rx.recv().await.unwrap();
        assert_eq!(second.key, "K2");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_is_not_fatal() {
        let (cap_tx, _cap_rx) = mpsc::unbounded_channel();
        let (writer, tx) = BrokerWriter::new(CapturePublisher {
            tx: cap_tx,
            fail: true,
        });

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(writer.run(shutdown.clone()));

        tx.send(BrokerMessage {
            data: b"doomed".to_vec(),
            key: "K".to_string(),
        })
        .await
        .unwrap();

        // writer keeps draining after the failed publish
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tx.is_closed());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_all_senders_drop() {
        let (cap_tx, _cap_rx) = mpsc::unbounded_channel();
        let (writer, tx) = BrokerWriter::new(CapturePublisher {
            tx: cap_tx,
            fail: false,
        });

        let handle = tokio::spawn(writer.run(CancellationToken::new()));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("writer should stop on closed input")
            .unwrap();
    }
}
