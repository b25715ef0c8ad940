//! Request collectors.
//!
//! One collector runs per request exchange. It unpacks each delivery into a
//! [`Request`] and passes it to the serialiser, which owns the single pipe
//! into VFd. Collectors also stamp the broker writer's input port into every
//! request so replies can find their way back without further routing state.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerMessage, BrokerSubscription, Delivery};

use super::message::Request;

/// Fallback `msg_key` when the requestor did not supply one.
const NO_MSG_KEY: &str = "none-given";

/// Command-line behaviour switches shared by every collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeFlags {
    /// Log the raw body of every delivery.
    pub dump_json: bool,
    /// Log and drop deliveries instead of forwarding them.
    pub no_exec: bool,
}

/// Consumes one request-exchange subscription.
pub struct Collector {
    subscription: BrokerSubscription,
    flags: BridgeFlags,
    serialiser_tx: mpsc::Sender<Request>,
    reply_tx: mpsc::Sender<BrokerMessage>,
}

impl Collector {
    pub fn new(
        subscription: BrokerSubscription,
        flags: BridgeFlags,
        serialiser_tx: mpsc::Sender<Request>,
        reply_tx: mpsc::Sender<BrokerMessage>,
    ) -> Self {
        Self {
            subscription,
            flags,
            serialiser_tx,
            reply_tx,
        }
    }

    /// Consume deliveries until shutdown or the subscription ends.
    ///
    /// A closed subscription is not fatal for the bridge; this collector
    /// simply stops and the rest keep going.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(exchange = %self.subscription.name, "collector reading");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                delivery = self.subscription.rx.recv() => {
                    let Some(delivery) = delivery else {
                        info!(exchange = %self.subscription.name, "subscription closed, collector stopping");
                        break;
                    };
                    self.handle_delivery(delivery).await;
                }
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        if self.flags.dump_json {
            info!(
                exchange = %self.subscription.name,
                key = %delivery.routing_key,
                body = %String::from_utf8_lossy(&delivery.body),
                "delivery"
            );
        }

        let body: Value = match serde_json::from_slice(&delivery.body) {
            Ok(body) => body,
            Err(e) => {
                debug!(
                    exchange = %self.subscription.name,
                    error = %e,
                    "json parse error: malformed message dropped"
                );
                return;
            }
        };

        if self.flags.no_exec {
            info!(
                exchange = %self.subscription.name,
                bytes = delivery.body.len(),
                "no exec mode set, message ignored"
            );
            return;
        }

        // the requestor's own exchange key wins; the broker correlation id
        // is the reply key of last resort
        let exch_key = body
            .get("exch_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(delivery.correlation_id);
        let msg_key = body
            .get("msg_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| NO_MSG_KEY.to_string());

        let request = Request {
            rid: Uuid::new_v4().to_string(),
            exch_key,
            msg_key,
            source: self.subscription.name.clone(),
            body,
            reply_tx: self.reply_tx.clone(),
            single_use: false,
        };

        if self.serialiser_tx.send(request).await.is_err() {
            warn!(exchange = %self.subscription.name, "serialiser queue closed, request dropped");
        }
    }
}
