//! WebSocket pub/sub transport.
//!
//! The shipped broker client speaks a small JSON frame protocol over a
//! single WebSocket connection: an `auth` frame on connect, one `subscribe`
//! frame per request exchange, and `publish` frames in both directions.
//! One I/O task owns the socket; subscriptions and publishes reach it
//! through a command channel, and inbound publishes fan out to the
//! per-exchange delivery ports handed to the collectors.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::{BrokerError, BrokerSubscription, Delivery, ExchangePublisher};

/// Frames exchanged with the broker, tagged by `type`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Auth {
        user: String,
        password: String,
    },
    Subscribe {
        topic: String,
        key: String,
    },
    Publish {
        topic: String,
        key: String,
        #[serde(default)]
        correlation_id: String,
        payload: String,
    },
}

/// Requests from client handles to the I/O task.
enum Command {
    Subscribe {
        topic: String,
        key: String,
        port: mpsc::Sender<Delivery>,
    },
    Publish {
        topic: String,
        key: String,
        payload: Vec<u8>,
    },
}

/// Handle onto a live broker connection.
///
/// Cheap to clone; every handle talks to the same I/O task. Dropping all
/// handles closes the connection.
#[derive(Clone, Debug)]
pub struct WsBrokerClient {
    cmd_tx: mpsc::Sender<Command>,
}

impl WsBrokerClient {
    /// Connect and authenticate against the broker.
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Result<Self, BrokerError> {
        let url = format!("ws://{}:{}", host, port);

        let (mut socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let auth = WireFrame::Auth {
            user: user.to_string(),
            password: password.to_string(),
        };
        socket
            .send(WsMessage::text(encode_frame(&auth)))
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        info!(%url, %user, "broker connection established");

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(io_task(socket, cmd_rx));

        Ok(Self { cmd_tx })
    }

    /// Subscribe to a request exchange and return its delivery port.
    pub async fn subscribe(
        &self,
        exchange: &str,
        key: &str,
        capacity: usize,
    ) -> Result<BrokerSubscription, BrokerError> {
        let (tx, rx) = mpsc::channel(capacity);
        self.cmd_tx
            .send(Command::Subscribe {
                topic: exchange.to_string(),
                key: key.to_string(),
                port: tx,
            })
            .await
            .map_err(|_| BrokerError::ConnectionClosed)?;

        Ok(BrokerSubscription::new(exchange, rx))
    }

    /// Create a publisher bound to the response exchange.
    pub fn publisher(&self, exchange: &str) -> WsPublisher {
        WsPublisher {
            topic: exchange.to_string(),
            cmd_tx: self.cmd_tx.clone(),
        }
    }
}

/// [`ExchangePublisher`] bound to one exchange of a [`WsBrokerClient`].
pub struct WsPublisher {
    topic: String,
    cmd_tx: mpsc::Sender<Command>,
}

impl ExchangePublisher for WsPublisher {
    async fn publish(&mut self, key: &str, data: Vec<u8>) -> Result<(), BrokerError> {
        self.cmd_tx
            .send(Command::Publish {
                topic: self.topic.clone(),
                key: key.to_string(),
                payload: data,
            })
            .await
            .map_err(|_| BrokerError::ConnectionClosed)
    }
}

fn encode_frame(frame: &WireFrame) -> String {
    // WireFrame contains only strings; serialization cannot fail
    serde_json::to_string(frame).unwrap_or_default()
}

/// Owns the socket: applies commands, routes inbound publishes.
async fn io_task(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let (mut sink, mut stream) = socket.split();
    let mut routes: HashMap<String, mpsc::Sender<Delivery>> = HashMap::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("all broker handles dropped, closing connection");
                    break;
                };

                let frame = match cmd {
                    Command::Subscribe { topic, key, port } => {
                        routes.insert(topic.clone(), port);
                        WireFrame::Subscribe { topic, key }
                    }
                    Command::Publish { topic, key, payload } => WireFrame::Publish {
                        topic,
                        key,
                        correlation_id: String::new(),
                        payload: String::from_utf8_lossy(&payload).into_owned(),
                    },
                };

                if let Err(e) = sink.send(WsMessage::text(encode_frame(&frame))).await {
                    warn!(error = %e, "broker send failed, closing connection");
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(msg)) if msg.is_text() => {
                        let text = msg.to_text().unwrap_or_default();
                        dispatch_inbound(text, &mut routes).await;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to route
                    Some(Err(e)) => {
                        warn!(error = %e, "broker read failed, closing connection");
                        break;
                    }
                    None => {
                        warn!("broker closed the connection");
                        break;
                    }
                }
            }
        }
    }
}

/// Route one inbound text frame to its subscription port.
async fn dispatch_inbound(text: &str, routes: &mut HashMap<String, mpsc::Sender<Delivery>>) {
    let frame = match serde_json::from_str::<WireFrame>(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "undecodable broker frame dropped");
            return;
        }
    };

    let WireFrame::Publish {
        topic,
        key,
        correlation_id,
        payload,
    } = frame
    else {
        debug!("non-publish frame from broker ignored");
        return;
    };

    let Some(port) = routes.get(&topic).cloned() else {
        debug!(%topic, "publish for unsubscribed topic dropped");
        return;
    };

    let delivery = Delivery {
        body: payload.into_bytes(),
        routing_key: key,
        correlation_id,
    };

    // Await rather than try_send: a full collector queue is backpressure
    // onto the socket, matching the blocking broker client semantics.
    if port.send(delivery).await.is_err() {
        debug!(%topic, "subscription port dropped, unrouting");
        routes.remove(&topic);
    }
}
