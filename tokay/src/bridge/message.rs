//! Message types flowing between the bridge components.
//!
//! A [`Request`] is born in a collector, crosses the serialiser queue, and
//! is folded into the [`TrackedReply`] the responder uses to answer it.
//! Components never share registries; everything moves by value through
//! the typed queues.

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::broker::BrokerMessage;

/// One incoming command from a remote client.
#[derive(Debug)]
pub struct Request {
    /// Bridge-generated correlation id used on the VFd leg; never shown to clients.
    pub rid: String,
    /// Routing key the requestor expects on the reply, propagated verbatim.
    pub exch_key: String,
    /// Requestor-owned disambiguation token, echoed back and never interpreted.
    pub msg_key: String,
    /// Name of the subscription that produced the request.
    pub source: String,
    /// Parsed JSON tree of the original request.
    pub body: Value,
    /// Queue the reply envelope must be written to.
    pub reply_tx: mpsc::Sender<BrokerMessage>,
    /// Whether the reply port is private and should close after use (reserved).
    pub single_use: bool,
}

impl Request {
    /// `sender` field of the body, when the client supplied one.
    pub fn sender(&self) -> Option<&str> {
        self.body.get("sender").and_then(Value::as_str)
    }

    /// `action` field of the body.
    pub fn action(&self) -> Option<&str> {
        self.body.get("action").and_then(Value::as_str)
    }

    /// `target` field of the body.
    pub fn target(&self) -> Option<&str> {
        self.body.get("target").and_then(Value::as_str)
    }
}

/// Tracking record the serialiser hands the responder for every request it
/// keeps (wait=true) or answers immediately (wait=false).
#[derive(Debug)]
pub struct TrackedReply {
    /// Copied from the request for registry keying.
    pub rid: String,
    /// Copied from the request; becomes the reply routing key.
    pub exch_key: String,
    /// Copied from the request; echoed in every envelope.
    pub msg_key: String,
    /// True iff a VFd response is expected (the pipe write succeeded).
    pub wait: bool,
    /// When the pending entry expires; set only when the record is queued.
    pub deadline: Option<Instant>,
    /// Pre-built envelope used when `wait` is false.
    pub rdata: String,
    /// The originating request; owns the reply port.
    pub request: Request,
}

impl TrackedReply {
    /// Build a record for `request`, assuming the bad case: no VFd response
    /// coming and `rdata` as the canned answer.
    pub fn new(request: Request, rdata: String) -> Self {
        Self {
            rid: request.rid.clone(),
            exch_key: request.exch_key.clone(),
            msg_key: request.msg_key.clone(),
            wait: false,
            deadline: None,
            rdata,
            request,
        }
    }

    /// Send `data` to the requestor's reply port under this record's
    /// routing key, consuming the record.
    pub async fn send(self, data: Vec<u8>) {
        let message = BrokerMessage {
            data,
            key: self.exch_key,
        };
        if self.request.reply_tx.send(message).await.is_err() {
            warn!(rid = %self.rid, "reply port closed, response dropped");
        }
    }
}

/// The responder's single input queue carries both kinds of traffic.
#[derive(Debug)]
pub enum ResponderInput {
    /// Tracking record from the serialiser.
    Tracking(TrackedReply),
    /// Raw sentinel-framed blob from the response reader.
    Blob(Vec<u8>),
}

/// Build a reply envelope:
///
/// ```text
/// { "sender": .., "state": .., "msg": .., "msg_key": .., "data": {..} }
/// ```
///
/// `data` is omitted when `None`; an empty `state` becomes `"OK"`.
pub fn build_reply(
    sender: &str,
    state: &str,
    msg: &str,
    msg_key: &str,
    data: Option<&Value>,
) -> String {
    let state = if state.is_empty() { "OK" } else { state };

    let mut envelope = Map::new();
    envelope.insert("sender".to_string(), Value::from(sender));
    envelope.insert("state".to_string(), Value::from(state));
    envelope.insert("msg".to_string(), Value::from(msg));
    envelope.insert("msg_key".to_string(), Value::from(msg_key));
    if let Some(data) = data {
        envelope.insert("data".to_string(), data.clone());
    }

    Value::Object(envelope).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_request(reply_tx: mpsc::Sender<BrokerMessage>) -> Request {
        Request {
            rid: "rid-1".to_string(),
            exch_key: "K1".to_string(),
            msg_key: "u1".to_string(),
            source: "tokay_req".to_string(),
            body: json!({ "action": "ping", "sender": "someone" }),
            reply_tx,
            single_use: false,
        }
    }

    #[test]
    fn body_field_accessors() {
        let (tx, _rx) = mpsc::channel(1);
        let request = test_request(tx);

        assert_eq!(request.action(), Some("ping"));
        assert_eq!(request.sender(), Some("someone"));
        assert_eq!(request.target(), None);
    }

    #[test]
    fn tracked_reply_copies_keys_and_assumes_no_wait() {
        let (tx, _rx) = mpsc::channel(1);
        let record = TrackedReply::new(test_request(tx), "canned".to_string());

        assert_eq!(record.rid, "rid-1");
        assert_eq!(record.exch_key, "K1");
        assert_eq!(record.msg_key, "u1");
        assert!(!record.wait);
        assert!(record.deadline.is_none());
        assert_eq!(record.rdata, "canned");
    }

    #[tokio::test]
    async fn send_uses_exch_key_as_routing_key() {
        let (tx, mut rx) = mpsc::channel(1);
        let record = TrackedReply::new(test_request(tx), String::new());

        record.send(b"envelope".to_vec()).await;

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.key, "K1");
        assert_eq!(msg.data, b"envelope");
    }

    #[test]
    fn build_reply_with_data() {
        let data = json!({ "vfd_rid": "r", "detail": 7 });
        let envelope = build_reply("host_1", "OK", "done", "u1", Some(&data));
        let parsed: Value = serde_json::from_str(&envelope).unwrap();

        assert_eq!(parsed["sender"], "host_1");
        assert_eq!(parsed["state"], "OK");
        assert_eq!(parsed["msg"], "done");
        assert_eq!(parsed["msg_key"], "u1");
        assert_eq!(parsed["data"]["detail"], 7);
    }

    #[test]
    fn build_reply_without_data_omits_the_field() {
        let envelope = build_reply("host_1", "ERROR", "nope", "u2", None);
        let parsed: Value = serde_json::from_str(&envelope).unwrap();

        assert_eq!(parsed["state"], "ERROR");
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn build_reply_defaults_empty_state_to_ok() {
        let envelope = build_reply("host_1", "", "", "u3", None);
        let parsed: Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["state"], "OK");
    }
}
