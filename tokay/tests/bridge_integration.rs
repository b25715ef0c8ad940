//! End-to-end bridge tests.
//!
//! The broker is driven through its channel ports, the VFd side through
//! real named pipes in a tempdir: the test plays both the remote requestor
//! and the downstream daemon, and watches what comes back on the response
//! exchange.

use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use tokay::bridge::{Bridge, BridgeConfig, BridgeFlags, ResponderConfig};
use tokay::broker::{
    BrokerError, BrokerMessage, BrokerSubscription, Delivery, ExchangePublisher,
};

const SENDER_ID: &str = "testhost_777";

/// Publisher that hands every publish to the test.
struct CapturePublisher {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl ExchangePublisher for CapturePublisher {
    async fn publish(&mut self, key: &str, data: Vec<u8>) -> Result<(), BrokerError> {
        let _ = self.tx.send(BrokerMessage {
            data,
            key: key.to_string(),
        });
        Ok(())
    }
}

struct TestBridge {
    dir: TempDir,
    delivery_tx: mpsc::Sender<Delivery>,
    publish_rx: mpsc::UnboundedReceiver<BrokerMessage>,
    /// Read side of the request pipe: what VFd would consume.
    downstream: BufReader<tokio::fs::File>,
    /// Write side of the response pipe: what VFd would produce.
    response_feed: tokio::fs::File,
    shutdown: tokio_util::sync::CancellationToken,
}

async fn start_bridge(responder: ResponderConfig) -> TestBridge {
    let dir = TempDir::new().unwrap();
    let request_pipe = dir.path().join("request.fifo");
    let response_pipe = dir.path().join("resp.fifo");
    let conf_dir = dir.path().join("config");

    tokay::pipe::ensure_fifo(&request_pipe).unwrap();
    tokay::pipe::ensure_fifo(&response_pipe).unwrap();
    std::fs::create_dir_all(&conf_dir).unwrap();

    let (delivery_tx, delivery_rx) = mpsc::channel(64);
    let (publish_tx, publish_rx) = mpsc::unbounded_channel();

    let config = BridgeConfig {
        sender_id: SENDER_ID.to_string(),
        request_pipe: request_pipe.clone(),
        response_pipe: response_pipe.clone(),
        conf_dir,
        flags: BridgeFlags::default(),
        responder,
    };

    let bridge = Bridge::start(
        config,
        vec![BrokerSubscription::new("tokay_req", delivery_rx)],
        CapturePublisher { tx: publish_tx },
    )
    .await
    .unwrap();

    let shutdown = bridge.shutdown_token();
    tokio::spawn(bridge.run());

    let downstream = BufReader::new(tokay::pipe::open_rw(&request_pipe).await.unwrap());
    let response_feed = tokay::pipe::open_rw(&response_pipe).await.unwrap();

    TestBridge {
        dir,
        delivery_tx,
        publish_rx,
        downstream,
        response_feed,
        shutdown,
    }
}

impl TestBridge {
    async fn publish_request(&self, body: Value, correlation_id: &str) {
        self.delivery_tx
            .send(Delivery {
                body: body.to_string().into_bytes(),
                routing_key: "tokay_req".to_string(),
                correlation_id: correlation_id.to_string(),
            })
            .await
            .unwrap();
    }

    /// Read one double-newline terminated frame off the request pipe.
    async fn next_frame(&mut self) -> Value {
        let read = async {
            let mut line = String::new();
            self.downstream.read_line(&mut line).await.unwrap();
            let mut blank = String::new();
            self.downstream.read_line(&mut blank).await.unwrap();
            assert_eq!(blank, "\n", "frames are double-newline terminated");
            line
        };
        let line = tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("frame expected on request pipe");
        serde_json::from_str(line.trim_end()).unwrap()
    }

    /// Play VFd: write a response blob followed by the sentinel line.
    async fn respond(&mut self, blob: Value) {
        let framed = format!("{}\n@eom@\n", blob);
        self.response_feed
            .write_all(framed.as_bytes())
            .await
            .unwrap();
        self.response_feed.flush().await.unwrap();
    }

    async fn next_publish(&mut self) -> (String, Value) {
        let msg = tokio::time::timeout(Duration::from_secs(5), self.publish_rx.recv())
            .await
            .expect("publish expected on response exchange")
            .unwrap();
        let body = serde_json::from_slice(&msg.data).unwrap();
        (msg.key, body)
    }

    /// Stop the bridge and unwedge its parked response-pipe read.
    async fn finish(mut self) {
        self.shutdown.cancel();
        let _ = self.response_feed.write_all(b"\n").await;
        let _ = self.response_feed.flush().await;
    }
}

#[tokio::test]
async fn happy_add_round_trip() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(
        json!({
            "action": "add",
            "exch_key": "K1",
            "msg_key": "u1",
            "target": "vfA",
            "req_data": { "x": 1 }
        }),
        "corr-1",
    )
    .await;

    let frame = b.next_frame().await;
    assert_eq!(frame["action"], "add");
    let stash = b.dir.path().join("config/vfA.json");
    assert_eq!(frame["params"]["filename"], stash.to_string_lossy().as_ref());
    let rid = frame["params"]["vfd_rid"].as_str().unwrap().to_string();
    assert!(!rid.is_empty());

    let contents: Value = serde_json::from_str(&std::fs::read_to_string(&stash).unwrap()).unwrap();
    assert_eq!(contents, json!({ "x": 1 }));

    b.respond(json!({ "action": "response", "vfd_rid": rid, "state": "OK" }))
        .await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K1");
    assert_eq!(reply["state"], "OK");
    assert_eq!(reply["msg_key"], "u1");
    assert_eq!(reply["sender"], SENDER_ID);
    assert_eq!(reply["data"]["vfd_rid"], rid.as_str());

    b.finish().await;
}

#[tokio::test]
async fn local_ping_answers_without_vfd() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(
        json!({ "action": "Ping", "exch_key": "K2", "msg_key": "u2" }),
        "corr-2",
    )
    .await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K2");
    assert_eq!(reply["state"], "OK");
    assert!(reply["msg"].as_str().unwrap().starts_with("Pong: "));
    assert_eq!(reply["msg_key"], "u2");

    // nothing touched the request pipe: the next frame is the canary ping
    b.publish_request(json!({ "action": "ping", "exch_key": "K2b" }), "corr-2b")
        .await;
    let frame = b.next_frame().await;
    assert_eq!(frame["action"], "ping");

    b.finish().await;
}

#[tokio::test]
async fn unknown_action_yields_error_reply() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(
        json!({ "action": "flerb", "exch_key": "K3", "msg_key": "u3" }),
        "corr-3",
    )
    .await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K3");
    assert_eq!(reply["state"], "ERROR");
    assert!(reply["msg"]
        .as_str()
        .unwrap()
        .starts_with("request dropped: unknown action: flerb"));

    b.finish().await;
}

#[tokio::test]
async fn swallowed_response_times_out() {
    // shortened clock so the test stays quick; the ratios match production
    let mut b = start_bridge(ResponderConfig {
        reply_timeout: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(50),
        orphan_ttl: Duration::from_secs(60),
    })
    .await;

    b.publish_request(
        json!({ "action": "ping", "exch_key": "K4", "msg_key": "u4" }),
        "corr-4",
    )
    .await;

    // swallow the downstream frame and never answer
    let frame = b.next_frame().await;
    assert_eq!(frame["action"], "ping");

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K4");
    assert_eq!(reply["state"], "ERROR");
    assert_eq!(reply["msg"], "timeout: no response from VFd");
    assert_eq!(reply["msg_key"], "u4");

    // exactly one reply: the slot is gone
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(b.publish_rx.try_recv().is_err());

    b.finish().await;
}

#[tokio::test]
async fn loopback_requests_are_suppressed() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(
        json!({ "action": "ping", "exch_key": "K5", "sender": SENDER_ID }),
        "corr-5",
    )
    .await;

    // no publish and no pipe write; the canary proves both queues drained
    b.publish_request(
        json!({ "action": "Ping", "exch_key": "K5b", "msg_key": "u5" }),
        "corr-5b",
    )
    .await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K5b", "only the canary may answer");
    assert_eq!(reply["state"], "OK");

    b.publish_request(json!({ "action": "dump", "exch_key": "K5c" }), "corr-5c")
        .await;
    let frame = b.next_frame().await;
    assert_eq!(frame["action"], "dump", "suppressed request wrote nothing");

    b.finish().await;
}

#[tokio::test]
async fn correlation_id_is_the_fallback_reply_key() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(json!({ "action": "Ping" }), "amqp-corr-77").await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "amqp-corr-77");
    assert_eq!(reply["msg_key"], "none-given");

    b.finish().await;
}

#[tokio::test]
async fn concurrent_requests_never_interleave_frames() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    for i in 0..8 {
        b.publish_request(
            json!({
                "action": "add",
                "exch_key": format!("K-{}", i),
                "msg_key": format!("u-{}", i),
                "target": format!("vf{}", i),
                "req_data": { "slot": i }
            }),
            "corr",
        )
        .await;
    }

    // every frame parses cleanly and the set of targets is exactly what
    // went in, in some order
    let mut rids = std::collections::HashSet::new();
    for _ in 0..8 {
        let frame = b.next_frame().await;
        assert_eq!(frame["action"], "add");
        rids.insert(frame["params"]["vfd_rid"].as_str().unwrap().to_string());
    }
    assert_eq!(rids.len(), 8, "every frame carries its own rid");

    // answer them all; every requestor hears back exactly once
    for rid in &rids {
        b.respond(json!({ "action": "response", "vfd_rid": rid, "state": "OK" }))
            .await;
    }
    let mut keys = std::collections::HashSet::new();
    for _ in 0..8 {
        let (key, reply) = b.next_publish().await;
        assert_eq!(reply["state"], "OK");
        keys.insert(key);
    }
    assert_eq!(keys.len(), 8);

    b.finish().await;
}

#[tokio::test]
async fn vfd_error_state_passes_through() {
    let mut b = start_bridge(ResponderConfig::default()).await;

    b.publish_request(
        json!({ "action": "show", "exch_key": "K6", "msg_key": "u6", "target": "all" }),
        "corr-6",
    )
    .await;

    let frame = b.next_frame().await;
    assert_eq!(frame["action"], "show");
    assert_eq!(frame["params"]["resource"], "all");
    let rid = frame["params"]["vfd_rid"].as_str().unwrap().to_string();

    b.respond(json!({
        "action": "response",
        "vfd_rid": rid,
        "state": "ERROR",
        "msg": "no such pf"
    }))
    .await;

    let (key, reply) = b.next_publish().await;
    assert_eq!(key, "K6");
    assert_eq!(reply["state"], "ERROR");
    assert_eq!(reply["msg"], "no such pf");
    assert_eq!(reply["data"]["msg"], "no such pf");

    b.finish().await;
}
