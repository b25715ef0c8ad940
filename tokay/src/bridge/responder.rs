//! The correlation engine.
//!
//! A single consumer over one queue carrying two kinds of input: tracking
//! records from the serialiser and raw response blobs from the reader. Two
//! registries live here and nowhere else:
//!
//! - `pending`: requests forwarded to VFd, waiting for their response
//! - `unmatched`: VFd blobs that arrived before their tracking record
//!
//! The second registry closes the race where VFd answers faster than the
//! tracking record crosses the responder queue: the orphan blob is parked
//! and re-queued through the same consumer once the record shows up, so
//! one piece of match logic serves both orderings. A periodic tick expires
//! pending entries past their deadline and ages out parked orphans that
//! will never match.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TimingSettings;
use crate::protocol::DownstreamReply;

use super::message::{build_reply, ResponderInput, TrackedReply};

/// Reply text for requests VFd never answered.
const TIMEOUT_MSG: &str = "timeout: no response from VFd";

/// Correlation timing knobs.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// How long a pending entry may wait for its VFd response.
    pub reply_timeout: Duration,
    /// Tick period for the timeout sweep.
    pub sweep_interval: Duration,
    /// How long an orphan blob is parked before being discarded.
    pub orphan_ttl: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self::from(&TimingSettings::default())
    }
}

impl From<&TimingSettings> for ResponderConfig {
    fn from(timing: &TimingSettings) -> Self {
        Self {
            reply_timeout: timing.reply_timeout,
            sweep_interval: timing.sweep_interval,
            orphan_ttl: timing.orphan_ttl,
        }
    }
}

/// A VFd blob with no matching tracking record yet.
#[derive(Debug)]
struct Orphan {
    blob: Vec<u8>,
    parked_at: Instant,
}

/// Matches VFd responses to pending requests and emits reply envelopes.
pub struct Responder {
    config: ResponderConfig,
    sender_id: String,
    rx: mpsc::Receiver<ResponderInput>,
    /// Clone of the input port, used to re-queue orphan blobs.
    requeue_tx: mpsc::Sender<ResponderInput>,
    pending: HashMap<String, TrackedReply>,
    unmatched: HashMap<String, Orphan>,
}

impl Responder {
    /// Create the responder and its input port.
    pub fn new(
        config: ResponderConfig,
        sender_id: String,
        capacity: usize,
    ) -> (Self, mpsc::Sender<ResponderInput>) {
        let (tx, rx) = mpsc::channel(capacity);
        let responder = Self {
            config,
            sender_id,
            rx,
            requeue_tx: tx.clone(),
            pending: HashMap::new(),
            unmatched: HashMap::new(),
        };
        (responder, tx)
    }

    /// Consume the queue and sweep timeouts until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("responder is running");

        let mut tick = tokio::time::interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("responder shutting down");
                    break;
                }

                _ = tick.tick() => self.sweep().await,

                input = self.rx.recv() => {
                    let Some(input) = input else {
                        debug!("responder queue closed");
                        break;
                    };
                    match input {
                        ResponderInput::Tracking(record) => self.handle_tracking(record).await,
                        ResponderInput::Blob(blob) => self.handle_blob(blob).await,
                    }
                }
            }
        }
    }

    /// File a tracking record: park it when a response is still owed, or
    /// answer immediately from its canned reply.
    async fn handle_tracking(&mut self, mut record: TrackedReply) {
        debug!(
            rid = %record.rid,
            wait = record.wait,
            source = %record.request.source,
            "responder gets tracking record"
        );

        // VFd may already have answered; put the orphan back through the
        // queue once the registries below are settled
        let orphan = self.unmatched.remove(&record.rid);

        if record.wait {
            record.deadline = Some(Instant::now() + self.config.reply_timeout);
            self.pending.insert(record.rid.clone(), record);
        } else {
            let data = record.rdata.clone().into_bytes();
            record.send(data).await;
        }

        if let Some(orphan) = orphan {
            debug!("unmatched response found and requeued");
            match self.requeue_tx.try_send(ResponderInput::Blob(orphan.blob)) {
                Ok(()) => {}
                Err(TrySendError::Full(input)) => {
                    // queue jammed; run the same match logic in place
                    if let ResponderInput::Blob(blob) = input {
                        self.handle_blob(blob).await;
                    }
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Match one VFd blob against the pending registry.
    async fn handle_blob(&mut self, blob: Vec<u8>) {
        let reply = match DownstreamReply::parse(&blob) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "bad response data from VFd");
                return;
            }
        };

        // VFd may communicate things other than responses
        if reply.action != "response" {
            info!(action = %reply.action, "unknown action received on response fifo");
            return;
        }

        match self.pending.remove(&reply.rid) {
            Some(record) => {
                debug!(rid = %reply.rid, "VFd response matched pending request");
                let state = reply.state.as_deref().unwrap_or("OK");
                let msg = reply.msg.as_deref().unwrap_or("");
                let envelope = build_reply(
                    &self.sender_id,
                    state,
                    msg,
                    &record.msg_key,
                    Some(&reply.body),
                );
                record.send(envelope.into_bytes()).await;
            }
            None => {
                debug!(rid = %reply.rid, "VFd response with no matching request, parked");
                self.unmatched.insert(
                    reply.rid,
                    Orphan {
                        blob,
                        parked_at: Instant::now(),
                    },
                );
            }
        }
    }

    /// Expire pending entries past their deadline and orphans past the TTL.
    async fn sweep(&mut self) {
        let now = Instant::now();

        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, record)| record.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(rid, _)| rid.clone())
            .collect();

        for rid in expired {
            if let Some(record) = self.pending.remove(&rid) {
                info!(%rid, "response timed out for request");
                let envelope =
                    build_reply(&self.sender_id, "ERROR", TIMEOUT_MSG, &record.msg_key, None);
                record.send(envelope.into_bytes()).await;
            }
        }

        let stale: Vec<String> = self
            .unmatched
            .iter()
            .filter(|(_, orphan)| now.duration_since(orphan.parked_at) >= self.config.orphan_ttl)
            .map(|(rid, _)| rid.clone())
            .collect();

        for rid in stale {
            self.unmatched.remove(&rid);
            warn!(%rid, "unmatched VFd response aged out");
        }
    }
}
