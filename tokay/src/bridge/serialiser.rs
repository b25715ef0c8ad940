//! Single-writer serialisation onto VFd's request pipe.
//!
//! Every collector funnels into this one task, which is the sole writer of
//! the request pipe. That makes pipe writes whole-message atomic without
//! any locking: no two dispatch iterations can interleave bytes.
//!
//! Each dispatched request yields a [`TrackedReply`] for the responder,
//! `wait=true` when bytes actually reached VFd.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipe;
use crate::protocol::encode_request;

use super::error::BridgeError;
use super::message::{build_reply, Request, ResponderInput, TrackedReply};

/// Shared facts every dispatch needs.
#[derive(Debug, Clone)]
pub struct SerialiserContext {
    /// The bridge's own sender id, for loopback suppression.
    pub sender_id: String,
    /// Response pipe path advertised to VFd in every frame.
    pub resp_fifo: String,
    /// Where `add` requests stash their VF config files.
    pub conf_dir: PathBuf,
}

/// What one action dispatch decided.
enum Dispatch {
    /// Frame bytes bound for the request pipe.
    Forward(Vec<u8>),
    /// Answered locally; `rdata` already holds the reply.
    Local,
    /// Rejected; the reason becomes a `request dropped:` ERROR envelope.
    Reject(String),
}

/// The single writer of the request pipe.
pub struct Serialiser {
    ctx: SerialiserContext,
    rx: mpsc::Receiver<Request>,
    responder_tx: mpsc::Sender<ResponderInput>,
    pipe: tokio::fs::File,
}

impl Serialiser {
    /// Open the request pipe and build the serialiser around it.
    ///
    /// The pipe must already exist; VFd owns its creation. Failure here is
    /// fatal for the bridge.
    pub async fn open(
        ctx: SerialiserContext,
        rx: mpsc::Receiver<Request>,
        responder_tx: mpsc::Sender<ResponderInput>,
        request_pipe: &Path,
    ) -> Result<Self, BridgeError> {
        let file = pipe::open_rw(request_pipe)
            .await
            .map_err(|source| BridgeError::RequestPipeOpen {
                path: request_pipe.to_path_buf(),
                source,
            })?;

        info!(pipe = %request_pipe.display(), "writing requests to VFd");

        Ok(Self {
            ctx,
            rx,
            responder_tx,
            pipe: file,
        })
    }

    /// Drain the serialiser queue until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("serialiser is running");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("serialiser shutting down");
                    break;
                }

                request = self.rx.recv() => {
                    let Some(request) = request else {
                        debug!("serialiser queue closed");
                        break;
                    };
                    self.dispatch(request).await;
                }
            }
        }
    }

    /// Vet one request, write its frame if it has one, and queue the
    /// tracking record.
    async fn dispatch(&mut self, request: Request) {
        debug!(
            source = %request.source,
            exch_key = %request.exch_key,
            msg_key = %request.msg_key,
            "processing request"
        );

        // never process anything we sent ourselves (broker loopback)
        if request.sender() == Some(self.ctx.sender_id.as_str()) {
            debug!(rid = %request.rid, "own message looped back, dropped");
            return;
        }

        let Some(action) = request.action().map(str::to_string) else {
            debug!(source = %request.source, "no action in request, dropped");
            return;
        };

        // self-produced response chatter; nobody is owed an answer
        if action == "response" {
            debug!(source = %request.source, "response action ignored");
            return;
        }

        let timeout_reply = build_reply(
            &self.ctx.sender_id,
            "ERROR",
            "request timeout",
            &request.msg_key,
            None,
        );
        let mut record = TrackedReply::new(request, timeout_reply);

        match self.prepare(&action, &mut record).await {
            Dispatch::Forward(frame) => match self.pipe.write_all(&frame).await {
                Ok(()) => {
                    if let Err(e) = self.pipe.flush().await {
                        warn!(error = %e, "attempt to flush fifo failed");
                        record.rdata = self.error_reply(&record, &format!("unable to send req: {}", e));
                    } else {
                        record.wait = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "attempt to write to fifo failed");
                    record.rdata = self.error_reply(&record, &format!("unable to send req: {}", e));
                }
            },
            Dispatch::Local => {}
            Dispatch::Reject(reason) => {
                record.rdata = self.error_reply(&record, &format!("request dropped: {}", reason));
            }
        }

        if self.responder_tx.send(ResponderInput::Tracking(record)).await.is_err() {
            warn!("responder queue closed, tracking record dropped");
        }
    }

    /// Translate one action into its dispatch decision.
    async fn prepare(&self, action: &str, record: &mut TrackedReply) -> Dispatch {
        let target = record.request.target().map(str::to_string);

        match action {
            // parameterless passthroughs
            "ping" | "dump" => {
                debug!(rid = %record.rid, "sending {}", action);
                Dispatch::Forward(self.frame(action, None, None, record))
            }

            // answered here to prove the broker path without touching VFd
            "Ping" => {
                debug!(exch_key = %record.exch_key, "responding to Ping");
                record.rdata = build_reply(
                    &self.ctx.sender_id,
                    "OK",
                    &format!("Pong: {}", crate::VERSION),
                    &record.msg_key,
                    None,
                );
                Dispatch::Local
            }

            "add" => {
                let Some(target) = target else {
                    return Dispatch::Reject("no target field in request".to_string());
                };
                let Some(data) = record.request.body.get("req_data").filter(|d| d.is_object())
                else {
                    return Dispatch::Reject("no req_data field in request".to_string());
                };

                match self.stash_vf_config(&target, data).await {
                    Ok(fname) => {
                        debug!(file = %fname, "sending add request stashed in config file");
                        Dispatch::Forward(self.frame("add", Some(&fname), None, record))
                    }
                    Err(e) => Dispatch::Reject(format!("unable to update config: {}", e)),
                }
            }

            "del" | "delete" => {
                let Some(target) = target else {
                    return Dispatch::Reject("no target field in request".to_string());
                };
                // the name used on add; VFd probably moved the file, so no directory here
                let fname = format!("{}.json", target);
                debug!(file = %fname, "sending del request with reference name");
                Dispatch::Forward(self.frame("delete", Some(&fname), None, record))
            }

            "mirror" => {
                match record.request.body.get("req_data").and_then(Value::as_str) {
                    Some(data) => Dispatch::Forward(self.frame("mirror", None, Some(data), record)),
                    None => Dispatch::Reject(
                        "pf/vf/direction/target data missing, or was not a string".to_string(),
                    ),
                }
            }

            "show" => {
                let target = target.unwrap_or_default();
                Dispatch::Forward(self.frame("show", None, Some(&target), record))
            }

            other => Dispatch::Reject(format!("unknown action: {}", other)),
        }
    }

    fn frame(
        &self,
        action: &str,
        filename: Option<&str>,
        resource: Option<&str>,
        record: &TrackedReply,
    ) -> Vec<u8> {
        encode_request(action, filename, resource, &self.ctx.resp_fifo, &record.rid)
    }

    fn error_reply(&self, record: &TrackedReply, msg: &str) -> String {
        build_reply(&self.ctx.sender_id, "ERROR", msg, &record.msg_key, None)
    }

    /// Stash VF configuration data as `<conf_dir>/<target>.json`.
    ///
    /// Returns the filename written, which is what goes to VFd.
    async fn stash_vf_config(&self, target: &str, config: &Value) -> std::io::Result<String> {
        let fname = self.ctx.conf_dir.join(format!("{}.json", target));
        tokio::fs::write(&fname, config.to_string()).await?;
        Ok(fname.to_string_lossy().into_owned())
    }
}
