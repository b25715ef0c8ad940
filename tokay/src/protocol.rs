//! Wire protocol spoken over the VFd pipes.
//!
//! Requests travel to VFd as single-line JSON objects terminated by two
//! newlines. Responses come back as multi-line JSON blobs, each terminated
//! by a line holding only the [`EOM_SENTINEL`] marker.

use serde_json::{Map, Value};
use thiserror::Error;

/// Line marking the end of one response blob on the response pipe.
pub const EOM_SENTINEL: &str = "@eom@";

/// Every request written to VFd is double-newline terminated.
pub const FRAME_TERMINATOR: &str = "\n\n";

/// Build the framed request VFd expects on its request pipe:
///
/// ```text
/// { "action": "<action>",
///   "params": { "filename": "<fname>",      // only if provided
///               "resource": "<data>",       // only if provided
///               "r_fifo":   "<resp_fifo>",
///               "vfd_rid":  "<rid>" } }
/// ```
///
/// `rid` is the bridge-generated correlation id; VFd echoes it back as
/// `vfd_rid` so the responder can match the reply to the pending request.
pub fn encode_request(
    action: &str,
    filename: Option<&str>,
    resource: Option<&str>,
    resp_fifo: &str,
    rid: &str,
) -> Vec<u8> {
    let mut params = Map::new();
    if let Some(fname) = filename {
        params.insert("filename".to_string(), Value::from(fname));
    }
    if let Some(data) = resource {
        params.insert("resource".to_string(), Value::from(data));
    }
    params.insert("r_fifo".to_string(), Value::from(resp_fifo));
    params.insert("vfd_rid".to_string(), Value::from(rid));

    let mut frame = Map::new();
    frame.insert("action".to_string(), Value::from(action));
    frame.insert("params".to_string(), Value::Object(params));

    let mut bytes = Value::Object(frame).to_string().into_bytes();
    bytes.extend_from_slice(FRAME_TERMINATOR.as_bytes());
    bytes
}

/// A parsed response blob from VFd.
///
/// `state` and `msg` are only promoted when VFd supplied them as plain
/// strings; everything else stays available through `body`.
#[derive(Debug, Clone)]
pub struct DownstreamReply {
    /// What VFd is communicating; only `response` is matched against pending requests.
    pub action: String,
    /// The `vfd_rid` correlation id the bridge originally sent.
    pub rid: String,
    /// Outcome reported by VFd, when present.
    pub state: Option<String>,
    /// Human-readable message, when present as a string.
    pub msg: Option<String>,
    /// The complete blob, republished verbatim as reply `data`.
    pub body: Value,
}

/// Failures turning a response blob into a [`DownstreamReply`].
#[derive(Debug, Error)]
pub enum ReplyParseError {
    /// The blob was not valid JSON
    #[error("malformed response json: {0}")]
    Json(#[from] serde_json::Error),

    /// The blob parsed but lacks a field the correlation needs
    #[error("response json missing `{0}` field")]
    MissingField(&'static str),
}

impl DownstreamReply {
    /// Parse one sentinel-terminated blob (sentinel already stripped).
    pub fn parse(blob: &[u8]) -> Result<Self, ReplyParseError> {
        let body: Value = serde_json::from_slice(blob)?;

        let action = body
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ReplyParseError::MissingField("action"))?
            .to_string();
        let rid = body
            .get("vfd_rid")
            .and_then(Value::as_str)
            .ok_or(ReplyParseError::MissingField("vfd_rid"))?
            .to_string();

        let state = body
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string);
        let msg = body.get("msg").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            action,
            rid,
            state,
            msg,
            body,
        })
    }
}
