//! The bridge itself: collectors, serialiser, reader, responder, runtime.
//!
//! Components talk only through typed, bounded queues; each registry is
//! owned by exactly one task. See [`runtime::Bridge`] for the wiring.

mod collector;
mod error;
mod message;
mod reader;
mod responder;
mod runtime;
mod serialiser;

pub use collector::{BridgeFlags, Collector};
pub use error::BridgeError;
pub use message::{build_reply, Request, ResponderInput, TrackedReply};
pub use reader::ResponseReader;
pub use responder::{Responder, ResponderConfig};
pub use runtime::{
    Bridge, BridgeConfig, RESPONDER_CHANNEL_CAPACITY, SERIALISER_CHANNEL_CAPACITY,
};
pub use serialiser::{Serialiser, SerialiserContext};

use uuid::Uuid;

/// Build the identity this process stamps into everything it sends.
///
/// `<hostname>_<pid>` normally; a uuid stands in for the hostname when the
/// system will not give one up. Stable for the life of the process, which
/// is what makes loopback suppression sound.
pub fn gen_sender_id() -> String {
    let pid = std::process::id();
    match hostname() {
        Some(host) => format!("{}_{}", host, pid),
        None => format!("{}_{}", Uuid::new_v4(), pid),
    }
}

fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // Safety: buf outlives the call and its length is passed alongside.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end])
        .ok()
        .map(str::to_string)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_id_carries_the_pid() {
        let id = gen_sender_id();
        assert!(id.ends_with(&format!("_{}", std::process::id())));
    }

    #[test]
    fn sender_id_is_stable_within_a_process() {
        // both halves are process-constant, so repeated calls agree
        assert_eq!(gen_sender_id(), gen_sender_id());
    }
}
