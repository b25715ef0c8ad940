//! Tokay - exchange bridge for the VFd request/response pipes
//!
//! This library implements a bidirectional bridge between a pub/sub message
//! broker and VFd, the local daemon that consumes requests over a named pipe
//! and answers over a second one. Remote clients publish JSON action requests
//! onto one or more request exchanges; the bridge serialises them onto VFd's
//! request pipe, correlates the asynchronous responses coming back over the
//! response pipe, and republishes each reply onto the response exchange under
//! the routing key the requestor asked for.
//!
//! # High-Level API
//!
//! The [`bridge`] module provides the runtime that wires everything together:
//!
//! ```ignore
//! use tokay::bridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::start(config, subscriptions, publisher);
//! bridge.run().await?;
//! ```

pub mod bridge;
pub mod broker;
pub mod config;
pub mod logging;
pub mod pipe;
pub mod protocol;

/// Version of the Tokay library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
