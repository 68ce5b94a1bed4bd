//! Byte-oriented network provider.
//!
//! This module hands out the socket handles that serve `tcp://`, `ipc://`
//! and `inproc://` connections. Handles speak bytes only; the typed layer
//! above ([`NetworkSender`](crate::NetworkSender) /
//! [`NetworkReceiver`](crate::NetworkReceiver)) owns serialization.
//!
//! Backends:
//!
//! - **inproc** (always available) — a broker-within-the-process hub,
//!   deterministic and dependency-free. Defines the reference semantics the
//!   other backend is expected to approximate.
//! - **zmq** (`transport_zmq` feature) — ZeroMQ PUSH/PULL for point-to-point
//!   connections and PUB/SUB for topics, serving `tcp://` and `ipc://`
//!   addresses.

mod inproc;
mod manager;

#[cfg(feature = "transport_zmq")]
mod zeromq;

pub use manager::NetworkManager;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::Result;

/// Sending half of a network connection.
pub trait NetSender: Send + Sync {
    /// Hand one frame to the socket, waiting up to `timeout` for it to be
    /// accepted. A non-empty `topic` selects a publish channel.
    fn send(&self, frame: Bytes, timeout: Duration, topic: &str) -> Result<()>;

    /// Invalidate the handle; subsequent sends fail with
    /// [`UnknownConnection`](crate::Error::UnknownConnection).
    fn close(&self);
}

/// Receiving half of a network connection.
///
/// Plain receivers and topic subscribers share this shape; the manager hands
/// out whichever matches the connection and the caller's ref.
pub trait NetReceiver: Send + Sync {
    /// Read one frame, waiting up to `timeout` for one to arrive.
    fn receive(&self, timeout: Duration) -> Result<Bytes>;

    /// Invalidate the handle; subsequent reads fail with
    /// [`UnknownConnection`](crate::Error::UnknownConnection).
    fn close(&self);
}

/// Shared sender handle.
pub type NetSenderPtr = Arc<dyn NetSender>;

/// Shared receiver handle.
pub type NetReceiverPtr = Arc<dyn NetReceiver>;
