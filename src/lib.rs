//! Unified in-process and inter-process typed messaging.
//!
//! This library provides a single [`IoManager`] façade for passing typed
//! messages between long-running worker modules in a data-acquisition
//! pipeline. Two otherwise distinct transports — bounded in-process queues
//! and network sockets — sit behind one type-parameterized send/receive
//! contract: consumers name a connection and get a typed sender or receiver
//! back, never knowing which transport serves it.
//!
//! # Supported Transports
//!
//! | Transport              | URI scheme                 | Enable Flag         |
//! |:-----------------------|:---------------------------|:--------------------|
//! | **Queue** (default)    | `queue://<kind>:<capacity>`| **N/A** (always on) |
//! | **Inproc** (default)   | `inproc://name`            | **N/A** (always on) |
//! | **ZeroMQ**             | `tcp://host:port`, `ipc://path` | `transport_zmq` |
//!
//! **Note:** The `logging` feature (enabled by default) provides diagnostic
//! output via `tracing`. To disable logging, use `default-features = false`
//! in your `Cargo.toml`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use iomux::{ConnectionId, ConnectionRef, IoManager, Receiver as _, Sender as _, ServiceType};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Reading { channel: u16, value: f64 }
//! iomux::serializable_message!(Reading);
//!
//! fn main() -> iomux::Result<()> {
//!     //
//!     IoManager::get().configure(vec![
//!         ConnectionId::new("readings", ServiceType::Queue, "queue://deque:100"),
//!         ConnectionId::new("monitor_out", ServiceType::NetSender, "inproc://monitor"),
//!     ])?;
//!
//!     let sender = IoManager::get().get_sender::<Reading>(&ConnectionRef::from("readings"))?;
//!     sender.send(Reading { channel: 3, value: 0.25 }, Duration::from_millis(10))?;
//!
//!     let receiver = IoManager::get().get_receiver::<Reading>(&ConnectionRef::from("readings"))?;
//!     let reading = receiver.receive(Duration::from_millis(10))?;
//!     println!("channel {} = {}", reading.channel, reading.value);
//!
//!     // Or push-based: a background worker feeds a callback instead.
//!     IoManager::get().add_callback::<Reading, _>(
//!         &ConnectionRef::from("readings"),
//!         |reading| println!("channel {} = {}", reading.channel, reading.value),
//!     )?;
//!     IoManager::get().remove_callback::<Reading>(&ConnectionRef::from("readings"))?;
//!
//!     IoManager::get().reset();
//!     Ok(())
//! }
//! ```
//!
//! Serializable message types travel over every transport; types declared
//! with a plain `impl Message for T {}` stay in-process: a network send is
//! rejected with [`Error::NotSerializable`] and a network receive yields a
//! default-constructed value. See the [`message`] module for the gate's
//! contract.

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::panic_in_result_fn
    )
)]

////////////////////////////////////////
// Submodules
////////////////////////////////////////

mod callback;
mod connection;
mod iomanager;
mod receiver;
mod sender;
mod timeout;

pub mod message;
pub mod network;
pub mod queue;

mod error;

////////////////////////////////////////
// Public API
////////////////////////////////////////

pub use connection::{load_connections, ConnectionId, ConnectionRef, Direction, ServiceType};
pub use error::{Error, Result};
pub use iomanager::IoManager;
pub use message::Message;
pub use timeout::{BLOCK, NO_BLOCK};

pub use receiver::{NetworkReceiver, QueueReceiver, Receiver, ReceiverControl, SharedReceiver};
pub use sender::{NetworkSender, QueueSender, Sender, SharedSender};

// Transport provider surfaces, for code that needs to reach beneath the
// façade (tests, monitoring shims).
pub use network::{NetReceiver, NetReceiverPtr, NetSender, NetSenderPtr, NetworkManager};
pub use queue::{QueueKind, QueueRegistry, TypedQueue};

// Frame buffer type used by the serialization gate.
pub use bytes::Bytes;

////////////////////////////////////////
// Internal helpers
////////////////////////////////////////

mod macros;
