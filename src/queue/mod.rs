//! Bounded in-process queue provider.
//!
//! This module hands out the typed queues that serve `queue://` connections.
//! Queues move values by ownership transfer; the serialization gate is never
//! consulted on this path.
//!
//! The provider is a process-wide [`QueueRegistry`]: `configure` declares the
//! queues, `get_queue` lazily creates a [`TypedQueue`] bound to a payload
//! type on first request, and `reset` closes every queue so stale handles
//! fail rather than operate on a ghost transport.
//!
//! Both declared queue kinds (`deque`, `spsc`) are served by one bounded
//! MPMC ring; the kind tag is recorded on the spec and reported in
//! diagnostics.

mod registry;
mod typed;

pub use registry::{QueueRegistry, QueueSpec};
pub use typed::TypedQueue;

use serde::{Deserialize, Serialize};

/// Declared queue variant, from the `queue://<kind>:<capacity>` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Standard double-ended queue.
    Deque,
    /// Single-producer/single-consumer ring buffer.
    Spsc,
}

impl QueueKind {
    /// Parse the `<kind>` tag of a queue URI.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "deque" => Some(QueueKind::Deque),
            "spsc" => Some(QueueKind::Spsc),
            _ => None,
        }
    }
}
