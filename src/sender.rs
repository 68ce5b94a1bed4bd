//! Typed senders.
//!
//! A [`Sender`] moves values of one payload type into one connection. The
//! queue variant transfers ownership straight into the bounded queue; the
//! network variant runs the value through the serialization gate and hands
//! the frame to the socket. Both honor the same timeout contract, including
//! the [`NO_BLOCK`](crate::NO_BLOCK) and [`BLOCK`](crate::BLOCK) sentinels.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::connection::{ConnectionId, ConnectionRef};
use crate::macros::{log_debug, log_error, log_warn};
use crate::message::Message;
use crate::network::{NetSenderPtr, NetworkManager};
use crate::queue::{QueueRegistry, TypedQueue};
use crate::{Error, Result};

/// Sending end of a connection, bound to payload type `T`.
///
/// Handles are shared (`Arc`) and internally synchronized; concurrent sends
/// on one handle serialize, so messages from a single sender reach the
/// transport in call order.
pub trait Sender<T: Message>: Send + Sync {
    /// Caller-chosen name of the ref this endpoint was built from.
    fn name(&self) -> &str;

    /// Uid of the connection this endpoint serves.
    fn uid(&self) -> &str;

    /// Move `data` into the connection, waiting up to `timeout`.
    fn send(&self, data: T, timeout: Duration) -> Result<()> {
        self.send_to_topic(data, timeout, "")
    }

    /// Like [`send`](Sender::send), with a publish topic. Topics select a
    /// channel on publish/subscribe connections and are meaningless for
    /// queues.
    fn send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<()>;

    /// Like [`send`](Sender::send), but reports **Timeout** and
    /// **NotSerializable** as `Ok(false)` with a logged error instead of
    /// raising. All other kinds still surface as errors.
    fn try_send(&self, data: T, timeout: Duration) -> Result<bool> {
        self.try_send_to_topic(data, timeout, "")
    }

    /// Like [`try_send`](Sender::try_send), with a publish topic.
    fn try_send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<bool>;
}

/// Shared sender handle, as returned by the façade.
pub type SharedSender<T> = Arc<dyn Sender<T>>;

/// Queue-backed sender: moves values into the bounded queue.
pub struct QueueSender<T: Message> {
    name: String,
    uid: String,
    queue: Arc<TypedQueue<T>>,
}

impl<T: Message> QueueSender<T> {
    pub(crate) fn new(id: &ConnectionId, conn_ref: &ConnectionRef) -> Result<Self> {
        let queue = QueueRegistry::get().get_queue::<T>(&id.uid)?;
        log_debug!("queue sender '{}' bound to '{}'", conn_ref.name, id.uid);
        Ok(Self {
            name: conn_ref.name.clone(),
            uid: id.uid.clone(),
            queue,
        })
    }
}

impl<T: Message> Sender<T> for QueueSender<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<()> {
        if !topic.is_empty() {
            log_warn!(
                "topic '{topic}' ignored: connection '{}' is queue-backed",
                self.uid
            );
        }
        self.queue.push(data, timeout)
    }

    fn try_send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<bool> {
        if !topic.is_empty() {
            log_warn!(
                "topic '{topic}' ignored: connection '{}' is queue-backed",
                self.uid
            );
        }
        let accepted = self.queue.try_push(data, timeout)?;
        if !accepted {
            log_error!("push on connection '{}' timed out after {timeout:?}", self.uid);
        }
        Ok(accepted)
    }
}

/// Network-backed sender: serializes, then hands the frame to the socket.
pub struct NetworkSender<T: Message> {
    name: String,
    uid: String,
    socket: NetSenderPtr,
    write_lock: Mutex<()>,
    _payload: PhantomData<fn(T)>,
}

impl<T: Message> NetworkSender<T> {
    pub(crate) fn new(id: &ConnectionId, conn_ref: &ConnectionRef) -> Result<Self> {
        let socket = NetworkManager::get().get_sender(&id.uid)?;
        log_debug!("network sender '{}' bound to '{}'", conn_ref.name, id.uid);
        Ok(Self {
            name: conn_ref.name.clone(),
            uid: id.uid.clone(),
            socket,
            write_lock: Mutex::new(()),
            _payload: PhantomData,
        })
    }

    fn write(&self, data: &T, timeout: Duration, topic: &str) -> Result<()> {
        if !T::SERIALIZABLE {
            return Err(Error::not_serializable::<T>());
        }
        let frame = data.encode()?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.socket.send(frame, timeout, topic)
    }
}

impl<T: Message> Sender<T> for NetworkSender<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<()> {
        self.write(&data, timeout, topic)
    }

    fn try_send_to_topic(&self, data: T, timeout: Duration, topic: &str) -> Result<bool> {
        match self.write(&data, timeout, topic) {
            Ok(()) => Ok(true),
            Err(err @ (Error::Timeout { .. } | Error::NotSerializable(_))) => {
                log_error!("send on connection '{}' failed: {err}", self.uid);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
