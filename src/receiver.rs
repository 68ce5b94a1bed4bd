//! Typed receivers.
//!
//! A [`Receiver`] pulls values of one payload type from one connection,
//! either directly through [`receive`](Receiver::receive) or by registering
//! a consumer callback that a background worker feeds. The two modes are
//! exclusive: while a callback binding is active, direct receives fail with
//! [`Error::CallbackConflict`].
//!
//! On network connections the serialization gate short-circuits the read
//! path for non-serializable payload types: the receiver returns a
//! default-constructed value without consulting the socket.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::callback::{CallbackBinding, NETWORK_POLL, QUEUE_POLL};
use crate::connection::{ConnectionId, ConnectionRef, ServiceType};
use crate::macros::log_debug;
use crate::message::Message;
use crate::network::{NetReceiverPtr, NetworkManager};
use crate::queue::{QueueRegistry, TypedQueue};
use crate::{Error, Result};

/// Type-independent receiver operations.
///
/// Split from [`Receiver`] so the façade can tear down callback bindings
/// without knowing the payload type.
pub trait ReceiverControl: Send + Sync {
    /// Caller-chosen name of the ref this endpoint was built from.
    fn name(&self) -> &str;

    /// Uid of the connection this endpoint serves.
    fn uid(&self) -> &str;

    /// Stop and join the callback worker, if one is active. Idempotent.
    fn remove_callback(&self);
}

/// Receiving end of a connection, bound to payload type `T`.
pub trait Receiver<T: Message>: ReceiverControl {
    /// Pull one value, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if nothing arrives within the window;
    /// [`Error::CallbackConflict`] if a callback binding is active.
    fn receive(&self, timeout: Duration) -> Result<T>;

    /// Place the receiver in callback mode: a background worker pulls from
    /// the transport and invokes `consumer` with each value. Replaces any
    /// previous binding, stopping its worker first.
    ///
    /// The consumer gets a mutable reference and may move the value out.
    fn add_callback(&self, consumer: Box<dyn FnMut(&mut T) + Send>) -> Result<()>;
}

/// Shared receiver handle, as returned by the façade.
pub type SharedReceiver<T> = Arc<dyn Receiver<T>>;

fn lock_binding<'a>(
    binding: &'a Mutex<Option<CallbackBinding>>,
) -> MutexGuard<'a, Option<CallbackBinding>> {
    binding.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue-backed receiver: pops values from the bounded queue.
pub struct QueueReceiver<T: Message> {
    name: String,
    uid: String,
    queue: Arc<TypedQueue<T>>,
    with_callback: AtomicBool,
    binding: Mutex<Option<CallbackBinding>>,
}

impl<T: Message> QueueReceiver<T> {
    pub(crate) fn new(id: &ConnectionId, conn_ref: &ConnectionRef) -> Result<Self> {
        let queue = QueueRegistry::get().get_queue::<T>(&id.uid)?;
        log_debug!("queue receiver '{}' bound to '{}'", conn_ref.name, id.uid);
        Ok(Self {
            name: conn_ref.name.clone(),
            uid: id.uid.clone(),
            queue,
            with_callback: AtomicBool::new(false),
            binding: Mutex::new(None),
        })
    }

    fn teardown(&self) {
        let mut slot = lock_binding(&self.binding);
        self.with_callback.store(false, Ordering::Release);
        if let Some(binding) = slot.take() {
            binding.stop();
        }
    }
}

impl<T: Message> ReceiverControl for QueueReceiver<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn remove_callback(&self) {
        self.teardown();
    }
}

impl<T: Message> Receiver<T> for QueueReceiver<T> {
    fn receive(&self, timeout: Duration) -> Result<T> {
        if self.with_callback.load(Ordering::Acquire) {
            return Err(Error::CallbackConflict(self.uid.clone()));
        }
        self.queue.pop(timeout)
    }

    fn add_callback(&self, consumer: Box<dyn FnMut(&mut T) + Send>) -> Result<()> {
        // The binding lock is held across the whole replacement so
        // concurrent add/remove calls serialize.
        let mut slot = lock_binding(&self.binding);
        if let Some(previous) = slot.take() {
            self.with_callback.store(false, Ordering::Release);
            previous.stop();
        }

        log_debug!("registering callback on '{}'", self.uid);
        let queue = self.queue.clone();

        // Claim the receiver before the worker starts pulling, so a
        // concurrent receive can never race the worker for the queue.
        self.with_callback.store(true, Ordering::Release);
        let binding =
            match CallbackBinding::spawn(&self.uid, QUEUE_POLL, move |poll| queue.pop(poll), consumer)
            {
                Ok(binding) => binding,
                Err(err) => {
                    self.with_callback.store(false, Ordering::Release);
                    return Err(err);
                }
            };
        *slot = Some(binding);
        Ok(())
    }
}

impl<T: Message> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Network-backed receiver: reads frames from the socket and decodes them.
///
/// For a publish/subscribe connection the manager's subscriber handle is
/// used (resolved by topic when the ref names one); otherwise the plain
/// receiver handle.
pub struct NetworkReceiver<T: Message> {
    name: String,
    uid: String,
    socket: NetReceiverPtr,
    read_lock: Arc<Mutex<()>>,
    with_callback: AtomicBool,
    binding: Mutex<Option<CallbackBinding>>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Message> NetworkReceiver<T> {
    pub(crate) fn new(id: &ConnectionId, conn_ref: &ConnectionRef) -> Result<Self> {
        let manager = NetworkManager::get();
        let socket = match (&id.service_type, &conn_ref.topic) {
            (ServiceType::PubSub, Some(topic)) => manager.get_subscriber(topic)?,
            _ => manager.get_receiver(&id.uid)?,
        };
        log_debug!("network receiver '{}' bound to '{}'", conn_ref.name, id.uid);
        Ok(Self {
            name: conn_ref.name.clone(),
            uid: id.uid.clone(),
            socket,
            read_lock: Arc::new(Mutex::new(())),
            with_callback: AtomicBool::new(false),
            binding: Mutex::new(None),
            _payload: PhantomData,
        })
    }

    /// One bounded read. Non-serializable payload types never touch the
    /// socket; they decode to a default value. Zero-length frames are
    /// transport artifacts, not encodings, and fall through to the timeout
    /// error.
    fn read_network(
        socket: &NetReceiverPtr,
        read_lock: &Mutex<()>,
        uid: &str,
        timeout: Duration,
    ) -> Result<T> {
        if !T::SERIALIZABLE {
            return Ok(T::default());
        }

        let frame = {
            let _guard = read_lock.lock().unwrap_or_else(PoisonError::into_inner);
            socket.receive(timeout)?
        };
        if frame.is_empty() {
            return Err(Error::timeout(uid, "receive", timeout));
        }
        T::decode(&frame)
    }

    fn teardown(&self) {
        let mut slot = lock_binding(&self.binding);
        self.with_callback.store(false, Ordering::Release);
        if let Some(binding) = slot.take() {
            binding.stop();
        }
    }
}

impl<T: Message> ReceiverControl for NetworkReceiver<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn remove_callback(&self) {
        self.teardown();
    }
}

impl<T: Message> Receiver<T> for NetworkReceiver<T> {
    fn receive(&self, timeout: Duration) -> Result<T> {
        if self.with_callback.load(Ordering::Acquire) {
            return Err(Error::CallbackConflict(self.uid.clone()));
        }
        Self::read_network(&self.socket, &self.read_lock, &self.uid, timeout)
    }

    fn add_callback(&self, consumer: Box<dyn FnMut(&mut T) + Send>) -> Result<()> {
        let mut slot = lock_binding(&self.binding);
        if let Some(previous) = slot.take() {
            self.with_callback.store(false, Ordering::Release);
            previous.stop();
        }

        log_debug!("registering callback on '{}'", self.uid);
        let socket = self.socket.clone();
        let read_lock = self.read_lock.clone();
        let uid = self.uid.clone();
        let pull = move |poll: Duration| {
            if !T::SERIALIZABLE {
                // No frame can ever arrive for this type; idle at the poll
                // rate instead of spinning on the gate's default value.
                thread::sleep(poll);
                return Ok(T::default());
            }
            Self::read_network(&socket, &read_lock, &uid, poll)
        };

        // Claim the receiver before the worker starts pulling, so a
        // concurrent receive can never race the worker for the socket.
        self.with_callback.store(true, Ordering::Release);
        let binding = match CallbackBinding::spawn(&self.uid, NETWORK_POLL, pull, consumer) {
            Ok(binding) => binding,
            Err(err) => {
                self.with_callback.store(false, Ordering::Release);
                return Err(err);
            }
        };
        *slot = Some(binding);
        Ok(())
    }
}

impl<T: Message> Drop for NetworkReceiver<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
