//! The sender/receiver factory façade.
//!
//! [`IoManager`] is the single entry point user code sees: `configure` the
//! catalog once, then request typed endpoints by connection ref. The façade
//! resolves the ref in the catalog, selects the transport provider, builds
//! the endpoint, and memoizes it per `(uid, topic, payload type)` so every
//! caller naming the same connection shares one endpoint.
//!
//! There is exactly one `IoManager` per process, obtained through
//! [`IoManager::get`]. It cannot be constructed, copied, or moved by user
//! code.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::connection::{parse_queue_uri, ConnectionId, ConnectionRef, Direction, ServiceType};
use crate::macros::{log_debug, log_info};
use crate::message::Message;
use crate::network::NetworkManager;
use crate::queue::{QueueRegistry, QueueSpec};
use crate::receiver::{NetworkReceiver, QueueReceiver, ReceiverControl, SharedReceiver};
use crate::sender::{NetworkSender, QueueSender, SharedSender};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EndpointKind {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointKey {
    uid: String,
    topic: Option<String>,
    kind: EndpointKind,
    payload: TypeId,
}

struct CachedEndpoint {
    /// `Arc<dyn Sender<T>>` or `Arc<dyn Receiver<T>>`, erased; the cache key
    /// pins the payload type, so downcasting back is always well-typed.
    handle: Box<dyn std::any::Any + Send + Sync>,
    /// Receivers also keep a type-independent handle so `reset` can stop
    /// their callback workers.
    control: Option<Arc<dyn ReceiverControl>>,
}

#[derive(Default)]
struct Inner {
    catalog: HashMap<String, ConnectionId>,
    endpoints: HashMap<EndpointKey, CachedEndpoint>,
}

/// Process-wide sender/receiver factory.
pub struct IoManager {
    inner: Mutex<Inner>,
}

static INSTANCE: OnceLock<IoManager> = OnceLock::new();

impl IoManager {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The process-wide façade instance.
    pub fn get() -> &'static IoManager {
        INSTANCE.get_or_init(IoManager::new)
    }

    /// Populate the catalog and configure the transport providers.
    ///
    /// The connection list is partitioned by service type: queue
    /// declarations go to the [`QueueRegistry`], network declarations to
    /// the [`NetworkManager`].
    ///
    /// A configured façade must be [`reset`](IoManager::reset) before it
    /// accepts a new catalog.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a duplicate uid, a URI that fails to
    /// parse for its declared service type, a provider that rejects its
    /// subset, or a façade that is already configured.
    pub fn configure(&self, connections: Vec<ConnectionId>) -> Result<()> {
        let mut inner = self.lock();
        if !inner.catalog.is_empty() {
            return Err(Error::Configuration(
                "already configured; call reset() first".into(),
            ));
        }

        let mut seen = HashSet::new();
        let mut queue_specs = Vec::new();
        let mut net_connections = Vec::new();
        for id in &connections {
            if !seen.insert(id.uid.clone()) {
                return Err(Error::Configuration(format!(
                    "connection '{}' is declared twice",
                    id.uid
                )));
            }
            id.validate()?;

            match id.service_type {
                ServiceType::Queue => {
                    let (kind, capacity) = parse_queue_uri(&id.uid, &id.uri)?;
                    queue_specs.push(QueueSpec {
                        uid: id.uid.clone(),
                        kind,
                        capacity,
                    });
                }
                ServiceType::NetSender | ServiceType::NetReceiver | ServiceType::PubSub => {
                    net_connections.push(id.clone());
                }
            }
        }

        QueueRegistry::get().configure(queue_specs)?;
        if let Err(err) = NetworkManager::get().configure(net_connections) {
            QueueRegistry::get().reset();
            return Err(err);
        }

        log_info!("catalog configured with {} connection(s)", connections.len());
        inner.catalog = connections
            .into_iter()
            .map(|id| (id.uid.clone(), id))
            .collect();
        Ok(())
    }

    /// Fetch (building and caching on first use) the typed sender for a
    /// connection ref.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownConnection`] if the ref's uid is not in the catalog;
    /// [`Error::DirectionMismatch`] if the ref is marked `Input` or the
    /// connection is a network receiver.
    pub fn get_sender<T: Message>(&self, conn_ref: &ConnectionRef) -> Result<SharedSender<T>> {
        let mut inner = self.lock();
        let id = inner
            .catalog
            .get(&conn_ref.uid)
            .cloned()
            .ok_or_else(|| Error::UnknownConnection(conn_ref.uid.clone()))?;

        if conn_ref.dir == Some(Direction::Input) || id.service_type == ServiceType::NetReceiver {
            return Err(Error::DirectionMismatch {
                uid: id.uid,
                service: id.service_type,
                requested: "sender",
            });
        }

        let key = EndpointKey {
            uid: id.uid.clone(),
            topic: None,
            kind: EndpointKind::Sender,
            payload: TypeId::of::<T>(),
        };
        if let Some(cached) = inner.endpoints.get(&key) {
            if let Some(handle) = cached.handle.downcast_ref::<SharedSender<T>>() {
                return Ok(handle.clone());
            }
        }

        log_debug!("building sender for '{}' ({:?})", id.uid, id.service_type);
        let sender: SharedSender<T> = match id.service_type {
            ServiceType::Queue => Arc::new(QueueSender::new(&id, conn_ref)?),
            _ => Arc::new(NetworkSender::new(&id, conn_ref)?),
        };
        inner.endpoints.insert(
            key,
            CachedEndpoint {
                handle: Box::new(sender.clone()),
                control: None,
            },
        );
        Ok(sender)
    }

    /// Fetch (building and caching on first use) the typed receiver for a
    /// connection ref.
    ///
    /// For a publish/subscribe connection whose ref names a topic, the
    /// receiver drains the provider's subscription for that topic; refs
    /// naming different topics get distinct receivers.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownConnection`] if the ref's uid is not in the catalog;
    /// [`Error::DirectionMismatch`] if the ref is marked `Output` or the
    /// connection is a network sender.
    pub fn get_receiver<T: Message>(&self, conn_ref: &ConnectionRef) -> Result<SharedReceiver<T>> {
        let mut inner = self.lock();
        let id = inner
            .catalog
            .get(&conn_ref.uid)
            .cloned()
            .ok_or_else(|| Error::UnknownConnection(conn_ref.uid.clone()))?;

        if conn_ref.dir == Some(Direction::Output) || id.service_type == ServiceType::NetSender {
            return Err(Error::DirectionMismatch {
                uid: id.uid,
                service: id.service_type,
                requested: "receiver",
            });
        }

        let topic = match id.service_type {
            ServiceType::PubSub => conn_ref.topic.clone(),
            _ => None,
        };
        let key = EndpointKey {
            uid: id.uid.clone(),
            topic,
            kind: EndpointKind::Receiver,
            payload: TypeId::of::<T>(),
        };
        if let Some(cached) = inner.endpoints.get(&key) {
            if let Some(handle) = cached.handle.downcast_ref::<SharedReceiver<T>>() {
                return Ok(handle.clone());
            }
        }

        log_debug!("building receiver for '{}' ({:?})", id.uid, id.service_type);
        let (receiver, control): (SharedReceiver<T>, Arc<dyn ReceiverControl>) =
            match id.service_type {
                ServiceType::Queue => {
                    let receiver = Arc::new(QueueReceiver::new(&id, conn_ref)?);
                    (
                        receiver.clone() as SharedReceiver<T>,
                        receiver as Arc<dyn ReceiverControl>,
                    )
                }
                _ => {
                    let receiver = Arc::new(NetworkReceiver::new(&id, conn_ref)?);
                    (
                        receiver.clone() as SharedReceiver<T>,
                        receiver as Arc<dyn ReceiverControl>,
                    )
                }
            };
        inner.endpoints.insert(
            key,
            CachedEndpoint {
                handle: Box::new(receiver.clone()),
                control: Some(control),
            },
        );
        Ok(receiver)
    }

    /// Register a consumer callback on a connection's receiver.
    ///
    /// Convenience for [`get_receiver`](IoManager::get_receiver) followed by
    /// [`Receiver::add_callback`].
    pub fn add_callback<T, F>(&self, conn_ref: &ConnectionRef, consumer: F) -> Result<()>
    where
        T: Message,
        F: FnMut(&mut T) + Send + 'static,
    {
        let receiver = self.get_receiver::<T>(conn_ref)?;
        receiver.add_callback(Box::new(consumer))
    }

    /// Stop and join a connection receiver's callback worker.
    pub fn remove_callback<T: Message>(&self, conn_ref: &ConnectionRef) -> Result<()> {
        let receiver = self.get_receiver::<T>(conn_ref)?;
        receiver.remove_callback();
        Ok(())
    }

    /// Tear everything down: stop all callback workers, drop the endpoint
    /// cache, clear the catalog, and reset both transport providers.
    ///
    /// Endpoint handles still held by user code fail with
    /// [`Error::UnknownConnection`] on their next operation. Safe to call
    /// repeatedly; `configure` accepts a new catalog afterwards.
    pub fn reset(&self) {
        let mut inner = self.lock();
        for endpoint in inner.endpoints.values() {
            if let Some(control) = &endpoint.control {
                control.remove_callback();
            }
        }
        inner.endpoints.clear();
        inner.catalog.clear();

        QueueRegistry::get().reset();
        NetworkManager::get().reset();
        log_debug!("io manager reset");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
