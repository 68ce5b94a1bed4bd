//! Process-wide network connection manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::connection::{parse_net_uri, ConnectionId, NetScheme};
use crate::macros::log_debug;
use crate::network::inproc::{InprocHub, InprocReceiver, InprocSender, InprocSubscriber};
use crate::network::{NetReceiverPtr, NetSenderPtr};
use crate::{Error, Result, ServiceType};

struct NetConnection {
    id: ConnectionId,
    scheme: NetScheme,
}

struct Inner {
    connections: HashMap<String, NetConnection>,
    senders: HashMap<String, NetSenderPtr>,
    receivers: HashMap<String, NetReceiverPtr>,
    subscribers: HashMap<String, NetReceiverPtr>,
    hub: Arc<InprocHub>,
    #[cfg(feature = "transport_zmq")]
    context: zmq::Context,
}

impl Inner {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            senders: HashMap::new(),
            receivers: HashMap::new(),
            subscribers: HashMap::new(),
            hub: InprocHub::new(),
            #[cfg(feature = "transport_zmq")]
            context: zmq::Context::new(),
        }
    }
}

/// Process-wide directory of network connections.
///
/// Declared by [`configure`](NetworkManager::configure); socket handles are
/// created lazily, memoized per uid (per topic for subscribers), and shared
/// between the manager and the typed endpoints above it.
pub struct NetworkManager {
    inner: Mutex<Inner>,
}

static MANAGER: OnceLock<NetworkManager> = OnceLock::new();

impl NetworkManager {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// The process-wide manager instance.
    pub fn get() -> &'static NetworkManager {
        MANAGER.get_or_init(NetworkManager::new)
    }

    /// Declare a set of network connections.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a duplicate uid, a malformed URI, or a
    /// URI scheme this build cannot serve (`tcp://` and `ipc://` require
    /// the `transport_zmq` feature).
    pub fn configure(&self, connections: Vec<ConnectionId>) -> Result<()> {
        let mut inner = self.lock();

        // Validate the whole batch before committing any of it, so a
        // rejected batch leaves the manager untouched.
        let mut incoming = std::collections::HashSet::new();
        let mut parsed = Vec::with_capacity(connections.len());
        for id in connections {
            if inner.connections.contains_key(&id.uid) || !incoming.insert(id.uid.clone()) {
                return Err(Error::Configuration(format!(
                    "network connection '{}' is declared twice",
                    id.uid
                )));
            }

            let scheme = parse_net_uri(&id.uid, &id.uri)?;
            #[cfg(not(feature = "transport_zmq"))]
            if scheme != NetScheme::Inproc {
                return Err(Error::Configuration(format!(
                    "connection '{}': '{}' requires the transport_zmq feature",
                    id.uid, id.uri
                )));
            }
            parsed.push(NetConnection { id, scheme });
        }

        for conn in parsed {
            log_debug!("network connection '{}' at '{}'", conn.id.uid, conn.id.uri);
            inner.connections.insert(conn.id.uid.clone(), conn);
        }
        Ok(())
    }

    /// Fetch the sending handle for `uid`.
    pub fn get_sender(&self, uid: &str) -> Result<NetSenderPtr> {
        let mut inner = self.lock();
        if let Some(sender) = inner.senders.get(uid) {
            return Ok(sender.clone());
        }

        let conn = inner
            .connections
            .get(uid)
            .ok_or_else(|| Error::UnknownConnection(uid.to_string()))?;

        let sender: NetSenderPtr = match conn.scheme {
            NetScheme::Inproc => Arc::new(InprocSender::new(
                uid,
                &conn.id.uri,
                inner.hub.clone(),
            )),
            #[cfg(feature = "transport_zmq")]
            NetScheme::Tcp | NetScheme::Ipc => super::zeromq::create_sender(
                &inner.context,
                uid,
                &conn.id.uri,
                conn.id.service_type == ServiceType::PubSub,
            )?,
            #[cfg(not(feature = "transport_zmq"))]
            _ => return Err(Error::UnknownConnection(uid.to_string())),
        };

        inner.senders.insert(uid.to_string(), sender.clone());
        Ok(sender)
    }

    /// Fetch the receiving handle for `uid`.
    ///
    /// For a publish/subscribe connection this is a subscribe-all handle;
    /// use [`get_subscriber`](NetworkManager::get_subscriber) to filter by
    /// topic.
    pub fn get_receiver(&self, uid: &str) -> Result<NetReceiverPtr> {
        let mut inner = self.lock();
        if let Some(receiver) = inner.receivers.get(uid) {
            return Ok(receiver.clone());
        }

        let conn = inner
            .connections
            .get(uid)
            .ok_or_else(|| Error::UnknownConnection(uid.to_string()))?;
        let pubsub = conn.id.service_type == ServiceType::PubSub;

        let receiver: NetReceiverPtr = match conn.scheme {
            NetScheme::Inproc => {
                if pubsub {
                    Arc::new(InprocSubscriber::all_topics(uid, &inner.hub))
                } else {
                    Arc::new(InprocReceiver::new(uid, &conn.id.uri, inner.hub.clone()))
                }
            }
            #[cfg(feature = "transport_zmq")]
            NetScheme::Tcp | NetScheme::Ipc => {
                if pubsub {
                    super::zeromq::create_subscriber(&inner.context, uid, &[conn.id.uri.as_str()], "")?
                } else {
                    super::zeromq::create_receiver(&inner.context, uid, &conn.id.uri)?
                }
            }
            #[cfg(not(feature = "transport_zmq"))]
            _ => return Err(Error::UnknownConnection(uid.to_string())),
        };

        inner.receivers.insert(uid.to_string(), receiver.clone());
        Ok(receiver)
    }

    /// Fetch the subscription handle for `topic`.
    ///
    /// The handle is shared: all requests for one topic drain the same
    /// subscription.
    pub fn get_subscriber(&self, topic: &str) -> Result<NetReceiverPtr> {
        let mut inner = self.lock();
        if let Some(subscriber) = inner.subscribers.get(topic) {
            return Ok(subscriber.clone());
        }

        // A ZeroMQ subscriber aggregates every configured publish/subscribe
        // address; when none needs the zmq backend, the hub serves the topic.
        #[cfg(feature = "transport_zmq")]
        {
            let addresses: Vec<&str> = inner
                .connections
                .values()
                .filter(|conn| {
                    conn.id.service_type == ServiceType::PubSub && conn.scheme != NetScheme::Inproc
                })
                .map(|conn| conn.id.uri.as_str())
                .collect();
            if !addresses.is_empty() {
                let subscriber =
                    super::zeromq::create_subscriber(&inner.context, topic, &addresses, topic)?;
                inner
                    .subscribers
                    .insert(topic.to_string(), subscriber.clone());
                return Ok(subscriber);
            }
        }

        let subscriber: NetReceiverPtr =
            Arc::new(InprocSubscriber::new(topic, topic, &inner.hub));
        inner
            .subscribers
            .insert(topic.to_string(), subscriber.clone());
        Ok(subscriber)
    }

    /// Close every handle and drop all declarations.
    ///
    /// Handles already held by endpoints observe
    /// [`Error::UnknownConnection`] on their next operation. Safe to call
    /// repeatedly.
    pub fn reset(&self) {
        let mut inner = self.lock();
        for sender in inner.senders.values() {
            sender.close();
        }
        for receiver in inner.receivers.values() {
            receiver.close();
        }
        for subscriber in inner.subscribers.values() {
            subscriber.close();
        }
        inner.senders.clear();
        inner.receivers.clear();
        inner.subscribers.clear();
        inner.connections.clear();
        inner.hub.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
