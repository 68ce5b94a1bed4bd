//! In-process network backend.
//!
//! A broker simulated within the process: point-to-point connections map to
//! one bounded channel per address, publish/subscribe to per-topic fan-out
//! lists. This backend defines the reference semantics for the network
//! provider:
//!
//! - Once a receiver or subscriber handle exists, subsequent matching sends
//!   are deliverable; delivery is deterministic within the process.
//! - Point-to-point sends honor the caller's timeout against the channel
//!   bound and are never lossy.
//! - Topic fan-out is lossy under back-pressure: a subscriber whose inbox is
//!   full misses the frame, as with a PUB socket at its high-water mark.
//!
//! Frames travel by address string equality; no pattern matching, no
//! persistence, no failure simulation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};

use crate::macros::log_debug;
use crate::network::{NetReceiver, NetSender};
use crate::timeout::Wait;
use crate::{Error, Result};

/// Channel bound for direct channels and subscriber inboxes.
const INPROC_DEPTH: usize = 1000;

/// Subscription key matching every topic.
const ALL_TOPICS: &str = "";

#[derive(Clone)]
struct DirectChannel {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

#[derive(Default)]
struct HubState {
    direct: HashMap<String, DirectChannel>,
    topics: HashMap<String, Vec<Sender<Bytes>>>,
}

/// Shared message bus for the in-process backend.
///
/// Owned by the [`NetworkManager`](crate::NetworkManager); all inproc socket
/// handles created by one manager share one hub, exactly as sockets
/// connected to one broker would.
pub(crate) struct InprocHub {
    state: RwLock<HubState>,
}

impl InprocHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(HubState::default()),
        })
    }

    /// Direct channel for `address`, created on first use by either end.
    fn direct(&self, address: &str) -> DirectChannel {
        if let Some(channel) = self.read().direct.get(address) {
            return channel.clone();
        }

        let mut state = self.write();
        state
            .direct
            .entry(address.to_string())
            .or_insert_with(|| {
                let (tx, rx) = bounded(INPROC_DEPTH);
                DirectChannel { tx, rx }
            })
            .clone()
    }

    fn publish(
        &self,
        uid: &str,
        address: &str,
        frame: Bytes,
        timeout: Duration,
        topic: &str,
    ) -> Result<()> {
        if topic.is_empty() {
            let channel = self.direct(address);
            return match Wait::classify(timeout) {
                Wait::NoBlock => match channel.tx.try_send(frame) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => Err(Error::timeout(uid, "send", timeout)),
                    Err(TrySendError::Disconnected(_)) => {
                        Err(Error::UnknownConnection(uid.to_string()))
                    }
                },
                Wait::Bounded(wait) => match channel.tx.send_timeout(frame, wait) {
                    Ok(()) => Ok(()),
                    Err(SendTimeoutError::Timeout(_)) => Err(Error::timeout(uid, "send", timeout)),
                    Err(SendTimeoutError::Disconnected(_)) => {
                        Err(Error::UnknownConnection(uid.to_string()))
                    }
                },
                Wait::Forever => channel
                    .tx
                    .send(frame)
                    .map_err(|_| Error::UnknownConnection(uid.to_string())),
            };
        }

        // Topic fan-out. Lossy on full inboxes; closed inboxes are skipped.
        let state = self.read();
        let subscriptions = state
            .topics
            .get(topic)
            .into_iter()
            .chain(state.topics.get(ALL_TOPICS))
            .flatten();
        for inbox in subscriptions {
            match inbox.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log_debug!("topic '{topic}': dropping frame for a full subscriber inbox");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        Ok(())
    }

    fn receive(&self, uid: &str, address: &str, timeout: Duration) -> Result<Bytes> {
        let channel = self.direct(address);
        match Wait::classify(timeout) {
            Wait::NoBlock => match channel.rx.try_recv() {
                Ok(frame) => Ok(frame),
                Err(TryRecvError::Empty) => Err(Error::timeout(uid, "receive", timeout)),
                Err(TryRecvError::Disconnected) => Err(Error::UnknownConnection(uid.to_string())),
            },
            Wait::Bounded(wait) => match channel.rx.recv_timeout(wait) {
                Ok(frame) => Ok(frame),
                Err(RecvTimeoutError::Timeout) => Err(Error::timeout(uid, "receive", timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(Error::UnknownConnection(uid.to_string()))
                }
            },
            Wait::Forever => channel
                .rx
                .recv()
                .map_err(|_| Error::UnknownConnection(uid.to_string())),
        }
    }

    /// Register a subscription and return its inbox. An empty topic
    /// subscribes to every topic.
    fn subscribe(&self, topic: &str) -> Receiver<Bytes> {
        log_debug!("inproc subscribe to topic '{topic}'");
        let (tx, rx) = bounded(INPROC_DEPTH);
        let mut state = self.write();
        state.topics.entry(topic.to_string()).or_default().push(tx);
        rx
    }

    /// Drop every channel and subscription.
    pub(crate) fn clear(&self) {
        let mut state = self.write();
        state.direct.clear();
        state.topics.clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sending handle on the inproc hub.
pub(crate) struct InprocSender {
    uid: String,
    address: String,
    hub: Arc<InprocHub>,
    closed: AtomicBool,
}

impl InprocSender {
    pub(crate) fn new(uid: &str, address: &str, hub: Arc<InprocHub>) -> Self {
        Self {
            uid: uid.to_string(),
            address: address.to_string(),
            hub,
            closed: AtomicBool::new(false),
        }
    }
}

impl NetSender for InprocSender {
    fn send(&self, frame: Bytes, timeout: Duration, topic: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UnknownConnection(self.uid.clone()));
        }
        self.hub
            .publish(&self.uid, &self.address, frame, timeout, topic)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Point-to-point receiving handle on the inproc hub.
pub(crate) struct InprocReceiver {
    uid: String,
    address: String,
    hub: Arc<InprocHub>,
    closed: AtomicBool,
}

impl InprocReceiver {
    pub(crate) fn new(uid: &str, address: &str, hub: Arc<InprocHub>) -> Self {
        Self {
            uid: uid.to_string(),
            address: address.to_string(),
            hub,
            closed: AtomicBool::new(false),
        }
    }
}

impl NetReceiver for InprocReceiver {
    fn receive(&self, timeout: Duration) -> Result<Bytes> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UnknownConnection(self.uid.clone()));
        }
        self.hub.receive(&self.uid, &self.address, timeout)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Topic subscription handle on the inproc hub.
pub(crate) struct InprocSubscriber {
    label: String,
    inbox: Receiver<Bytes>,
    closed: AtomicBool,
}

impl InprocSubscriber {
    /// Subscribe to `topic` on the hub. `label` identifies the subscription
    /// in errors and logs (the topic, or the connection uid for a
    /// subscribe-all handle).
    pub(crate) fn new(label: &str, topic: &str, hub: &InprocHub) -> Self {
        Self {
            label: label.to_string(),
            inbox: hub.subscribe(topic),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe to every topic on the hub.
    pub(crate) fn all_topics(label: &str, hub: &InprocHub) -> Self {
        Self::new(label, ALL_TOPICS, hub)
    }
}

impl NetReceiver for InprocSubscriber {
    fn receive(&self, timeout: Duration) -> Result<Bytes> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UnknownConnection(self.label.clone()));
        }
        match Wait::classify(timeout) {
            Wait::NoBlock => match self.inbox.try_recv() {
                Ok(frame) => Ok(frame),
                Err(TryRecvError::Empty) => Err(Error::timeout(&self.label, "receive", timeout)),
                Err(TryRecvError::Disconnected) => {
                    Err(Error::UnknownConnection(self.label.clone()))
                }
            },
            Wait::Bounded(wait) => match self.inbox.recv_timeout(wait) {
                Ok(frame) => Ok(frame),
                Err(RecvTimeoutError::Timeout) => {
                    Err(Error::timeout(&self.label, "receive", timeout))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    Err(Error::UnknownConnection(self.label.clone()))
                }
            },
            Wait::Forever => self
                .inbox
                .recv()
                .map_err(|_| Error::UnknownConnection(self.label.clone())),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_BLOCK;

    #[test]
    fn direct_send_then_receive() {
        let hub = InprocHub::new();
        let sender = InprocSender::new("n", "inproc://foo", hub.clone());
        let receiver = InprocReceiver::new("n", "inproc://foo", hub);

        sender
            .send(Bytes::from_static(b"hello"), NO_BLOCK, "")
            .unwrap();

        let frame = receiver.receive(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.as_ref(), b"hello");
    }

    #[test]
    fn direct_receive_times_out_when_empty() {
        let hub = InprocHub::new();
        let receiver = InprocReceiver::new("n", "inproc://empty", hub);

        assert!(matches!(
            receiver.receive(Duration::from_millis(5)),
            Err(Error::Timeout { .. })
        ));
    }

    #[test]
    fn topic_fanout_reaches_matching_subscribers_only() {
        let hub = InprocHub::new();
        let sender = InprocSender::new("p", "inproc://bus", hub.clone());
        let on_topic = InprocSubscriber::new("t1", "t1", &hub);
        let off_topic = InprocSubscriber::new("t2", "t2", &hub);
        let all = InprocSubscriber::all_topics("p", &hub);

        sender
            .send(Bytes::from_static(b"payload"), NO_BLOCK, "t1")
            .unwrap();

        assert_eq!(
            on_topic.receive(Duration::from_millis(10)).unwrap().as_ref(),
            b"payload"
        );
        assert_eq!(
            all.receive(Duration::from_millis(10)).unwrap().as_ref(),
            b"payload"
        );
        assert!(off_topic.receive(NO_BLOCK).is_err());
    }

    #[test]
    fn closed_handles_report_unknown_connection() {
        let hub = InprocHub::new();
        let sender = InprocSender::new("n", "inproc://foo", hub.clone());
        let receiver = InprocReceiver::new("n", "inproc://foo", hub);

        sender.close();
        receiver.close();

        assert!(matches!(
            sender.send(Bytes::new(), NO_BLOCK, ""),
            Err(Error::UnknownConnection(_))
        ));
        assert!(matches!(
            receiver.receive(NO_BLOCK),
            Err(Error::UnknownConnection(_))
        ));
    }

    #[test]
    fn subscriber_outlives_hub_clear() {
        let hub = InprocHub::new();
        let subscriber = InprocSubscriber::new("t", "t", &hub);
        hub.clear();

        // The hub side of the inbox is gone; the stale handle fails rather
        // than hanging.
        assert!(matches!(
            subscriber.receive(Duration::from_millis(5)),
            Err(Error::UnknownConnection(_))
        ));
    }
}
