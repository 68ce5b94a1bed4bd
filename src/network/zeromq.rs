//! ZeroMQ network backend (`transport_zmq` feature).
//!
//! Serves `tcp://` and `ipc://` connections: PUSH/PULL socket pairs for
//! point-to-point transfer, PUB/SUB for topics. Receivers bind (they are the
//! stable endpoint), senders connect; publishers bind, subscribers connect to
//! every configured publisher address and filter by topic prefix.
//!
//! ZeroMQ sockets are not thread-safe, so every handle serializes access
//! through a mutex; per-call timeouts are applied through the socket's
//! send/receive timeout options.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use crate::network::{NetReceiver, NetReceiverPtr, NetSender, NetSenderPtr};
use crate::timeout::Wait;
use crate::{Error, Result};

fn timeout_ms(wait: Duration) -> i32 {
    i32::try_from(wait.as_millis()).unwrap_or(i32::MAX)
}

fn map_err(uid: &str, op: &'static str, timeout: Duration, err: zmq::Error) -> Error {
    match err {
        zmq::Error::EAGAIN => Error::timeout(uid, op, timeout),
        other => Error::transport(uid, other.to_string()),
    }
}

struct ZmqSender {
    uid: String,
    socket: Mutex<zmq::Socket>,
    closed: AtomicBool,
}

impl NetSender for ZmqSender {
    fn send(&self, frame: Bytes, timeout: Duration, topic: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UnknownConnection(self.uid.clone()));
        }
        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);

        let flags = match Wait::classify(timeout) {
            Wait::NoBlock => zmq::DONTWAIT,
            Wait::Bounded(wait) => {
                socket
                    .set_sndtimeo(timeout_ms(wait))
                    .map_err(|err| Error::transport(&self.uid, err.to_string()))?;
                0
            }
            Wait::Forever => {
                socket
                    .set_sndtimeo(-1)
                    .map_err(|err| Error::transport(&self.uid, err.to_string()))?;
                0
            }
        };

        let result = if topic.is_empty() {
            socket.send(frame.as_ref(), flags)
        } else {
            socket.send_multipart([topic.as_bytes(), frame.as_ref()], flags)
        };
        result.map_err(|err| map_err(&self.uid, "send", timeout, err))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct ZmqReceiver {
    uid: String,
    socket: Mutex<zmq::Socket>,
    closed: AtomicBool,
}

impl NetReceiver for ZmqReceiver {
    fn receive(&self, timeout: Duration) -> Result<Bytes> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::UnknownConnection(self.uid.clone()));
        }
        let socket = self.socket.lock().unwrap_or_else(PoisonError::into_inner);

        let flags = match Wait::classify(timeout) {
            Wait::NoBlock => zmq::DONTWAIT,
            Wait::Bounded(wait) => {
                socket
                    .set_rcvtimeo(timeout_ms(wait))
                    .map_err(|err| Error::transport(&self.uid, err.to_string()))?;
                0
            }
            Wait::Forever => {
                socket
                    .set_rcvtimeo(-1)
                    .map_err(|err| Error::transport(&self.uid, err.to_string()))?;
                0
            }
        };

        // Topic-carrying messages arrive as [topic, payload]; the payload is
        // always the final part.
        let mut frame = socket
            .recv_bytes(flags)
            .map_err(|err| map_err(&self.uid, "receive", timeout, err))?;
        while socket
            .get_rcvmore()
            .map_err(|err| Error::transport(&self.uid, err.to_string()))?
        {
            frame = socket
                .recv_bytes(0)
                .map_err(|err| map_err(&self.uid, "receive", timeout, err))?;
        }
        Ok(Bytes::from(frame))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

pub(crate) fn create_sender(
    context: &zmq::Context,
    uid: &str,
    uri: &str,
    pubsub: bool,
) -> Result<NetSenderPtr> {
    let socket = context
        .socket(if pubsub { zmq::PUB } else { zmq::PUSH })
        .map_err(|err| Error::transport(uid, err.to_string()))?;
    socket
        .set_linger(0)
        .map_err(|err| Error::transport(uid, err.to_string()))?;

    if pubsub {
        socket
            .bind(uri)
            .map_err(|err| Error::transport(uid, format!("bind '{uri}': {err}")))?;
    } else {
        socket
            .connect(uri)
            .map_err(|err| Error::transport(uid, format!("connect '{uri}': {err}")))?;
    }

    Ok(Arc::new(ZmqSender {
        uid: uid.to_string(),
        socket: Mutex::new(socket),
        closed: AtomicBool::new(false),
    }))
}

pub(crate) fn create_receiver(
    context: &zmq::Context,
    uid: &str,
    uri: &str,
) -> Result<NetReceiverPtr> {
    let socket = context
        .socket(zmq::PULL)
        .map_err(|err| Error::transport(uid, err.to_string()))?;
    socket
        .bind(uri)
        .map_err(|err| Error::transport(uid, format!("bind '{uri}': {err}")))?;

    Ok(Arc::new(ZmqReceiver {
        uid: uid.to_string(),
        socket: Mutex::new(socket),
        closed: AtomicBool::new(false),
    }))
}

pub(crate) fn create_subscriber(
    context: &zmq::Context,
    label: &str,
    addresses: &[&str],
    topic: &str,
) -> Result<NetReceiverPtr> {
    let socket = context
        .socket(zmq::SUB)
        .map_err(|err| Error::transport(label, err.to_string()))?;
    for address in addresses {
        socket
            .connect(address)
            .map_err(|err| Error::transport(label, format!("connect '{address}': {err}")))?;
    }
    socket
        .set_subscribe(topic.as_bytes())
        .map_err(|err| Error::transport(label, err.to_string()))?;

    Ok(Arc::new(ZmqReceiver {
        uid: label.to_string(),
        socket: Mutex::new(socket),
        closed: AtomicBool::new(false),
    }))
}
