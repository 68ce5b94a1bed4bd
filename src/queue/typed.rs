//! Typed bounded queue with exact timeout semantics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};

use crate::queue::{QueueKind, QueueSpec};
use crate::timeout::Wait;
use crate::{Error, Result};

/// A bounded in-process queue carrying values of one payload type.
///
/// Handles are shared between the registry and any number of endpoints; all
/// operations take `&self`. Push and pop honor the caller's timeout exactly:
/// [`NO_BLOCK`](crate::NO_BLOCK) makes a single attempt, [`BLOCK`](crate::BLOCK)
/// waits indefinitely, anything else waits up to the given duration.
///
/// Once [`close`](TypedQueue::close) has been called (by the registry on
/// reset), every operation fails with
/// [`Error::UnknownConnection`].
pub struct TypedQueue<T> {
    uid: String,
    kind: QueueKind,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
    closed: AtomicBool,
}

impl<T: Send + 'static> TypedQueue<T> {
    pub(crate) fn new(spec: &QueueSpec) -> Self {
        let (tx, rx) = bounded(spec.capacity);
        Self {
            uid: spec.uid.clone(),
            kind: spec.kind,
            capacity: spec.capacity,
            tx,
            rx,
            closed: AtomicBool::new(false),
        }
    }

    /// The connection uid this queue serves.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Declared queue kind.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Capacity bound from the connection URI.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Move a value into the queue, waiting up to `timeout` for space.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the queue stays full for the whole window;
    /// [`Error::UnknownConnection`] if the queue has been closed.
    pub fn push(&self, value: T, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        match Wait::classify(timeout) {
            Wait::NoBlock => match self.tx.try_send(value) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(Error::timeout(&self.uid, "push", timeout)),
                Err(TrySendError::Disconnected(_)) => {
                    Err(Error::UnknownConnection(self.uid.clone()))
                }
            },
            Wait::Bounded(wait) => match self.tx.send_timeout(value, wait) {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => {
                    Err(Error::timeout(&self.uid, "push", timeout))
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    Err(Error::UnknownConnection(self.uid.clone()))
                }
            },
            Wait::Forever => self
                .tx
                .send(value)
                .map_err(|_| Error::UnknownConnection(self.uid.clone())),
        }
    }

    /// Like [`push`](TypedQueue::push), but reports a full-queue timeout as
    /// `Ok(false)` instead of an error. Other failures still surface.
    pub fn try_push(&self, value: T, timeout: Duration) -> Result<bool> {
        match self.push(value, timeout) {
            Ok(()) => Ok(true),
            Err(Error::Timeout { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Pop one value, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the queue stays empty for the whole window;
    /// [`Error::UnknownConnection`] if the queue has been closed.
    pub fn pop(&self, timeout: Duration) -> Result<T> {
        self.ensure_open()?;
        match Wait::classify(timeout) {
            Wait::NoBlock => match self.rx.try_recv() {
                Ok(value) => Ok(value),
                Err(TryRecvError::Empty) => Err(Error::timeout(&self.uid, "pop", timeout)),
                Err(TryRecvError::Disconnected) => {
                    Err(Error::UnknownConnection(self.uid.clone()))
                }
            },
            Wait::Bounded(wait) => match self.rx.recv_timeout(wait) {
                Ok(value) => Ok(value),
                Err(RecvTimeoutError::Timeout) => Err(Error::timeout(&self.uid, "pop", timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(Error::UnknownConnection(self.uid.clone()))
                }
            },
            Wait::Forever => self
                .rx
                .recv()
                .map_err(|_| Error::UnknownConnection(self.uid.clone())),
        }
    }

    /// Like [`pop`](TypedQueue::pop), but reports an empty-queue timeout as
    /// `Ok(None)` instead of an error. Other failures still surface.
    pub fn try_pop(&self, timeout: Duration) -> Result<Option<T>> {
        match self.pop(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Timeout { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Invalidate the queue. Subsequent operations fail with
    /// [`Error::UnknownConnection`].
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::UnknownConnection(self.uid.clone()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BLOCK, NO_BLOCK};

    fn queue(capacity: usize) -> TypedQueue<u32> {
        TypedQueue::new(&QueueSpec {
            uid: "unit".into(),
            kind: QueueKind::Deque,
            capacity,
        })
    }

    #[test]
    fn push_pop_round_trip() {
        let q = queue(4);
        q.push(11, Duration::from_millis(10)).unwrap();
        q.push(12, NO_BLOCK).unwrap();
        assert_eq!(q.pop(Duration::from_millis(10)).unwrap(), 11);
        assert_eq!(q.pop(NO_BLOCK).unwrap(), 12);
    }

    #[test]
    fn full_queue_times_out() {
        let q = queue(1);
        q.push(1, NO_BLOCK).unwrap();

        match q.push(2, Duration::from_millis(5)) {
            Err(Error::Timeout { op, .. }) => assert_eq!(op, "push"),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(q.try_push(2, NO_BLOCK).unwrap(), false);
    }

    #[test]
    fn empty_queue_times_out() {
        let q = queue(1);

        match q.pop(NO_BLOCK) {
            Err(Error::Timeout { op, .. }) => assert_eq!(op, "pop"),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(q.try_pop(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn block_sentinel_waits_for_space() {
        let q = std::sync::Arc::new(queue(1));
        q.push(1, NO_BLOCK).unwrap();

        let popper = {
            let q = q.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                q.pop(BLOCK).unwrap()
            })
        };

        // Blocks until the popper frees a slot.
        q.push(2, BLOCK).unwrap();
        assert_eq!(popper.join().unwrap(), 1);
        assert_eq!(q.pop(NO_BLOCK).unwrap(), 2);
    }

    #[test]
    fn closed_queue_reports_unknown_connection() {
        let q = queue(2);
        q.push(1, NO_BLOCK).unwrap();
        q.close();

        assert!(matches!(
            q.push(2, NO_BLOCK),
            Err(Error::UnknownConnection(_))
        ));
        assert!(matches!(q.pop(NO_BLOCK), Err(Error::UnknownConnection(_))));
        assert!(q.try_push(2, NO_BLOCK).is_err());
    }
}
