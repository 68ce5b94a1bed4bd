//! Background callback dispatch.
//!
//! A receiver placed in callback mode owns one [`CallbackBinding`]: a worker
//! thread that repeatedly pulls from the transport with a small bounded
//! timeout and hands each value to the registered consumer. The short poll
//! keeps shutdown responsive on transports without interruptible blocking
//! receives, at negligible idle cost for the message rates this crate
//! targets.
//!
//! The worker never exits on a transport error; only clearing the running
//! flag (via [`stop`](CallbackBinding::stop) or drop) ends the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::macros::{log_debug, log_error, log_warn};
use crate::message::Message;
use crate::{Error, Result};

/// Poll interval for queue-backed receivers.
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(500);

/// Poll interval for network-backed receivers.
pub(crate) const NETWORK_POLL: Duration = Duration::from_millis(1);

/// A running callback worker: the consumer function, its running flag, and
/// the thread driving them.
///
/// The worker thread exists exactly as long as the binding; stopping joins
/// the thread before returning.
pub(crate) struct CallbackBinding {
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CallbackBinding {
    /// Start a worker that pulls with `pull(poll)` and feeds the consumer.
    ///
    /// `pull` makes one bounded attempt against the transport; a
    /// [`Error::Timeout`] result is silent, any other error is logged and
    /// the worker sleeps one poll interval before retrying.
    pub(crate) fn spawn<T, P>(
        uid: &str,
        poll: Duration,
        pull: P,
        mut consumer: Box<dyn FnMut(&mut T) + Send>,
    ) -> Result<Self>
    where
        T: Message,
        P: Fn(Duration) -> Result<T> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let _conn_uid = uid.to_string();

        let worker = thread::Builder::new()
            .name(format!("callback-{uid}"))
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    match pull(poll) {
                        Ok(mut data) => consumer(&mut data),
                        Err(Error::Timeout { .. }) => {}
                        Err(_err) => {
                            log_warn!("callback worker for '{_conn_uid}': {_err}");
                            thread::sleep(poll);
                        }
                    }
                }
                log_debug!("callback worker for '{_conn_uid}' stopped");
            })
            .map_err(|err| {
                Error::transport(uid, format!("failed to spawn callback worker: {err}"))
            })?;

        Ok(Self {
            running,
            worker: Some(worker),
        })
    }

    /// Clear the running flag and join the worker.
    pub(crate) fn stop(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log_error!("callback worker panicked");
            }
        }
    }
}

impl Drop for CallbackBinding {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    #[derive(Debug, Default, PartialEq)]
    struct Tick(u32);
    impl Message for Tick {}

    #[test]
    fn worker_dispatches_until_stopped() {
        let produced = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let source = produced.clone();
        let sink = seen.clone();
        let binding = CallbackBinding::spawn(
            "unit",
            Duration::from_millis(1),
            move |_poll| Ok(Tick(source.fetch_add(1, Ordering::SeqCst))),
            Box::new(move |tick: &mut Tick| {
                sink.lock().unwrap().push(tick.0);
            }),
        )
        .unwrap();

        while seen.lock().unwrap().len() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        binding.stop();

        // No invocation happens after stop returns.
        let count = seen.lock().unwrap().len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(seen.lock().unwrap().len(), count);
        assert_eq!(seen.lock().unwrap()[..3], [0, 1, 2]);
    }

    #[test]
    fn transport_timeouts_are_silent_and_errors_do_not_kill_the_worker() {
        let calls = Arc::new(AtomicU32::new(0));
        let delivered = Arc::new(AtomicU32::new(0));

        let pulls = calls.clone();
        let sink = delivered.clone();
        let binding = CallbackBinding::spawn(
            "unit",
            Duration::from_millis(1),
            move |poll| match pulls.fetch_add(1, Ordering::SeqCst) % 3 {
                0 => Err(Error::timeout("unit", "pop", poll)),
                1 => Err(Error::UnknownConnection("unit".into())),
                _ => Ok(Tick(7)),
            },
            Box::new(move |_tick: &mut Tick| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        while delivered.load(Ordering::SeqCst) < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        binding.stop();
    }
}
