//! Process-wide queue registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::macros::log_debug;
use crate::queue::{QueueKind, TypedQueue};
use crate::{Error, Result};

/// Declaration of one queue, derived from a `queue://` connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Connection uid the queue serves.
    pub uid: String,
    /// Declared queue variant.
    pub kind: QueueKind,
    /// Capacity bound.
    pub capacity: usize,
}

/// Type-erased handle kept by the registry so it can tear queues down
/// without knowing their payload type.
trait ManagedQueue: Send + Sync {
    fn close(&self);
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + 'static> ManagedQueue for TypedQueue<T> {
    fn close(&self) {
        TypedQueue::close(self);
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Default)]
struct Inner {
    specs: HashMap<String, QueueSpec>,
    queues: HashMap<String, Arc<dyn ManagedQueue>>,
}

/// Process-wide directory of declared queues.
///
/// A queue is declared by [`configure`](QueueRegistry::configure) and bound
/// to a payload type on the first [`get_queue`](QueueRegistry::get_queue)
/// call for its uid. Later calls for the same uid must use the same type.
pub struct QueueRegistry {
    inner: Mutex<Inner>,
}

static REGISTRY: OnceLock<QueueRegistry> = OnceLock::new();

impl QueueRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The process-wide registry instance.
    pub fn get() -> &'static QueueRegistry {
        REGISTRY.get_or_init(QueueRegistry::new)
    }

    /// Declare a set of queues.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a duplicate uid (including one left over
    /// from an earlier `configure` without an intervening
    /// [`reset`](QueueRegistry::reset)) or a zero capacity.
    pub fn configure(&self, specs: Vec<QueueSpec>) -> Result<()> {
        let mut inner = self.lock();

        // Validate the whole batch before committing any of it, so a
        // rejected batch leaves the registry untouched.
        {
            let mut incoming = std::collections::HashSet::new();
            for spec in &specs {
                if inner.specs.contains_key(&spec.uid) || !incoming.insert(&spec.uid) {
                    return Err(Error::Configuration(format!(
                        "queue '{}' is declared twice",
                        spec.uid
                    )));
                }
                if spec.capacity == 0 {
                    return Err(Error::Configuration(format!(
                        "queue '{}' has zero capacity",
                        spec.uid
                    )));
                }
            }
        }

        for spec in specs {
            inner.specs.insert(spec.uid.clone(), spec);
        }
        log_debug!("queue registry configured with {} queue(s)", inner.specs.len());
        Ok(())
    }

    /// Fetch the queue for `uid`, bound to payload type `T`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownConnection`] if no such queue is declared;
    /// [`Error::Configuration`] if the queue was already bound to a
    /// different payload type.
    pub fn get_queue<T: Send + 'static>(&self, uid: &str) -> Result<Arc<TypedQueue<T>>> {
        let mut inner = self.lock();

        let spec = inner
            .specs
            .get(uid)
            .ok_or_else(|| Error::UnknownConnection(uid.to_string()))?
            .clone();

        if let Some(queue) = inner.queues.get(uid) {
            return queue
                .clone()
                .as_any_arc()
                .downcast::<TypedQueue<T>>()
                .map_err(|_| {
                    Error::Configuration(format!(
                        "queue '{uid}' is already bound to a different payload type"
                    ))
                });
        }

        log_debug!(
            "creating {:?} queue '{uid}' with capacity {}",
            spec.kind,
            spec.capacity
        );
        let queue = Arc::new(TypedQueue::<T>::new(&spec));
        inner
            .queues
            .insert(uid.to_string(), queue.clone() as Arc<dyn ManagedQueue>);
        Ok(queue)
    }

    /// Close every queue and drop all declarations.
    ///
    /// Handles already held by endpoints observe
    /// [`Error::UnknownConnection`] on their next operation. Safe to call
    /// repeatedly.
    pub fn reset(&self) {
        let mut inner = self.lock();
        for queue in inner.queues.values() {
            queue.close();
        }
        inner.queues.clear();
        inner.specs.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_BLOCK;

    fn spec(uid: &str) -> QueueSpec {
        QueueSpec {
            uid: uid.into(),
            kind: QueueKind::Deque,
            capacity: 4,
        }
    }

    #[test]
    fn get_queue_is_memoized_per_uid() {
        let registry = QueueRegistry::new();
        registry.configure(vec![spec("a")]).unwrap();

        let first = registry.get_queue::<u32>("a").unwrap();
        let second = registry.get_queue::<u32>("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.push(9, NO_BLOCK).unwrap();
        assert_eq!(second.pop(NO_BLOCK).unwrap(), 9);
    }

    #[test]
    fn rebinding_to_another_type_is_rejected() {
        let registry = QueueRegistry::new();
        registry.configure(vec![spec("a")]).unwrap();

        registry.get_queue::<u32>("a").unwrap();
        assert!(matches!(
            registry.get_queue::<String>("a"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn unknown_and_duplicate_uids() {
        let registry = QueueRegistry::new();
        registry.configure(vec![spec("a")]).unwrap();

        assert!(matches!(
            registry.get_queue::<u32>("missing"),
            Err(Error::UnknownConnection(_))
        ));
        assert!(matches!(
            registry.configure(vec![spec("a")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn reset_closes_outstanding_handles() {
        let registry = QueueRegistry::new();
        registry.configure(vec![spec("a")]).unwrap();

        let handle = registry.get_queue::<u32>("a").unwrap();
        registry.reset();

        assert!(matches!(
            handle.push(1, NO_BLOCK),
            Err(Error::UnknownConnection(_))
        ));

        // The declaration is gone too; a fresh configure starts clean.
        assert!(matches!(
            registry.get_queue::<u32>("a"),
            Err(Error::UnknownConnection(_))
        ));
        registry.configure(vec![spec("a")]).unwrap();
        registry.get_queue::<String>("a").unwrap();
    }
}
