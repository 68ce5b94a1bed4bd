use std::time::Duration;

use thiserror::Error;

use crate::connection::ServiceType;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the messaging façade.
///
/// These errors are intentionally transport-agnostic. The queue and network
/// providers are responsible for mapping their internal failures into one of
/// these variants, so user code can match on kinds without knowing which
/// transport sits beneath a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection declaration was rejected at `configure` time.
    ///
    /// Raised for duplicate uids, malformed or mismatched URIs, and for
    /// specs a transport provider refuses to accept.
    #[error("invalid connection configuration: {0}")]
    Configuration(String),

    /// The named connection is not in the catalog, or its transport handle
    /// has been invalidated by `reset`.
    #[error("connection '{0}' is not known to this process")]
    UnknownConnection(String),

    /// A connection reference was used against the direction of its
    /// declared service type.
    #[error("connection '{uid}' ({service:?}) cannot be used as {requested}")]
    DirectionMismatch {
        /// Offending connection uid.
        uid: String,
        /// The connection's declared service type.
        service: ServiceType,
        /// What the caller asked for ("sender" or "receiver").
        requested: &'static str,
    },

    /// A send or receive window elapsed without progress.
    #[error("{op} on connection '{uid}' timed out after {timeout:?}")]
    Timeout {
        /// Connection the operation ran against.
        uid: String,
        /// The transport operation that timed out.
        op: &'static str,
        /// The caller-supplied window.
        timeout: Duration,
    },

    /// `receive` was invoked while a callback binding holds the receiver.
    #[error("receiver '{0}' has an active callback; direct receive is disabled")]
    CallbackConflict(String),

    /// Network send of a message type that fails the serialization gate.
    #[error("message type `{0}` is not serializable for network transport")]
    NotSerializable(&'static str),

    /// The serialization codec failed on an otherwise eligible value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A transport-level failure that does not map to a more specific
    /// variant.
    #[error("transport failure on connection '{uid}': {reason}")]
    Transport {
        /// Connection the failure occurred on.
        uid: String,
        /// Provider-reported cause.
        reason: String,
    },
}

impl Error {
    pub(crate) fn timeout(uid: &str, op: &'static str, timeout: Duration) -> Self {
        Error::Timeout {
            uid: uid.to_string(),
            op,
            timeout,
        }
    }

    pub(crate) fn transport(uid: &str, reason: impl Into<String>) -> Self {
        Error::Transport {
            uid: uid.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_serializable<T>() -> Self {
        Error::NotSerializable(std::any::type_name::<T>())
    }
}
