//! The serialization gate.
//!
//! Every payload type passed through the façade implements [`Message`]. The
//! trait's [`SERIALIZABLE`](Message::SERIALIZABLE) constant partitions all
//! message types at compile time: serializable types may travel over network
//! connections, non-serializable types are confined to in-process queues
//! (which move values by ownership transfer and never consult the gate).
//!
//! The asymmetry on the network paths is deliberate: a network **send** of a
//! non-serializable type is a hard error, while a network **receive** returns
//! a default-constructed value without touching the socket. Generic user code
//! parameterized over the payload type compiles and runs either way, merely
//! receiving empty objects where no bytes can travel.
//!
//! Declaring message types:
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Reading { channel: u16, value: f64 }
//! iomux::serializable_message!(Reading);
//!
//! // In-process only: no serde derives needed, network sends are rejected.
//! #[derive(Debug, Default)]
//! struct RawBuffer { data: Vec<u8> }
//! impl iomux::Message for RawBuffer {}
//! ```
//!
//! The wire encoding is MessagePack in its named (self-describing) flavor:
//! field names travel with the data, so independently built processes can
//! decode each other's frames.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// A payload type usable with the façade's typed endpoints.
///
/// The default implementations describe a non-serializable type: encoding
/// fails the gate and decoding produces a default value. The
/// [`serializable_message!`](crate::serializable_message) macro overrides
/// both with the MessagePack codec.
pub trait Message: Default + Send + 'static {
    /// Whether this type may travel over network connections.
    const SERIALIZABLE: bool = false;

    /// Encode the value into a wire frame.
    fn encode(&self) -> Result<Bytes> {
        Err(Error::not_serializable::<Self>())
    }

    /// Decode a value from a wire frame.
    fn decode(_frame: &[u8]) -> Result<Self> {
        Ok(Self::default())
    }
}

/// Serialize a value into a MessagePack frame.
pub fn to_frame<T: Serialize>(value: &T) -> Result<Bytes> {
    let buf = rmp_serde::to_vec_named(value)
        .map_err(|err| Error::Serialization(err.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Deserialize a value from a MessagePack frame.
pub fn from_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    rmp_serde::from_slice(frame).map_err(|err| Error::Serialization(err.to_string()))
}

/// Implement [`Message`] for types that may travel over the network.
///
/// The type must implement `serde::Serialize`, `serde::Deserialize`,
/// `Default`, and `Send`.
#[macro_export]
macro_rules! serializable_message {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::Message for $ty {
            const SERIALIZABLE: bool = true;

            fn encode(&self) -> $crate::Result<$crate::Bytes> {
                $crate::message::to_frame(self)
            }

            fn decode(frame: &[u8]) -> $crate::Result<Self> {
                $crate::message::from_frame(frame)
            }
        }
    )+};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Wire {
        seq: u32,
        label: String,
    }
    crate::serializable_message!(Wire);

    #[derive(Debug, Default, PartialEq)]
    struct Local {
        seq: u32,
    }
    impl Message for Local {}

    #[test]
    fn serializable_round_trip() {
        let value = Wire {
            seq: 7,
            label: "run-042".into(),
        };

        let frame = value.encode().unwrap();
        assert!(!frame.is_empty());
        assert_eq!(Wire::decode(&frame).unwrap(), value);
    }

    #[test]
    fn named_encoding_is_self_describing() {
        // Field names must be present in the frame so foreign decoders can
        // resolve fields by name.
        let frame = Wire::default().encode().unwrap();
        let haystack = frame.as_ref();
        assert!(haystack.windows(3).any(|w| w == b"seq"));
    }

    #[test]
    fn default_frame_is_not_empty() {
        // A zero-length frame is never a valid encoding, even of a default
        // value; the receive path relies on this.
        assert!(!Wire::default().encode().unwrap().is_empty());
    }

    #[test]
    fn non_serializable_gate() {
        assert!(!Local::SERIALIZABLE);
        assert!(Wire::SERIALIZABLE);

        match (Local { seq: 3 }).encode() {
            Err(Error::NotSerializable(name)) => assert!(name.contains("Local")),
            other => panic!("expected NotSerializable, got {other:?}"),
        }

        // Decode of a non-serializable type yields a default value.
        assert_eq!(Local::decode(b"ignored").unwrap(), Local::default());
    }
}
