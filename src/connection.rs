//! Connection catalog types.
//!
//! A [`ConnectionId`] is the canonical, configuration-time declaration of one
//! logical channel: its unique identifier, the kind of transport that serves
//! it, and a URI describing the transport resource. A [`ConnectionRef`] is
//! the lightweight handle user code passes to the façade when requesting an
//! endpoint; several refs may resolve to the same uid.
//!
//! URI vocabulary:
//!
//! - `queue://<kind>:<capacity>` — an in-process bounded queue. `<kind>`
//!   names the queue variant (`deque` or `spsc`), `<capacity>` its bound.
//! - `tcp://host:port`, `ipc://path` — passed verbatim to the network
//!   provider (requires the `transport_zmq` feature).
//! - `inproc://name` — served by the built-in in-process hub.

use serde::{Deserialize, Serialize};

use crate::queue::QueueKind;
use crate::{Error, Result};

/// Transport kind declared for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// In-process typed queue; usable from both ends.
    Queue,
    /// Network connection whose sending end lives in this process.
    NetSender,
    /// Network connection whose receiving end lives in this process.
    NetReceiver,
    /// Network publish/subscribe connection; topics select the channel.
    PubSub,
}

/// Canonical declaration of one connection.
///
/// Populated once at configuration time and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionId {
    /// Unique identifier within the catalog.
    pub uid: String,
    /// Transport kind serving this connection.
    pub service_type: ServiceType,
    /// Informational tag naming the payload type. Diagnostic only; the
    /// façade never type-checks it.
    #[serde(default)]
    pub data_type: String,
    /// Transport-specific address.
    pub uri: String,
}

impl ConnectionId {
    /// Create a declaration with an empty data-type tag.
    pub fn new(
        uid: impl Into<String>,
        service_type: ServiceType,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            service_type,
            data_type: String::new(),
            uri: uri.into(),
        }
    }

    /// Validate that the URI parses and its scheme matches the declared
    /// service type.
    pub(crate) fn validate(&self) -> Result<()> {
        match self.service_type {
            ServiceType::Queue => {
                parse_queue_uri(&self.uid, &self.uri)?;
            }
            ServiceType::NetSender | ServiceType::NetReceiver | ServiceType::PubSub => {
                parse_net_uri(&self.uid, &self.uri)?;
            }
        }
        Ok(())
    }
}

/// Direction marker on a [`ConnectionRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The ref will be used to receive.
    Input,
    /// The ref will be used to send.
    Output,
}

/// User-facing handle naming a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRef {
    /// Caller-chosen name, used for logging only.
    pub name: String,
    /// The catalog uid this ref resolves to.
    pub uid: String,
    /// Optional direction marker; checked against the connection's service
    /// type when an endpoint is requested.
    pub dir: Option<Direction>,
    /// Optional topic, relevant only for publish/subscribe connections.
    pub topic: Option<String>,
}

impl ConnectionRef {
    /// Create a ref with no direction marker and no topic.
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            dir: None,
            topic: None,
        }
    }

    /// Attach a direction marker.
    pub fn with_direction(mut self, dir: Direction) -> Self {
        self.dir = Some(dir);
        self
    }

    /// Attach a topic. Meaningful only for publish/subscribe connections.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

impl From<&str> for ConnectionRef {
    /// Build a ref whose name and uid are the same string, the common case
    /// for code that addresses connections directly by uid.
    fn from(uid: &str) -> Self {
        Self::new(uid, uid)
    }
}

/// Network URI scheme accepted by the network provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetScheme {
    Inproc,
    Tcp,
    Ipc,
}

/// Parse and validate a `queue://<kind>:<capacity>` URI.
pub(crate) fn parse_queue_uri(uid: &str, uri: &str) -> Result<(QueueKind, usize)> {
    let rest = uri.strip_prefix("queue://").ok_or_else(|| {
        Error::Configuration(format!(
            "connection '{uid}': queue connections require a queue:// uri, got '{uri}'"
        ))
    })?;

    let (kind, capacity) = rest.split_once(':').ok_or_else(|| {
        Error::Configuration(format!(
            "connection '{uid}': queue uri '{uri}' is missing a ':<capacity>' suffix"
        ))
    })?;

    let kind = QueueKind::parse(kind).ok_or_else(|| {
        Error::Configuration(format!(
            "connection '{uid}': unknown queue kind '{kind}' in '{uri}'"
        ))
    })?;

    let capacity: usize = capacity.parse().map_err(|_| {
        Error::Configuration(format!(
            "connection '{uid}': queue capacity '{capacity}' in '{uri}' is not a positive integer"
        ))
    })?;
    if capacity == 0 {
        return Err(Error::Configuration(format!(
            "connection '{uid}': queue capacity must be positive in '{uri}'"
        )));
    }

    Ok((kind, capacity))
}

/// Parse and validate a network URI scheme.
pub(crate) fn parse_net_uri(uid: &str, uri: &str) -> Result<NetScheme> {
    let scheme = match uri.split_once("://") {
        Some((scheme, rest)) if !rest.is_empty() => scheme,
        _ => {
            return Err(Error::Configuration(format!(
                "connection '{uid}': malformed network uri '{uri}'"
            )))
        }
    };

    match scheme {
        "inproc" => Ok(NetScheme::Inproc),
        "tcp" => Ok(NetScheme::Tcp),
        "ipc" => Ok(NetScheme::Ipc),
        other => Err(Error::Configuration(format!(
            "connection '{uid}': unsupported network scheme '{other}' in '{uri}'"
        ))),
    }
}

/// Parse a JSON array of [`ConnectionId`] records.
///
/// This is the file-driven configuration path: a pipeline's connection list
/// can be maintained as JSON and handed to
/// [`IoManager::configure`](crate::IoManager::configure) verbatim.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when the document is not a JSON array of
/// connection records. Catalog-level validation (uid uniqueness, URI/service
/// agreement) happens later, in `configure`.
pub fn load_connections(json: &str) -> Result<Vec<ConnectionId>> {
    serde_json::from_str(json)
        .map_err(|err| Error::Configuration(format!("connection list does not parse: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_uri_parses_kind_and_capacity() {
        let (kind, capacity) = parse_queue_uri("q", "queue://deque:10").unwrap();
        assert_eq!(kind, QueueKind::Deque);
        assert_eq!(capacity, 10);

        let (kind, _) = parse_queue_uri("q", "queue://spsc:128").unwrap();
        assert_eq!(kind, QueueKind::Spsc);
    }

    #[test]
    fn bad_queue_uris_are_rejected() {
        assert!(parse_queue_uri("q", "queue://deque").is_err());
        assert!(parse_queue_uri("q", "queue://ring:10").is_err());
        assert!(parse_queue_uri("q", "queue://deque:0").is_err());
        assert!(parse_queue_uri("q", "queue://deque:ten").is_err());
        assert!(parse_queue_uri("q", "tcp://localhost:5555").is_err());
    }

    #[test]
    fn net_uri_schemes() {
        assert_eq!(parse_net_uri("n", "inproc://foo").unwrap(), NetScheme::Inproc);
        assert_eq!(parse_net_uri("n", "tcp://127.0.0.1:5555").unwrap(), NetScheme::Tcp);
        assert_eq!(parse_net_uri("n", "ipc:///tmp/sock").unwrap(), NetScheme::Ipc);

        assert!(parse_net_uri("n", "queue://deque:10").is_err());
        assert!(parse_net_uri("n", "inproc://").is_err());
        assert!(parse_net_uri("n", "not-a-uri").is_err());
    }

    #[test]
    fn validate_checks_scheme_against_service_type() {
        let ok = ConnectionId::new("q", ServiceType::Queue, "queue://deque:10");
        assert!(ok.validate().is_ok());

        let crossed = ConnectionId::new("q", ServiceType::Queue, "inproc://foo");
        assert!(crossed.validate().is_err());

        let crossed = ConnectionId::new("n", ServiceType::NetSender, "queue://deque:10");
        assert!(crossed.validate().is_err());
    }

    #[test]
    fn connection_list_loads_from_json() {
        let json = r#"[
            { "uid": "q1", "service_type": "queue", "data_type": "Data", "uri": "queue://deque:10" },
            { "uid": "n1", "service_type": "net_sender", "uri": "inproc://foo" }
        ]"#;

        let conns = load_connections(json).unwrap();
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].service_type, ServiceType::Queue);
        assert_eq!(conns[1].uid, "n1");
        assert_eq!(conns[1].data_type, "");

        assert!(load_connections("{}").is_err());
    }

    #[test]
    fn ref_from_str_uses_uid_as_name() {
        let conn_ref = ConnectionRef::from("readings");
        assert_eq!(conn_ref.name, "readings");
        assert_eq!(conn_ref.uid, "readings");
        assert_eq!(conn_ref.dir, None);
        assert_eq!(conn_ref.topic, None);
    }
}
