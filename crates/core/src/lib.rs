//! Client for the Edge read-aloud streaming speech synthesis protocol.
//!
//! A [`Session`] multiplexes any number of concurrent synthesis requests over
//! one lazily opened connection. Each request is tagged with a fresh
//! correlation id; inbound turn and audio frames are routed back to the
//! request that owns them and reassembled into a single audio buffer.

pub mod error;
pub mod format;
pub mod frame;
pub mod id;
pub mod session;
pub mod table;
pub mod transport;
pub mod websocket;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{ProtocolError, SynthesisError, TransportError};
pub use format::{OutputFormat, UnknownFormat};
pub use id::RequestId;
pub use session::{ConnectionState, Session, SessionConfig};
pub use transport::{Connector, TransportEvent, WireMessage};
pub use websocket::{DEFAULT_ENDPOINT, WebSocketConnector};
