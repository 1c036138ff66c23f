//! The boundary between the session and whatever carries its messages.
//!
//! A [`Connector`] opens one duplex connection and hands back its two halves:
//! a [`MessageSink`] for outbound messages and an [`EventStream`] of inbound
//! messages terminated by a close event. The session never sees sockets, TLS
//! or handshakes.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Sink, Stream};
use std::pin::Pin;

/// One opaque message on the duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

/// Something observed on the inbound half of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(WireMessage),
    /// The peer or the transport closed the connection. No further events follow.
    Closed { code: Option<u16>, reason: String },
}

pub type MessageSink = Pin<Box<dyn Sink<WireMessage, Error = TransportError> + Send>>;
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Opens connections to the synthesis endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establishes a new connection identified by `connection_id`.
    ///
    /// Resolves once the handshake has completed.
    async fn connect(
        &self,
        connection_id: &str,
    ) -> Result<(MessageSink, EventStream), TransportError>;
}
