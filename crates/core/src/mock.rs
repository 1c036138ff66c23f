//! In-memory connector for driving a [`Session`](crate::session::Session)
//! without a network.
//!
//! Every successful `connect` hands a [`MockPeer`] to the test, which plays the
//! synthesis endpoint: it reads the outbound config/SSML pairs and scripts the
//! inbound turn and audio frames.

use crate::{
    error::TransportError,
    id::RequestId,
    transport::{Connector, EventStream, MessageSink, TransportEvent, WireMessage},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Clone)]
pub struct MockConnector {
    peers: UnboundedSender<MockPeer>,
    refuse: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> (Self, UnboundedReceiver<MockPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            refuse: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicUsize::new(0)),
        };
        (connector, peers_rx)
    }

    /// Makes subsequent connection attempts fail until switched back off.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connections established so far.
    pub fn connection_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        connection_id: &str,
    ) -> Result<(MessageSink, EventStream), TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            connection_id: connection_id.to_string(),
            outbound: outbound_rx,
            inbound: inbound_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("mock endpoint is gone".to_string()))?;
        self.connects.fetch_add(1, Ordering::SeqCst);

        let sink = futures_util::sink::unfold(
            outbound_tx,
            |tx: UnboundedSender<WireMessage>, message: WireMessage| async move {
                tx.send(message)
                    .map_err(|_| TransportError::Send("peer hung up".to_string()))?;
                Ok::<_, TransportError>(tx)
            },
        );
        let events = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok((Box::pin(sink), Box::pin(events)))
    }
}

/// A synthesis request as the endpoint sees it.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub id: RequestId,
    /// Output format from the `speech.config` frame that preceded the request.
    pub format: String,
    pub ssml: String,
}

/// The endpoint side of one mock connection.
pub struct MockPeer {
    pub connection_id: String,
    outbound: UnboundedReceiver<WireMessage>,
    inbound: UnboundedSender<TransportEvent>,
}

impl MockPeer {
    /// The next message the session sent. `None` once the session dropped the
    /// connection.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.outbound.recv().await
    }

    /// Reads messages until the next SSML request.
    pub async fn next_request(&mut self) -> Option<MockRequest> {
        let mut format = String::new();
        while let Some(message) = self.recv().await {
            let WireMessage::Text(text) = message else {
                continue;
            };
            let Some((headers, body)) = text.split_once("\r\n\r\n") else {
                continue;
            };
            if headers.contains("Path:speech.config") {
                let config: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
                format = config["context"]["synthesis"]["audio"]["outputFormat"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
            } else if headers.contains("Path:ssml") {
                let id = headers
                    .split("\r\n")
                    .find_map(|line| line.strip_prefix("X-RequestId:"))?;
                return Some(MockRequest {
                    id: RequestId::from(id),
                    format,
                    ssml: body.to_string(),
                });
            }
        }
        None
    }

    pub fn send(&self, message: WireMessage) {
        let _ = self.inbound.send(TransportEvent::Message(message));
    }

    pub fn turn_start(&self, id: &RequestId) {
        self.send(WireMessage::Text(format!(
            "X-RequestId:{id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:turn.start\r\n\r\n{{\"context\":{{\"serviceTag\":\"mock\"}}}}"
        )));
    }

    /// An audio frame laid out like the real endpoint's: length-prefixed header
    /// block, then the payload.
    pub fn audio(&self, id: &RequestId, payload: &[u8]) {
        let header = format!("X-RequestId:{id}\r\nContent-Type:audio/mpeg\r\nPath:audio\r\n");
        let mut data = (header.len() as u16).to_be_bytes().to_vec();
        data.extend_from_slice(header.as_bytes());
        data.extend_from_slice(payload);
        self.send(WireMessage::Binary(Bytes::from(data)));
    }

    pub fn turn_end(&self, id: &RequestId) {
        self.send(WireMessage::Text(format!(
            "X-RequestId:{id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:turn.end\r\n\r\n{{}}"
        )));
    }

    /// Closes the connection with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Drops the connection without a close frame.
    pub fn hang_up(self) {}
}
