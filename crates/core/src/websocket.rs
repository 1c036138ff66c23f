//! [`Connector`] over a WebSocket, speaking to the read-aloud endpoint.

use crate::{
    error::TransportError,
    transport::{Connector, EventStream, MessageSink, TransportEvent, WireMessage},
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message, protocol::CloseFrame},
};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1?TrustedClientToken=6A5AA1D4EAFF4E9FB37E23D68491D6F4";

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    endpoint: String,
}

impl WebSocketConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint with the connection's identity token appended.
    fn url(&self, connection_id: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{separator}ConnectionId={connection_id}", self.endpoint)
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        connection_id: &str,
    ) -> Result<(MessageSink, EventStream), TransportError> {
        let url = self.url(connection_id);
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(status = %response.status(), "WebSocket handshake complete");

        let (ws_tx, ws_rx) = ws_stream.split();
        let sink = ws_tx
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|message: WireMessage| future::ready(Ok::<_, TransportError>(to_ws(message))));
        let events = ws_rx.filter_map(|item| future::ready(to_event(item)));

        Ok((Box::pin(sink), Box::pin(events)))
    }
}

fn to_ws(message: WireMessage) -> Message {
    match message {
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Binary(data) => Message::Binary(data),
    }
}

/// Maps one item of the WebSocket stream. Control frames are dropped; a close
/// frame or a read error becomes a close event.
fn to_event(item: Result<Message, tungstenite::Error>) -> Option<TransportEvent> {
    match item {
        Ok(Message::Text(text)) => Some(TransportEvent::Message(WireMessage::Text(
            text.as_str().to_owned(),
        ))),
        Ok(Message::Binary(data)) => Some(TransportEvent::Message(WireMessage::Binary(data))),
        Ok(Message::Close(frame)) => Some(closed(frame)),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => {
            debug!(error = %e, "error reading from WebSocket");
            Some(TransportEvent::Closed {
                code: None,
                reason: e.to_string(),
            })
        }
    }
}

fn closed(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => TransportEvent::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.as_str().to_owned(),
        },
        None => TransportEvent::Closed {
            code: None,
            reason: "closed without a close frame".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SynthesisError,
        format::OutputFormat,
        session::{ConnectionState, Session, SessionConfig},
    };
    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::protocol::frame::coding::CloseCode};

    #[test]
    fn test_url_appends_connection_id() {
        let connector = WebSocketConnector::default();
        let url = connector.url("0123");
        assert!(url.starts_with("wss://speech.platform.bing.com/"));
        assert!(url.ends_with("TrustedClientToken=6A5AA1D4EAFF4E9FB37E23D68491D6F4&ConnectionId=0123"));

        let bare = WebSocketConnector::new("ws://localhost:9000/tts");
        assert_eq!(bare.url("ff"), "ws://localhost:9000/tts?ConnectionId=ff");
    }

    #[test]
    fn test_to_event_maps_messages() {
        assert_eq!(
            to_event(Ok(Message::Text("Path:turn.start".into()))),
            Some(TransportEvent::Message(WireMessage::Text(
                "Path:turn.start".to_string()
            )))
        );
        assert_eq!(
            to_event(Ok(Message::Binary(Bytes::from_static(&[1, 2])))),
            Some(TransportEvent::Message(WireMessage::Binary(
                Bytes::from_static(&[1, 2])
            )))
        );
        assert_eq!(to_event(Ok(Message::Ping(Bytes::new()))), None);
        assert_eq!(to_event(Ok(Message::Pong(Bytes::new()))), None);
    }

    #[test]
    fn test_to_event_maps_close() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "idle".into(),
        };
        assert_eq!(
            to_event(Ok(Message::Close(Some(frame)))),
            Some(TransportEvent::Closed {
                code: Some(1001),
                reason: "idle".to_string()
            })
        );
        assert!(matches!(
            to_event(Ok(Message::Close(None))),
            Some(TransportEvent::Closed { code: None, .. })
        ));
        assert!(matches!(
            to_event(Err(tungstenite::Error::ConnectionClosed)),
            Some(TransportEvent::Closed { code: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_session_over_local_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let mut request_id = None;
            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                if let Some(id) = text
                    .split("\r\n")
                    .find_map(|line| line.strip_prefix("X-RequestId:"))
                {
                    request_id = Some(id.to_string());
                    break;
                }
            }
            let id = request_id.unwrap();

            ws.send(Message::Text(
                format!("X-RequestId:{id}\r\nPath:turn.start\r\n\r\n{{}}").into(),
            ))
            .await
            .unwrap();
            let mut audio = format!("X-RequestId:{id}\r\nContent-Type:audio/mpeg\r\nPath:audio\r\n")
                .into_bytes();
            audio.extend_from_slice(&[0x01, 0x02]);
            ws.send(Message::Binary(audio.into())).await.unwrap();
            ws.send(Message::Text(
                format!("X-RequestId:{id}\r\nPath:turn.end\r\n\r\n{{}}").into(),
            ))
            .await
            .unwrap();

            // Hold the connection open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connector = WebSocketConnector::new(format!("ws://{addr}/readaloud?TrustedClientToken=test"));
        let session = Session::new(connector, SessionConfig::default());

        let audio = session
            .convert("<speak>hi</speak>", OutputFormat::Audio24Khz48KBitRateMonoMp3)
            .await
            .unwrap();
        assert_eq!(&audio[..], &[0x01, 0x02]);
        assert_eq!(session.connection_state(), ConnectionState::Connected);

        drop(session);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = Session::new(
            WebSocketConnector::new(format!("ws://{addr}/")),
            SessionConfig::default(),
        );
        let result = session
            .convert("<speak/>", OutputFormat::default())
            .await;
        assert!(matches!(result, Err(SynthesisError::Connection(_))));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }
}
