//! Session
//!
//! One shared connection to the synthesis endpoint, multiplexing any number of
//! concurrent requests. The connection and the [`RequestTable`] are owned by a
//! single background task; [`Session`] handles talk to it over a command
//! channel, so every table mutation happens on that one task.
//!
//! The task also drives the timers. Every new request pushes the idle timer
//! back, and when it fires the connection is closed; the next request
//! reconnects. Each request additionally carries its own deadline, which the
//! task enforces whether or not the caller is still waiting. Outbound writes
//! are bounded by `send_timeout`, so a peer that stops reading cannot stall
//! the task.

use crate::{
    error::{SynthesisError, TransportError},
    format::OutputFormat,
    frame::{self, Frame},
    id::{RequestId, random_token},
    table::{RequestTable, ResultSlot},
    transport::{Connector, EventStream, MessageSink, TransportEvent, WireMessage},
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::FuturesUnordered};
use std::{future::Future, pin::Pin, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, Sleep},
};
use tracing::{Instrument, debug, error, info, info_span, instrument, trace, warn};

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Close the connection after this long without a new request.
    pub idle_timeout: Duration,
    /// Fail a single request that has not completed after this long.
    pub request_timeout: Duration,
    /// Give up on a connection attempt after this long.
    pub connect_timeout: Duration,
    /// Drop the connection when a single outbound write takes longer than this.
    pub send_timeout: Duration,
    /// Capacity of the command channel into the session task.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            command_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Command {
    Convert {
        id: RequestId,
        ssml: String,
        format: OutputFormat,
        deadline: Instant,
        slot: ResultSlot,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the session task.
///
/// The task shuts down, closing its connection, once every handle is dropped.
#[derive(Clone)]
pub struct Session {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    request_timeout: Duration,
}

impl Session {
    /// Spawns the session task on the current Tokio runtime. No connection is
    /// made until the first request.
    pub fn new<C: Connector>(connector: C, config: SessionConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let request_timeout = config.request_timeout;

        let task = SessionTask {
            connector: Box::new(connector),
            config,
            commands: commands_rx,
            state: state_tx,
            table: RequestTable::new(),
            link: None,
            idle: None,
            deadlines: FuturesUnordered::new(),
        };
        tokio::spawn(task.run().instrument(info_span!("readaloud_session")));

        Self {
            commands: commands_tx,
            state: state_rx,
            request_timeout,
        }
    }

    /// Synthesizes `ssml` and returns the complete audio in `format`.
    #[instrument(skip_all, fields(request_id, format = %format))]
    pub async fn convert(
        &self,
        ssml: &str,
        format: OutputFormat,
    ) -> Result<Bytes, SynthesisError> {
        let deadline = Instant::now() + self.request_timeout;
        let id = RequestId::random();
        tracing::Span::current().record("request_id", id.as_str());

        let (slot, mut outcome) = oneshot::channel();
        let submit = self.commands.send(Command::Convert {
            id,
            ssml: ssml.to_string(),
            format,
            deadline,
            slot,
        });
        match tokio::time::timeout_at(deadline, submit).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(SynthesisError::SessionClosed),
            Err(_) => {
                debug!("command queue stayed full until the deadline");
                return Err(SynthesisError::Timeout);
            }
        }

        match tokio::time::timeout_at(deadline, &mut outcome).await {
            Ok(result) => result.unwrap_or(Err(SynthesisError::SessionClosed)),
            Err(_) => {
                // An outcome the task settled at the same instant still wins.
                // Otherwise the task expires the request on its own.
                debug!("request deadline elapsed");
                outcome.try_recv().unwrap_or(Err(SynthesisError::Timeout))
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Number of requests still awaiting their outcome.
    pub async fn pending_requests(&self) -> usize {
        let (reply, count) = oneshot::channel();
        if self
            .commands
            .send(Command::PendingCount { reply })
            .await
            .is_err()
        {
            return 0;
        }
        count.await.unwrap_or_default()
    }
}

/// The live connection: its identity token and both halves of the stream.
struct Link {
    connection_id: String,
    sink: MessageSink,
    events: EventStream,
}

type Deadline = Pin<Box<dyn Future<Output = RequestId> + Send>>;

struct SessionTask {
    connector: Box<dyn Connector>,
    config: SessionConfig,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    table: RequestTable,
    link: Option<Link>,
    idle: Option<Pin<Box<Sleep>>>,
    deadlines: FuturesUnordered<Deadline>,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                Some(id) = self.deadlines.next(), if !self.deadlines.is_empty() => {
                    if self.table.expire(&id) {
                        warn!(request_id = %id, remaining = self.table.len(), "request timed out");
                    }
                }
                event = next_event(&mut self.link) => self.handle_event(event),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                () = idle_elapsed(&mut self.idle) => {
                    info!("no new requests within the idle timeout, closing connection");
                    self.close("idle timeout").await;
                }
            }
        }

        self.close("session shut down").await;
        debug!("session task finished");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Convert {
                id,
                ssml,
                format,
                deadline,
                slot,
            } => {
                let span = info_span!("request", request_id = %id);
                self.start_request(id, &ssml, format, deadline, slot)
                    .instrument(span)
                    .await;
            }
            Command::PendingCount { reply } => {
                let _ = reply.send(self.table.len());
            }
        }
    }

    async fn start_request(
        &mut self,
        id: RequestId,
        ssml: &str,
        format: OutputFormat,
        deadline: Instant,
        slot: ResultSlot,
    ) {
        if Instant::now() >= deadline {
            debug!("request expired while queued");
            let _ = slot.send(Err(SynthesisError::Timeout));
            return;
        }

        if self.link.is_none() {
            if let Err(e) = self.connect().await {
                let _ = slot.send(Err(e.into()));
                return;
            }
        }

        if let Err(slot) = self.table.register(id.clone(), slot) {
            warn!("request id already pending, rejecting");
            let _ = slot.send(Err(SynthesisError::DuplicateRequest(id)));
            return;
        }

        info!(%format, "starting synthesis");
        let expiring = id.clone();
        self.deadlines.push(Box::pin(async move {
            tokio::time::sleep_until(deadline).await;
            expiring
        }));

        self.send_request(&id, ssml, format).await;
        if self.link.is_some() {
            self.reset_idle_timer();
        }
    }

    #[instrument(skip_all, fields(connection_id))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        let connection_id = random_token();
        tracing::Span::current().record("connection_id", connection_id.as_str());
        self.state.send_replace(ConnectionState::Connecting);
        info!("connecting to synthesis endpoint");

        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&connection_id),
        )
        .await
        .unwrap_or_else(|_| Err(TransportError::Connect("handshake timed out".to_string())));

        match attempt {
            Ok((sink, events)) => {
                self.link = Some(Link {
                    connection_id,
                    sink,
                    events,
                });
                self.state.send_replace(ConnectionState::Connected);
                info!("connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "connection failed");
                self.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Sends the config frame then the SSML frame. A failed write is only
    /// logged; the request is settled later by its deadline or by the close
    /// that follows a broken connection. A write that stalls past
    /// `send_timeout` drops the connection at once.
    async fn send_request(&mut self, id: &RequestId, ssml: &str, format: OutputFormat) {
        let mut messages = Vec::with_capacity(2);
        match frame::config_message(format) {
            Ok(config) => messages.push(("speech.config", config)),
            Err(e) => error!(error = %e, "failed to encode speech.config"),
        }
        messages.push(("ssml", frame::ssml_message(id, ssml)));

        for (path, message) in messages {
            let Some(link) = self.link.as_mut() else {
                return;
            };
            debug!(path, "sending");
            let sent = tokio::time::timeout(self.config.send_timeout, link.sink.send(message)).await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, path, "failed to send"),
                Err(_) => {
                    error!(path, timeout = ?self.config.send_timeout, "send stalled, dropping connection");
                    self.teardown("send timed out");
                    return;
                }
            }
        }
    }

    fn reset_idle_timer(&mut self) {
        trace!(timeout = ?self.config.idle_timeout, "resetting idle timer");
        self.idle = Some(Box::pin(tokio::time::sleep(self.config.idle_timeout)));
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => self.route(&message),
            TransportEvent::Closed { code, reason } => {
                let connection_id = self.link.as_ref().map(|link| link.connection_id.clone());
                info!(?code, %reason, ?connection_id, "connection closed");
                let reason = match code {
                    Some(code) => format!("{reason} ({code})"),
                    None => reason,
                };
                self.teardown(&reason);
            }
        }
    }

    fn route(&mut self, message: &WireMessage) {
        match frame::parse(message) {
            Ok(Frame::TurnStart(id)) => {
                debug!(request_id = %id, "turn started");
                self.table.open_buffer(&id);
            }
            Ok(Frame::AudioChunk(id, payload)) => {
                trace!(request_id = %id, len = payload.len(), "audio chunk");
                self.table.append(&id, &payload);
            }
            Ok(Frame::TurnEnd(id)) => {
                if self.table.finalize(&id) {
                    info!(request_id = %id, remaining = self.table.len(), "synthesis complete");
                }
            }
            Ok(Frame::Ignored) => trace!("ignoring frame"),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    /// Closes the connection from our side, then tears down.
    async fn close(&mut self, reason: &str) {
        if let Some(mut link) = self.link.take() {
            debug!(connection_id = %link.connection_id, "closing connection");
            match tokio::time::timeout(self.config.send_timeout, link.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "error while closing connection"),
                Err(_) => debug!("close handshake stalled, dropping connection"),
            }
        }
        self.teardown(reason);
    }

    fn teardown(&mut self, reason: &str) {
        self.link = None;
        self.idle = None;
        // Every pending request is failed below, so no deadline is left to enforce.
        self.deadlines.clear();
        self.state.send_replace(ConnectionState::Disconnected);

        let failed = self.table.fail_all(reason);
        if failed > 0 {
            warn!(failed, %reason, "failed pending requests on disconnect");
        }
    }
}

async fn next_event(link: &mut Option<Link>) -> TransportEvent {
    match link {
        Some(link) => link
            .events
            .next()
            .await
            .unwrap_or_else(|| TransportEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            }),
        None => std::future::pending().await,
    }
}

async fn idle_elapsed(idle: &mut Option<Pin<Box<Sleep>>>) {
    match idle {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
