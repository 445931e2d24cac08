// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One logical session to one chat server.
//!
//! State machine: `Disconnected → Connecting → HandshakeWait → Active →
//! ShuttingDown`. A failed handshake returns to `Disconnected`; everything
//! else only moves forward and `ShuttingDown` is terminal.
//!
//! All socket writes go through a single writer task (see [`io`]). Logical
//! requests are serialized by an async request gate held for the whole
//! reset → write → await → reset cycle, so the correlation tracker only ever
//! has one outstanding context. Frames the tracker does not claim are push
//! traffic and land in the [`MessageStore`].

pub mod handshake;
mod heartbeat;
mod io;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{self, Chat, CodecError, Envelope, GroupChat, MsgKind};
use crate::config::Config;
use crate::correlation::{Claim, CorrelationTracker};
use crate::error::{ErrorCode, SessionError};
use crate::event::Notice;
use crate::store::{GroupMessage, Message, MessageStore, UNKNOWN_SENDER};
use crate::unwrap::unwrap;

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Disconnected,
    Connecting,
    HandshakeWait,
    Active,
    ShuttingDown,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::HandshakeWait => "handshake_wait",
            Self::Active => "active",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one `send()`: the aggregate success flag and every collected
/// frame in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub success: bool,
    pub frames: Vec<Bytes>,
    /// Why the send failed, when it did.
    pub failure: Option<ErrorCode>,
    /// First business failure message, or the transport error text.
    pub error_message: Option<String>,
}

impl SendOutcome {
    fn failed(code: ErrorCode, message: Option<String>) -> Self {
        Self { success: false, frames: Vec::new(), failure: Some(code), error_message: message }
    }
}

struct Inner {
    config: Config,
    store: Arc<MessageStore>,
    tracker: CorrelationTracker,
    state: watch::Sender<SessionState>,
    connected: watch::Sender<bool>,
    notices: broadcast::Sender<Notice>,
    writer: parking_lot::Mutex<Option<mpsc::Sender<io::WriteRequest>>>,
    request_gate: tokio::sync::Mutex<()>,
    io_cancel: CancellationToken,
    heartbeat_cancel: CancellationToken,
}

/// Handle to a chat session. Cheap to clone; all clones drive the same
/// connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(config: Config, store: Arc<MessageStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (connected, _) = watch::channel(true);
        let (notices, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                tracker: CorrelationTracker::new(),
                state,
                connected,
                notices,
                writer: parking_lot::Mutex::new(None),
                request_gate: tokio::sync::Mutex::new(()),
                io_cancel: CancellationToken::new(),
                heartbeat_cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.inner.store
    }

    pub fn tracker(&self) -> &CorrelationTracker {
        &self.inner.tracker
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Advisory liveness flag maintained by the heartbeat loop.
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Move to `to` if the current state satisfies `allowed`. Returns the
    /// previous state on success and the current state on refusal.
    fn transition(
        &self,
        allowed: impl FnOnce(SessionState) -> bool,
        to: SessionState,
    ) -> Result<SessionState, SessionState> {
        let mut result = Err(to);
        self.inner.state.send_if_modified(|cur| {
            if allowed(*cur) {
                result = Ok(*cur);
                *cur = to;
                true
            } else {
                result = Err(*cur);
                false
            }
        });
        if let Ok(prev) = result {
            debug!(from = %prev, to = %to, "session state");
        }
        result
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Open the socket, perform the upgrade, log in, and start heartbeats.
    ///
    /// A failed or timed-out handshake leaves the session `Disconnected` and is
    /// returned as an error; nothing is retried.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.transition(|s| s == SessionState::Disconnected, SessionState::Connecting)
            .map_err(|cur| SessionError::InvalidState(cur, SessionState::Disconnected))?;

        let ws = match self.open().await {
            Ok(ws) => ws,
            Err(e) => {
                let _ = self.transition(
                    |s| matches!(s, SessionState::Connecting | SessionState::HandshakeWait),
                    SessionState::Disconnected,
                );
                warn!(err = %e, url = %self.inner.config.ws_url(), "session startup failed");
                return Err(e);
            }
        };

        let (sink, stream) = futures_util::StreamExt::split(ws);
        self.activate(sink, stream).await
    }

    async fn open(&self) -> Result<handshake::WsStream, SessionError> {
        let tcp = handshake::open_tcp(&self.inner.config).await?;
        self.transition(|s| s == SessionState::Connecting, SessionState::HandshakeWait)
            .map_err(|cur| SessionError::InvalidState(cur, SessionState::Connecting))?;
        handshake::upgrade(&self.inner.config, tcp).await
    }

    /// Drive the session over an already-established frame transport.
    ///
    /// This is the tail of [`connect`](Self::connect) after the upgrade, and
    /// lets callers supply their own sink/stream pair.
    pub async fn connect_with<S, R>(&self, sink: S, stream: R) -> Result<(), SessionError>
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        S::Error: fmt::Display,
        R: Stream<Item = Result<WsMessage, WsError>> + Unpin + Send + 'static,
    {
        self.transition(|s| s == SessionState::Disconnected, SessionState::HandshakeWait)
            .map_err(|cur| SessionError::InvalidState(cur, SessionState::Disconnected))?;
        self.activate(sink, stream).await
    }

    async fn activate<S, R>(&self, sink: S, stream: R) -> Result<(), SessionError>
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        S::Error: fmt::Display,
        R: Stream<Item = Result<WsMessage, WsError>> + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::channel(64);
        *self.inner.writer.lock() = Some(write_tx);
        io::spawn_writer(sink, write_rx, self.inner.io_cancel.clone());
        io::spawn_reader(stream, self.clone(), self.inner.io_cancel.clone());

        // Hold the gate across activation so the login frame is the first
        // request on the wire.
        let gate = self.inner.request_gate.lock().await;
        self.transition(|s| s == SessionState::HandshakeWait, SessionState::Active).map_err(
            |cur| SessionError::Transport(format!("connection lost during startup ({cur})")),
        )?;
        info!(url = %self.inner.config.ws_url(), "session active");

        let login = Envelope::login(&self.inner.config.token);
        let outcome = self.exchange(&login, 1, self.inner.config.response_timeout()).await;
        drop(gate);
        if outcome.success {
            info!("login accepted");
        } else {
            let reason = outcome.error_message.as_deref().unwrap_or("no response");
            warn!(failure = ?outcome.failure, reason, "login failed");
            // Business failures were already surfaced by aggregate().
            if let Some(code) = outcome.failure.filter(|c| *c != ErrorCode::BusinessFailure) {
                self.prompt(code, Some(&format!("login failed: {reason}")));
            }
        }

        heartbeat::spawn(self.clone(), self.inner.heartbeat_cancel.clone());
        Ok(())
    }

    /// Graceful shutdown: best-effort logout, close the socket, stop the
    /// heartbeat. In-flight waits fail immediately. Idempotent.
    pub async fn shutdown(&self) {
        let prev = match self
            .transition(|s| s != SessionState::ShuttingDown, SessionState::ShuttingDown)
        {
            Ok(prev) => prev,
            Err(_) => return,
        };
        info!(from = %prev, "session shutting down");
        self.inner.tracker.cancel();

        if prev == SessionState::Active {
            self.logout().await;
        }

        self.inner.io_cancel.cancel();
        self.inner.writer.lock().take();
        self.inner.heartbeat_cancel.cancel();
        self.inner.connected.send_replace(false);
    }

    async fn logout(&self) {
        let limit = self.inner.config.logout_timeout();
        let Ok(_gate) = tokio::time::timeout(limit, self.inner.request_gate.lock()).await else {
            warn!("logout skipped: request still in flight");
            return;
        };
        let logout = Envelope::logout(&self.inner.config.user_id.to_string());
        let outcome = self.exchange(&logout, 1, limit).await;
        if outcome.success {
            debug!("logout acknowledged");
        } else {
            debug!(failure = ?outcome.failure, "logout not acknowledged");
        }
    }

    /// The socket went away without `shutdown()`. No logout is attempted.
    fn close_from_transport(&self, reason: &str) {
        if self
            .transition(|s| s != SessionState::ShuttingDown, SessionState::ShuttingDown)
            .is_err()
        {
            return;
        }
        warn!(reason, "connection lost");
        self.inner.tracker.cancel();
        self.inner.io_cancel.cancel();
        self.inner.writer.lock().take();
        self.inner.heartbeat_cancel.cancel();
        self.inner.connected.send_replace(false);
        self.prompt(ErrorCode::Transport, Some(&format!("connection lost: {reason}")));
    }

    // -- Send path ------------------------------------------------------------

    /// Send one envelope and wait for `expected` response frames.
    ///
    /// Fails immediately, without touching the transport, unless the session
    /// is `Active`. Concurrent callers queue behind each other.
    pub async fn send(&self, envelope: Envelope, expected: usize) -> SendOutcome {
        self.request(&envelope, expected, self.inner.config.response_timeout(), None).await
    }

    /// Build and send a payload of an explicitly chosen kind.
    pub async fn send_kind(
        &self,
        kind: MsgKind,
        target: &str,
        content: &str,
        expected: usize,
    ) -> SendOutcome {
        let envelope =
            Envelope::build(kind, target, content, self.inner.config.user_id, epoch_ms());
        self.send(envelope, expected).await
    }

    /// Callback flavour of [`send`](Self::send). A session that is not
    /// `Active` invokes the callback before returning; otherwise the exchange
    /// runs on a spawned task.
    pub fn send_with<F>(&self, envelope: Envelope, expected: usize, callback: F)
    where
        F: FnOnce(SendOutcome) + Send + 'static,
    {
        if self.state() != SessionState::Active {
            callback(SendOutcome::failed(ErrorCode::NotActive, None));
            return;
        }
        let session = self.clone();
        tokio::spawn(async move {
            callback(session.send(envelope, expected).await);
        });
    }

    /// Send with a bound on both the queue wait and the response wait.
    async fn request(
        &self,
        envelope: &Envelope,
        expected: usize,
        wait: Duration,
        queue_limit: Option<Duration>,
    ) -> SendOutcome {
        if self.state() != SessionState::Active {
            debug!(kind = %envelope.kind(), state = %self.state(), "send refused");
            return SendOutcome::failed(ErrorCode::NotActive, None);
        }
        let _gate = match queue_limit {
            Some(limit) => match tokio::time::timeout(limit, self.inner.request_gate.lock()).await {
                Ok(gate) => gate,
                Err(_) => return SendOutcome::failed(ErrorCode::CorrelationTimeout, None),
            },
            None => self.inner.request_gate.lock().await,
        };
        // The state may have changed while queued.
        if self.state() != SessionState::Active {
            return SendOutcome::failed(ErrorCode::NotActive, None);
        }
        self.exchange(envelope, expected, wait).await
    }

    /// One reset → write → await → reset cycle. Caller holds the request gate.
    ///
    /// The write and the response wait share one deadline of `wait`.
    async fn exchange(&self, envelope: &Envelope, expected: usize, wait: Duration) -> SendOutcome {
        let kind = envelope.kind();
        let frame = codec::encode(envelope);
        let deadline = tokio::time::Instant::now() + wait;
        let pending = self.inner.tracker.set_expected(expected);

        let written = tokio::select! {
            biased;
            _ = self.inner.io_cancel.cancelled() => Err(SessionError::Shutdown),
            written = tokio::time::timeout_at(deadline, self.write(frame)) => match written {
                Ok(written) => written,
                Err(_) => Err(SessionError::Transport(format!("write stalled for {wait:?}"))),
            },
        };
        let outcome = match written {
            Err(e) => {
                warn!(kind = %kind, err = %e, "frame write failed");
                SendOutcome::failed(e.code(), Some(e.to_string()))
            }
            Ok(()) => {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                match pending.wait(remaining).await {
                    Ok(frames) => self.aggregate(frames),
                    Err(e) => {
                        debug!(kind = %kind, expected, err = %e, "response wait failed");
                        SendOutcome::failed(e.code(), None)
                    }
                }
            }
        };

        self.inner.tracker.reset();
        outcome
    }

    async fn write(&self, frame: Bytes) -> Result<(), SessionError> {
        let tx = self
            .inner
            .writer
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Transport("not connected".to_owned()))?;
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(io::WriteRequest { frame, done: done_tx })
            .await
            .map_err(|_| SessionError::Transport("writer closed".to_owned()))?;
        done_rx
            .await
            .map_err(|_| SessionError::Transport("writer closed".to_owned()))?
            .map_err(SessionError::Transport)
    }

    /// AND over frames that carry a response envelope; envelope-less frames
    /// count as successful passthrough.
    fn aggregate(&self, frames: Vec<Bytes>) -> SendOutcome {
        let mut success = true;
        let mut first_error = None;
        for frame in &frames {
            let unwrapped = unwrap(frame);
            if unwrapped.is_business_failure() {
                success = false;
                if first_error.is_none() {
                    first_error = unwrapped.error_message;
                }
            }
        }
        if !success {
            self.prompt(ErrorCode::BusinessFailure, first_error.as_deref());
        }
        SendOutcome {
            success,
            frames,
            failure: (!success).then_some(ErrorCode::BusinessFailure),
            error_message: first_error,
        }
    }

    /// One heartbeat exchange. The queue wait and the exchange are each
    /// bounded by `limit`.
    async fn heartbeat(&self, limit: Duration) -> bool {
        let beat = Envelope::heartbeat(epoch_ms());
        self.request(&beat, 1, limit, Some(limit)).await.success
    }

    fn set_connected(&self, connected: bool) {
        let prev = self.inner.connected.send_replace(connected);
        if prev != connected {
            if connected {
                info!("heartbeat restored");
            } else {
                warn!("heartbeat failed");
            }
        }
    }

    // -- Receive path ---------------------------------------------------------

    /// The single ingress point for frames from the transport.
    ///
    /// `Response` frames go to the correlation tracker when a send is waiting;
    /// everything else is push traffic. Malformed frames are logged and
    /// dropped.
    pub fn receive(&self, frame: Bytes) {
        match codec::decode(&frame) {
            Ok(Envelope::Response(resp)) => match self.inner.tracker.claim(frame) {
                Claim::Satisfied => debug!(success = resp.success, "response completed request"),
                Claim::Recorded => debug!(success = resp.success, "response recorded"),
                Claim::Unclaimed(frame) => self.handle_push(&frame, Ok(Envelope::Response(resp))),
            },
            decoded => self.handle_push(&frame, decoded),
        }
    }

    fn handle_push(&self, frame: &Bytes, decoded: Result<Envelope, CodecError>) {
        let unwrapped = unwrap(frame);
        if unwrapped.is_business_failure() {
            self.prompt(ErrorCode::BusinessFailure, unwrapped.error_message.as_deref());
            return;
        }
        match decoded {
            Ok(Envelope::Chat(chat)) => match message_from_chat(&chat, epoch_ms()) {
                Some(message) => {
                    debug!(from = message.sender_id, "direct message received");
                    self.inner.store.append(message);
                }
                None => warn!(user_id = %chat.user_id, "dropping chat push with invalid sender"),
            },
            Ok(Envelope::GroupChat(group)) => match message_from_group_chat(&group, epoch_ms()) {
                Some(message) => {
                    debug!(
                        group = message.group_id,
                        from = message.sender_id,
                        "group message received"
                    );
                    self.inner.store.append_group(message);
                }
                None => warn!(
                    target = %group.target_client_id,
                    user_id = %group.user_id,
                    "dropping group push with invalid ids"
                ),
            },
            Ok(Envelope::Response(_)) => debug!("unsolicited response dropped"),
            Ok(other) => debug!(kind = %other.kind(), "ignoring pushed frame"),
            Err(e) => warn!(err = %e, len = frame.len(), "dropping malformed frame"),
        }
    }

    fn prompt(&self, code: ErrorCode, message: Option<&str>) {
        let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) else {
            return;
        };
        warn!(code = %code, "{message}");
        let _ = self.inner.notices.send(Notice { code, message: message.to_owned() });
    }

    // -- Chat helpers ---------------------------------------------------------

    /// Ask whether `target` is online. `None` when the exchange failed.
    pub async fn check_presence(&self, target: &str) -> Option<bool> {
        let outcome = self.send(Envelope::presence_check(target), 1).await;
        if !outcome.success {
            return None;
        }
        outcome.frames.last().and_then(parse_presence)
    }

    /// Optimistically append a direct message to the store, send it, and set
    /// its delivery flag from the outcome.
    pub async fn send_chat(&self, peer_id: i64, text: &str) -> (Message, SendOutcome) {
        let message = Message::outgoing(peer_id, text, epoch_ms());
        self.inner.store.append(message.clone());
        let outcome = self.send(self.chat_envelope(&message), 1).await;
        message.is_sent.set(outcome.success);
        (message, outcome)
    }

    pub async fn send_group_chat(&self, group_id: i64, text: &str) -> (GroupMessage, SendOutcome) {
        let message = GroupMessage::new(
            group_id,
            "",
            text,
            self.inner.config.user_id,
            epoch_ms(),
            false,
            None,
        );
        self.inner.store.append_group(message.clone());
        let outcome = self.send(self.group_envelope(&message), 1).await;
        message.is_sent.set(outcome.success);
        (message, outcome)
    }

    /// Re-send an unacknowledged message with its original content and id.
    pub async fn resend(&self, message: &Message) -> SendOutcome {
        let outcome = self.send(self.chat_envelope(message), 1).await;
        if outcome.success {
            message.is_sent.set(true);
        }
        outcome
    }

    pub async fn resend_group(&self, message: &GroupMessage) -> SendOutcome {
        let outcome = self.send(self.group_envelope(message), 1).await;
        if outcome.success {
            message.is_sent.set(true);
        }
        outcome
    }

    fn chat_envelope(&self, message: &Message) -> Envelope {
        Envelope::chat(
            &message.sender_id.to_string(),
            &message.text,
            self.inner.config.user_id,
            message.timestamp,
        )
    }

    fn group_envelope(&self, message: &GroupMessage) -> Envelope {
        Envelope::group_chat(
            &message.group_id.to_string(),
            &message.text,
            self.inner.config.user_id,
        )
    }
}

/// Convert a pushed `Chat` into a store message. A missing or unparsable
/// timestamp falls back to arrival time.
fn message_from_chat(chat: &Chat, now_ms: i64) -> Option<Message> {
    let sender_id = chat.user_id.trim().parse().ok()?;
    let timestamp = chat.timestamp.trim().parse().unwrap_or(now_ms);
    Some(Message::incoming(sender_id, chat.content.clone(), timestamp))
}

/// Convert a pushed `GroupChat`; the group id is the envelope target.
fn message_from_group_chat(group: &GroupChat, now_ms: i64) -> Option<GroupMessage> {
    let group_id = group.target_client_id.trim().parse().ok()?;
    let sender_id = group.user_id.trim().parse().ok()?;
    Some(GroupMessage::new(
        group_id,
        UNKNOWN_SENDER,
        group.content.clone(),
        sender_id,
        now_ms,
        true,
        None,
    ))
}

/// Read an online flag from a presence response: `{"online": bool}` JSON or
/// a bare boolean in the message, else the `online` field.
fn parse_presence(frame: &Bytes) -> Option<bool> {
    match codec::decode(frame) {
        Ok(Envelope::Response(resp)) => {
            Some(presence_from_text(&resp.message).unwrap_or(resp.online))
        }
        _ => std::str::from_utf8(frame).ok().and_then(presence_from_text),
    }
}

fn presence_from_text(text: &str) -> Option<bool> {
    match serde_json::from_str::<serde_json::Value>(text.trim()).ok()? {
        serde_json::Value::Bool(online) => Some(online),
        serde_json::Value::Object(map) => map.get("online").and_then(serde_json::Value::as_bool),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
