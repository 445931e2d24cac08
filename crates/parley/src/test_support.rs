// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles: an in-memory frame transport and a scripted WebSocket server.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::codec::{self, Envelope};
use crate::config::Config;

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg}", $substr);
    }};
}

/// Encode a `Response` frame.
pub fn response_frame(success: bool, message: &str) -> Bytes {
    codec::encode(&Envelope::Response(codec::Response {
        success,
        message: message.to_owned(),
        ..Default::default()
    }))
}

/// A `Config` pointed at `addr` with short test timings.
pub fn config_for(addr: SocketAddr) -> Config {
    let mut config = Config::test();
    config.host = addr.ip().to_string();
    config.port = addr.port();
    config
}

// -- In-memory transport --------------------------------------------------------

/// Outbound half handed to the session. Writes can be made to fail or to
/// stall.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Message>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

impl Sink<Message> for MemorySink {
    type Error = String;

    // A stalled sink is never woken; the writer has to give up on its own.
    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        if self.stall_writes.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("simulated write failure".to_owned());
        }
        self.tx.send(item).map_err(|_| "peer dropped".to_owned())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
        Poll::Ready(Ok(()))
    }
}

/// Inbound half handed to the session.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Result<Message, WsError>>,
}

impl Stream for MemoryStream {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The test's end of an in-memory transport.
pub struct MemoryPeer {
    outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Result<Message, WsError>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
}

/// Create a connected sink/stream pair and the peer that drives it.
pub fn memory_transport() -> (MemorySink, MemoryStream, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let stall_writes = Arc::new(AtomicBool::new(false));
    (
        MemorySink {
            tx: out_tx,
            fail_writes: Arc::clone(&fail_writes),
            stall_writes: Arc::clone(&stall_writes),
        },
        MemoryStream { rx: in_rx },
        MemoryPeer { outbound: out_rx, inbound: in_tx, fail_writes, stall_writes },
    )
}

impl MemoryPeer {
    /// Deliver a binary frame to the session.
    pub fn push(&self, frame: Bytes) {
        let _ = self.inbound.send(Ok(Message::binary(frame)));
    }

    /// Reply with a `Response` frame.
    pub fn respond(&self, success: bool, message: &str) {
        self.push(response_frame(success, message));
    }

    /// Deliver a close frame.
    pub fn close(&self) {
        let _ = self.inbound.send(Ok(Message::Close(None)));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stop accepting writes, as a peer that no longer reads would.
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Next binary frame the session wrote, decoded.
    pub async fn expect(&mut self, timeout: Duration) -> anyhow::Result<Envelope> {
        loop {
            let msg = tokio::time::timeout(timeout, self.outbound.recv())
                .await
                .map_err(|_| anyhow::anyhow!("no outbound frame within {timeout:?}"))?
                .ok_or_else(|| anyhow::anyhow!("session dropped its sink"))?;
            if let Message::Binary(data) = msg {
                return codec::decode(&data).anyhow();
            }
        }
    }

    /// Whether another binary frame arrives within `timeout`.
    pub async fn quiet_for(&mut self, timeout: Duration) -> bool {
        loop {
            match tokio::time::timeout(timeout, self.outbound.recv()).await {
                Ok(Some(Message::Binary(_))) => return false,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return true,
            }
        }
    }
}

// -- Scripted server ------------------------------------------------------------

/// Maps each inbound envelope to the frames sent back.
pub type Responder = Arc<dyn Fn(&Envelope) -> Vec<Bytes> + Send + Sync>;

/// Acknowledge every request with one successful `Response`.
pub fn ack_all() -> Responder {
    Arc::new(|_: &Envelope| vec![response_frame(true, "")])
}

enum ServerCmd {
    Push(Bytes),
    Close,
}

/// A single-connection WebSocket server on loopback that records the upgrade
/// headers and every decoded inbound envelope.
pub struct FakeServer {
    pub addr: SocketAddr,
    headers: Arc<Mutex<Option<HeaderMap>>>,
    received: Arc<Mutex<Vec<Envelope>>>,
    cmd_tx: mpsc::UnboundedSender<ServerCmd>,
    cancel: CancellationToken,
}

impl FakeServer {
    pub async fn start(responder: Responder) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let headers = Arc::new(Mutex::new(None));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(serve(
            listener,
            responder,
            Arc::clone(&headers),
            Arc::clone(&received),
            cmd_rx,
            cancel.clone(),
        ));

        Ok(Self { addr, headers, received, cmd_tx, cancel })
    }

    pub fn config(&self) -> Config {
        config_for(self.addr)
    }

    /// Headers of the upgrade request, once one has arrived.
    pub fn headers(&self) -> Option<HeaderMap> {
        self.headers.lock().clone()
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().clone()
    }

    /// Wait until at least `n` envelopes have arrived.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> anyhow::Result<Vec<Envelope>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.received();
            if received.len() >= n {
                return Ok(received);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("expected {n} frames, got {}: {received:?}", received.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send an unsolicited frame to the client.
    pub fn push(&self, frame: Bytes) {
        let _ = self.cmd_tx.send(ServerCmd::Push(frame));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(ServerCmd::Close);
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(
    listener: TcpListener,
    responder: Responder,
    headers: Arc<Mutex<Option<HeaderMap>>>,
    received: Arc<Mutex<Vec<Envelope>>>,
    mut cmd_rx: mpsc::UnboundedReceiver<ServerCmd>,
    cancel: CancellationToken,
) {
    let tcp = tokio::select! {
        _ = cancel.cancelled() => return,
        accepted = listener.accept() => match accepted {
            Ok((tcp, _)) => tcp,
            Err(_) => return,
        },
    };
    let record = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *headers.lock() = Some(req.headers().clone());
        Ok(resp)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(tcp, record).await else {
        return;
    };
    let (mut tx, mut rx) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => match cmd {
                Some(ServerCmd::Push(frame)) => {
                    if tx.send(Message::binary(frame)).await.is_err() {
                        break;
                    }
                }
                Some(ServerCmd::Close) | None => {
                    let _ = tx.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    let Ok(envelope) = codec::decode(&data) else { continue };
                    let replies = responder(&envelope);
                    received.lock().push(envelope);
                    for reply in replies {
                        if tx.send(Message::binary(reply)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
