// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket reader and writer tasks.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Session;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// One frame for the writer, with a completion report.
pub(crate) struct WriteRequest {
    pub frame: Bytes,
    pub done: oneshot::Sender<Result<(), String>>,
}

/// The only task that touches the sink. Exits on cancel or when every sender
/// is gone, then sends a close frame.
pub(crate) fn spawn_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    tokio::spawn(async move {
        loop {
            let req = tokio::select! {
                _ = cancel.cancelled() => break,
                req = rx.recv() => match req {
                    Some(req) => req,
                    None => break,
                },
            };
            // A sink that stops accepting writes must not outlive cancel.
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = req.done.send(Err("connection closed".to_owned()));
                    break;
                }
                result = sink.send(Message::binary(req.frame)) => result.map_err(|e| e.to_string()),
            };
            if let Err(ref e) = result {
                warn!(err = %e, "websocket write failed");
            }
            let _ = req.done.send(result);
        }
        // Fail anything still queued.
        rx.close();
        while let Ok(req) = rx.try_recv() {
            let _ = req.done.send(Err("connection closed".to_owned()));
        }
        let closing = async {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, closing).await.is_err() {
            debug!("close frame not flushed");
        }
        debug!("writer stopped");
    });
}

/// Feed inbound binary frames to the session until the socket closes or the
/// task is cancelled.
pub(crate) fn spawn_reader<R>(mut stream: R, session: Session, cancel: CancellationToken)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reason = loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("reader stopped");
                    return;
                }
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(Message::Binary(data))) => session.receive(data),
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "ignoring text frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(f) => format!("closed by server ({}: {})", f.code, f.reason),
                        None => "closed by server".to_owned(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed".to_owned(),
            }
        };
        session.close_from_transport(&reason);
    });
}
