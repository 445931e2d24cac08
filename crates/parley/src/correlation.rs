// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection response correlation.
//!
//! At most one request is outstanding per connection. [`CorrelationTracker::set_expected`]
//! opens a fresh context that resolves once `n` frames have been offered;
//! the returned [`PendingResponses`] is the only handle that can observe that
//! resolution, so a reset can never leak a stale result into a new wait.

use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ErrorCode;

struct Context {
    expected: usize,
    collected: Vec<Bytes>,
    pending: Option<oneshot::Sender<Vec<Bytes>>>,
}

/// What happened to a frame handed to [`CorrelationTracker::claim`].
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    /// The frame completed the expected count; the waiter has been resolved.
    Satisfied,
    /// The frame was recorded; more are expected.
    Recorded,
    /// Nobody is waiting.
    Unclaimed(Bytes),
}

/// Counts down expected response frames for the current request.
pub struct CorrelationTracker {
    inner: Mutex<Context>,
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Context { expected: 1, collected: Vec::new(), pending: None }) }
    }

    /// Start a new context expecting `n` frames. Clears anything collected so
    /// far and abandons the previous waiter (it observes a failure).
    ///
    /// `n == 0` resolves immediately with an empty sequence.
    pub fn set_expected(&self, n: usize) -> PendingResponses {
        let (tx, rx) = oneshot::channel();
        let mut ctx = self.inner.lock();
        ctx.expected = n;
        ctx.collected.clear();
        if n == 0 {
            ctx.pending = None;
            let _ = tx.send(Vec::new());
        } else {
            ctx.pending = Some(tx);
        }
        PendingResponses { rx }
    }

    /// Record one frame for the open context. Returns true iff this frame
    /// satisfied the expected count (and resolved the waiter).
    ///
    /// Frames offered while nobody is waiting are not recorded.
    pub fn offer(&self, frame: Bytes) -> bool {
        matches!(self.claim(frame), Claim::Satisfied)
    }

    /// Like [`offer`](Self::offer), but hands an unclaimed frame back so the
    /// caller can route it elsewhere.
    pub fn claim(&self, frame: Bytes) -> Claim {
        let mut ctx = self.inner.lock();
        let Some(tx) = ctx.pending.take() else {
            return Claim::Unclaimed(frame);
        };
        if tx.is_closed() {
            // The waiter gave up; this frame belongs to no one.
            ctx.collected.clear();
            return Claim::Unclaimed(frame);
        }
        ctx.collected.push(frame);
        if ctx.collected.len() < ctx.expected {
            ctx.pending = Some(tx);
            return Claim::Recorded;
        }
        let frames = std::mem::take(&mut ctx.collected);
        let _ = tx.send(frames);
        Claim::Satisfied
    }

    /// Whether a context is open and still unresolved.
    pub fn is_awaiting(&self) -> bool {
        let ctx = self.inner.lock();
        ctx.pending.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn expected(&self) -> usize {
        self.inner.lock().expected
    }

    /// Close the current context and return to the idle single-frame default.
    pub fn reset(&self) {
        let mut ctx = self.inner.lock();
        ctx.expected = 1;
        ctx.collected.clear();
        ctx.pending = None;
    }

    /// Fail any in-flight wait. Used on shutdown.
    pub fn cancel(&self) {
        let mut ctx = self.inner.lock();
        ctx.collected.clear();
        ctx.pending = None;
    }
}

/// Why a wait ended without a full set of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("wait abandoned")]
    Abandoned,
}

impl WaitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::CorrelationTimeout,
            Self::Abandoned => ErrorCode::Shutdown,
        }
    }
}

/// Handle to one correlation context.
pub struct PendingResponses {
    rx: oneshot::Receiver<Vec<Bytes>>,
}

impl PendingResponses {
    /// Wait for the collected frames (in arrival order), or fail on timeout.
    /// A timeout does not touch the tracker; late frames land wherever the
    /// tracker is by then.
    pub async fn wait(self, timeout: Duration) -> Result<Vec<Bytes>, WaitError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(frames)) => Ok(frames),
            Ok(Err(_)) => Err(WaitError::Abandoned),
            Err(_) => Err(WaitError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
#[path = "correlation_tests.rs"]
mod tests;
