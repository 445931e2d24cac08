// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

/// Failure categories shared by the session, codec, and REST client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Socket connect, write, or close failure.
    Transport,
    /// Upgrade timed out or was rejected.
    Handshake,
    /// Malformed frame.
    Codec,
    /// No response within the per-call bound.
    CorrelationTimeout,
    /// Server answered with `success == false`.
    BusinessFailure,
    /// The session is not in the `Active` state.
    NotActive,
    /// The wait was cut short by `shutdown()` or a dropped socket.
    Shutdown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Handshake => "HANDSHAKE",
            Self::Codec => "CODEC",
            Self::CorrelationTimeout => "CORRELATION_TIMEOUT",
            Self::BusinessFailure => "BUSINESS_FAILURE",
            Self::NotActive => "NOT_ACTIVE",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while establishing or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("invalid upgrade request: {0}")]
    InvalidRequest(String),
    #[error("session is {0}, expected {1}")]
    InvalidState(crate::session::SessionState, crate::session::SessionState),
    #[error("session shut down")]
    Shutdown,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Transport,
            Self::HandshakeTimeout(_) | Self::HandshakeRejected(_) | Self::InvalidRequest(_) => {
                ErrorCode::Handshake
            }
            Self::InvalidState(..) => ErrorCode::NotActive,
            Self::Shutdown => ErrorCode::Shutdown,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
