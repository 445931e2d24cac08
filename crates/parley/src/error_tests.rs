// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::session::SessionState;

#[yare::parameterized(
    transport   = { ErrorCode::Transport, "TRANSPORT" },
    handshake   = { ErrorCode::Handshake, "HANDSHAKE" },
    codec       = { ErrorCode::Codec, "CODEC" },
    timeout     = { ErrorCode::CorrelationTimeout, "CORRELATION_TIMEOUT" },
    business    = { ErrorCode::BusinessFailure, "BUSINESS_FAILURE" },
    not_active  = { ErrorCode::NotActive, "NOT_ACTIVE" },
    shutdown    = { ErrorCode::Shutdown, "SHUTDOWN" },
)]
fn code_display(code: ErrorCode, expected: &str) {
    assert_eq!(code.as_str(), expected);
    assert_eq!(code.to_string(), expected);
}

#[yare::parameterized(
    transport = { SessionError::Transport("reset".into()), ErrorCode::Transport },
    timeout   = { SessionError::HandshakeTimeout(Duration::from_secs(1)), ErrorCode::Handshake },
    rejected  = { SessionError::HandshakeRejected("401".into()), ErrorCode::Handshake },
    request   = { SessionError::InvalidRequest("bad url".into()), ErrorCode::Handshake },
    state     = { SessionError::InvalidState(SessionState::Active, SessionState::Disconnected),
                  ErrorCode::NotActive },
    shutdown  = { SessionError::Shutdown, ErrorCode::Shutdown },
)]
fn session_error_codes(err: SessionError, expected: ErrorCode) {
    assert_eq!(err.code(), expected);
}

#[test]
fn invalid_state_message_names_both_states() {
    let err = SessionError::InvalidState(SessionState::ShuttingDown, SessionState::Disconnected);
    assert_eq!(err.to_string(), "session is shutting_down, expected disconnected");
}
