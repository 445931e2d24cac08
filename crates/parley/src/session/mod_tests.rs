// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::codec::Response;
use crate::event::StoreEvent;
use crate::test_support::response_frame;

fn session() -> Session {
    Session::new(Config::test(), Arc::new(MessageStore::new()))
}

#[test]
fn state_names() {
    assert_eq!(SessionState::HandshakeWait.to_string(), "handshake_wait");
    assert_eq!(SessionState::ShuttingDown.as_str(), "shutting_down");
    assert!(SessionState::Active > SessionState::Connecting);
}

#[test]
fn new_session_is_disconnected_and_optimistically_connected() {
    let s = session();
    assert_eq!(s.state(), SessionState::Disconnected);
    assert!(s.is_connected());
    assert_eq!(s.tracker().expected(), 1);
}

#[tokio::test]
async fn send_before_connect_fails_fast() {
    let s = session();
    let outcome = s.send(Envelope::heartbeat(1), 1).await;
    assert!(!outcome.success);
    assert!(outcome.frames.is_empty());
    assert_eq!(outcome.failure, Some(ErrorCode::NotActive));
}

#[test]
fn send_with_reports_synchronously_when_inactive() {
    let s = session();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let slot = Arc::clone(&seen);
    s.send_with(Envelope::presence_check("2"), 1, move |outcome| {
        *slot.lock() = Some(outcome);
    });
    let outcome = seen.lock().take();
    assert_eq!(outcome.map(|o| o.failure), Some(Some(ErrorCode::NotActive)));
}

#[tokio::test]
async fn shutdown_before_connect_is_terminal() {
    let s = session();
    s.shutdown().await;
    s.shutdown().await;
    assert_eq!(s.state(), SessionState::ShuttingDown);
    assert!(!s.is_connected());
    assert!(matches!(
        s.connect().await,
        Err(SessionError::InvalidState(SessionState::ShuttingDown, _))
    ));
}

#[tokio::test]
async fn idle_chat_push_is_stored_with_wire_timestamp() -> anyhow::Result<()> {
    let s = session();
    let mut events = s.store().subscribe();
    s.receive(codec::encode(&Envelope::chat("1", "hi", 7, 1_700_000_000_000)));

    match events.recv().await? {
        StoreEvent::DirectAppended(m) => {
            assert_eq!(m.sender_id, 7);
            assert_eq!(m.text, "hi");
            assert!(!m.sender);
            assert_eq!(m.timestamp, 1_700_000_000_000);
        }
        other => anyhow::bail!("unexpected event {other:?}"),
    }
    Ok(())
}

#[test]
fn group_push_uses_target_as_group_and_unknown_sender() {
    let s = session();
    s.receive(codec::encode(&Envelope::group_chat("-12", "hey all", 9)));
    let group = s.store().group();
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].group_id, -12);
    assert_eq!(group[0].sender_id, 9);
    assert_eq!(group[0].sender_name, UNKNOWN_SENDER);
    assert!(group[0].is_sent.get());
}

#[test]
fn malformed_and_unsolicited_frames_are_dropped() {
    let s = session();
    s.receive(Bytes::from_static(&[0xff, 0x00, 0x13]));
    s.receive(codec::encode_with_type("chat", Some(Envelope::heartbeat(1))));
    s.receive(response_frame(true, "late"));
    s.receive(codec::encode(&Envelope::chat("1", "x", 0, 0)).slice(..3));
    assert!(s.store().direct().is_empty());
    assert!(s.store().group().is_empty());
}

#[test]
fn chat_with_unparsable_sender_is_dropped() {
    let s = session();
    s.receive(codec::encode(&Envelope::Chat(Chat {
        target_client_id: "1".into(),
        content: "x".into(),
        user_id: "alice".into(),
        timestamp: "1".into(),
    })));
    assert!(s.store().direct().is_empty());
}

#[tokio::test]
async fn unsolicited_failure_raises_notice() -> anyhow::Result<()> {
    let s = session();
    let mut notices = s.subscribe_notices();
    s.receive(response_frame(false, "  kicked by admin  "));
    let notice = notices.recv().await?;
    assert_eq!(notice.code, ErrorCode::BusinessFailure);
    assert_eq!(notice.message, "kicked by admin");
    Ok(())
}

#[test]
fn blank_failure_text_is_not_surfaced() {
    let s = session();
    let mut notices = s.subscribe_notices();
    s.receive(response_frame(false, "   "));
    assert!(notices.try_recv().is_err());
}

#[test]
fn chat_timestamp_falls_back_to_arrival() {
    let chat = Chat {
        target_client_id: "1".into(),
        content: "x".into(),
        user_id: " 5 ".into(),
        timestamp: String::new(),
    };
    let m = message_from_chat(&chat, 1234);
    assert_eq!(m.map(|m| (m.sender_id, m.timestamp)), Some((5, 1234)));
}

#[yare::parameterized(
    object      = { r#"{"online":true}"#, false, Some(true) },
    object_off  = { r#"{"online":false}"#, true, Some(false) },
    bare_bool   = { "true", false, Some(true) },
    field_only  = { "", true, Some(true) },
    plain_text  = { "ok", false, Some(false) },
)]
fn presence_parsing(message: &str, online: bool, expected: Option<bool>) {
    let frame = codec::encode(&Envelope::Response(Response {
        success: true,
        message: message.into(),
        client_id: String::new(),
        online,
    }));
    assert_eq!(parse_presence(&frame), expected);
}

#[test]
fn aggregate_ands_envelope_frames_and_keeps_first_error() {
    let s = session();
    let outcome = s.aggregate(vec![
        response_frame(true, ""),
        Bytes::from_static(b"raw"),
        response_frame(false, "first"),
        response_frame(false, "second"),
    ]);
    assert!(!outcome.success);
    assert_eq!(outcome.frames.len(), 4);
    assert_eq!(outcome.failure, Some(ErrorCode::BusinessFailure));
    assert_eq!(outcome.error_message.as_deref(), Some("first"));

    let outcome = s.aggregate(vec![Bytes::from_static(b"raw")]);
    assert!(outcome.success);
    assert_eq!(outcome.failure, None);
}
