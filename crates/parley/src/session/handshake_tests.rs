// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::error::ErrorCode;

#[test]
fn request_carries_auth_and_origin() -> anyhow::Result<()> {
    let mut config = Config::test();
    config.port = 9000;
    config.token = "abc".into();
    config.origin = "http://chat.local".into();
    let request = build_request(&config)?;
    assert_eq!(request.uri().to_string(), "ws://127.0.0.1:9000/ws");
    assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
    assert_eq!(request.headers()[ORIGIN], "http://chat.local");
    Ok(())
}

#[test]
fn header_injection_is_rejected() {
    let mut config = Config::test();
    config.port = 9000;
    config.token = "abc\r\nX-Evil: 1".into();
    let err = build_request(&config).err();
    assert_eq!(err.map(|e| e.code()), Some(ErrorCode::Handshake));
}

#[tokio::test]
async fn refused_connection_is_transport_error() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let mut config = Config::test();
    config.port = port;
    let err = open_tcp(&config).await.err();
    assert_eq!(err.map(|e| e.code()), Some(ErrorCode::Transport));
    Ok(())
}

#[tokio::test]
async fn silent_server_times_out_upgrade() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    // Accept but never answer the upgrade.
    let hold = tokio::spawn(async move { listener.accept().await.map(|(tcp, _)| tcp) });

    let mut config = crate::test_support::config_for(addr);
    config.handshake_timeout_ms = Some(100);
    let tcp = open_tcp(&config).await?;
    let err = upgrade(&config, tcp).await.err();
    assert!(matches!(
        err,
        Some(SessionError::HandshakeTimeout(d)) if d == Duration::from_millis(100)
    ));
    hold.abort();
    Ok(())
}
