// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP connect and WebSocket upgrade, each bounded by the handshake timeout.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION, ORIGIN};
use tokio_tungstenite::WebSocketStream;

use crate::config::Config;
use crate::error::SessionError;

pub type WsStream = WebSocketStream<TcpStream>;

/// Build the upgrade request with bearer auth and origin headers.
pub fn build_request(config: &Config) -> Result<Request, SessionError> {
    let url = config.ws_url();
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| SessionError::InvalidRequest(format!("{url}: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
        .map_err(|e| SessionError::InvalidRequest(format!("authorization: {e}")))?;
    let origin = HeaderValue::from_str(&config.origin)
        .map_err(|e| SessionError::InvalidRequest(format!("origin: {e}")))?;
    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ORIGIN, origin);
    Ok(request)
}

pub(crate) async fn open_tcp(config: &Config) -> Result<TcpStream, SessionError> {
    let addr = format!("{}:{}", config.host, config.port);
    let limit = config.handshake_timeout();
    match tokio::time::timeout(limit, TcpStream::connect(&addr)).await {
        Ok(Ok(tcp)) => Ok(tcp),
        Ok(Err(e)) => Err(SessionError::Transport(format!("connect {addr}: {e}"))),
        Err(_) => Err(SessionError::HandshakeTimeout(limit)),
    }
}

pub(crate) async fn upgrade(config: &Config, tcp: TcpStream) -> Result<WsStream, SessionError> {
    let request = build_request(config)?;
    let limit = config.handshake_timeout();
    match tokio::time::timeout(limit, tokio_tungstenite::client_async(request, tcp)).await {
        Ok(Ok((ws, response))) => {
            tracing::debug!(status = %response.status(), "websocket upgraded");
            Ok(ws)
        }
        Ok(Err(e)) => Err(SessionError::HandshakeRejected(e.to_string())),
        Err(_) => Err(SessionError::HandshakeTimeout(limit)),
    }
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
